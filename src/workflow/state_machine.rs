use chrono::Utc;
use uuid::Uuid;

use super::error::{WorkflowError, WorkflowResult};
use crate::models::{Document, DocumentStatus, Office};

impl DocumentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DocumentStatus::InProcess)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingUpdate {
    pub status: DocumentStatus,
    /// `None` leaves `id_office_destination` untouched.
    pub destination_office: Option<Uuid>,
    /// `None` leaves `user_id` untouched; `Some(None)` clears it.
    pub assignee: Option<Option<Uuid>>,
}

impl RoutingUpdate {
    pub fn status_only(status: DocumentStatus) -> Self {
        Self {
            status,
            destination_office: None,
            assignee: None,
        }
    }

    pub fn routed_to(status: DocumentStatus, office: &Office, assignee: Option<Option<Uuid>>) -> Self {
        Self {
            status,
            destination_office: Some(office.id),
            assignee,
        }
    }

    pub fn apply_to(&self, document: &Document) -> Document {
        let mut next = document.clone();
        next.status = self.status;
        if let Some(office) = self.destination_office {
            next.id_office_destination = Some(office);
        }
        if let Some(assignee) = self.assignee {
            next.user_id = assignee;
        }
        next.updated_at = Utc::now().naive_utc();
        next
    }
}

pub fn check_destination(office: &Office, field: &'static str) -> WorkflowResult<()> {
    if !office.active {
        return Err(WorkflowError::validation(
            field,
            format!("office {} ({}) is not active", office.code, office.id),
        ));
    }
    Ok(())
}
