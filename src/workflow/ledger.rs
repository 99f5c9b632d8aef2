//! [`append`] is the only code path that writes a document's `status`,
//! `id_office_destination` or `user_id`. Movements have no update or delete
//! path.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use super::error::{WorkflowError, WorkflowResult};
use super::state_machine::RoutingUpdate;
use crate::models::{Document, DocumentStatus, Movement, MovementAction, MovementStatus, NewMovement};
use crate::schema::{documents, movements};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementDraft {
    pub origin_office_id: Uuid,
    pub origin_user_id: Uuid,
    pub destination_office_id: Option<Uuid>,
    pub destination_user_id: Option<Uuid>,
    pub action: MovementAction,
    pub indication: Option<String>,
    pub observation: Option<String>,
    pub status: MovementStatus,
    pub receipt_date: Option<NaiveDate>,
}

impl MovementDraft {
    pub fn validate(&self) -> WorkflowResult<()> {
        let requires_observation = matches!(
            self.action,
            MovementAction::Respuesta | MovementAction::Rechazado
        );
        if requires_observation && non_blank(self.observation.as_deref()).is_none() {
            return Err(WorkflowError::validation(
                "observation",
                format!("is required for {}", self.action),
            ));
        }

        match self.action {
            MovementAction::Derivacion => {
                if self.destination_office_id.is_none() {
                    return Err(WorkflowError::validation(
                        "destination_office_id",
                        "is required to forward a document",
                    ));
                }
                if self.receipt_date.is_none() {
                    return Err(WorkflowError::validation(
                        "receipt_date",
                        "is required to forward a document",
                    ));
                }
            }
            MovementAction::Respuesta => {
                if self.destination_office_id.is_none() {
                    return Err(WorkflowError::validation(
                        "destination_office_id",
                        "is required to respond",
                    ));
                }
                if self.destination_user_id.is_none() {
                    return Err(WorkflowError::validation(
                        "destination_user_id",
                        "is required to respond",
                    ));
                }
            }
            MovementAction::Rechazado | MovementAction::Archivado => {
                if self.destination_office_id.is_some() || self.destination_user_id.is_some() {
                    return Err(WorkflowError::validation(
                        "destination_office_id",
                        format!("must be empty for {}", self.action),
                    ));
                }
            }
            MovementAction::Otro => {}
        }

        Ok(())
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

#[derive(AsChangeset)]
#[diesel(table_name = documents)]
struct RoutingChangeset {
    status: DocumentStatus,
    id_office_destination: Option<Option<Uuid>>,
    user_id: Option<Option<Uuid>>,
    updated_at: NaiveDateTime,
}

impl From<&RoutingUpdate> for RoutingChangeset {
    fn from(update: &RoutingUpdate) -> Self {
        Self {
            status: update.status,
            id_office_destination: update.destination_office.map(Some),
            user_id: update.assignee,
            updated_at: Utc::now().naive_utc(),
        }
    }
}

pub fn lock_document(conn: &mut PgConnection, document_id: Uuid) -> WorkflowResult<Document> {
    documents::table
        .find(document_id)
        .for_update()
        .first::<Document>(conn)
        .optional()?
        .ok_or_else(|| WorkflowError::not_found("document", document_id))
}

/// Appends `draft` to the document's history and applies `routing` to the
/// document row. Must run inside the caller's transaction, after
/// [`lock_document`].
pub fn append(
    conn: &mut PgConnection,
    document: &Document,
    draft: MovementDraft,
    routing: &RoutingUpdate,
) -> WorkflowResult<(Document, Movement)> {
    draft.validate()?;

    let last_sequence: Option<i32> = movements::table
        .filter(movements::document_id.eq(document.id))
        .select(max(movements::sequence_number))
        .get_result(conn)?;

    let new_movement = NewMovement {
        id: Uuid::new_v4(),
        document_id: document.id,
        sequence_number: last_sequence.unwrap_or(0) + 1,
        origin_office_id: draft.origin_office_id,
        origin_user_id: draft.origin_user_id,
        destination_office_id: draft.destination_office_id,
        destination_user_id: draft.destination_user_id,
        action: draft.action,
        indication: draft.indication,
        observation: draft.observation,
        status: draft.status,
        receipt_date: draft.receipt_date,
    };

    let movement: Movement = diesel::insert_into(movements::table)
        .values(&new_movement)
        .get_result(conn)?;

    let updated: Document = diesel::update(documents::table.find(document.id))
        .set(&RoutingChangeset::from(routing))
        .get_result(conn)?;

    Ok((updated, movement))
}

pub fn history(conn: &mut PgConnection, document_id: Uuid) -> QueryResult<Vec<Movement>> {
    movements::table
        .filter(movements::document_id.eq(document_id))
        .order(movements::sequence_number.asc())
        .load(conn)
}

pub fn find_movement(conn: &mut PgConnection, movement_id: Uuid) -> WorkflowResult<Movement> {
    movements::table
        .find(movement_id)
        .first::<Movement>(conn)
        .optional()?
        .ok_or_else(|| WorkflowError::not_found("movement", movement_id))
}
