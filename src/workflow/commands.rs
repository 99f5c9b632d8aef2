use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::error::{WorkflowError, WorkflowResult};
use super::ledger::{non_blank, MovementDraft};
use super::state_machine::{check_destination, RoutingUpdate};
use super::ActingContext;
use crate::models::{Document, DocumentStatus, MovementAction, MovementStatus, Office, User};

pub const ARCHIVE_DEFAULT_OBSERVATION: &str = "Documento archivado";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub draft: MovementDraft,
    pub routing: RoutingUpdate,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardRequest {
    pub destination_office_id: Option<Uuid>,
    #[serde(default)]
    pub destination_user_id: Option<Uuid>,
    #[serde(default)]
    pub origin_office_id: Option<Uuid>,
    #[serde(default)]
    pub indication: Option<String>,
    #[serde(default)]
    pub observation: Option<String>,
    pub receipt_date: Option<NaiveDate>,
}

impl ForwardRequest {
    pub fn destination(&self) -> WorkflowResult<Uuid> {
        required(self.destination_office_id, "destination_office_id")
    }

    fn receipt_date(&self) -> WorkflowResult<NaiveDate> {
        required(self.receipt_date, "receipt_date")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RespondRequest {
    pub destination_office_id: Option<Uuid>,
    pub destination_user_id: Option<Uuid>,
    pub observation: Option<String>,
}

impl RespondRequest {
    pub fn check(&self) -> WorkflowResult<(Uuid, Uuid)> {
        let office = required(self.destination_office_id, "destination_office_id")?;
        let user = required(self.destination_user_id, "destination_user_id")?;
        required_text(self.observation.as_deref(), "observation")?;
        Ok((office, user))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RejectRequest {
    pub observation: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchiveRequest {
    #[serde(default)]
    pub observation: Option<String>,
}

pub fn plan_forward(
    ctx: &ActingContext,
    document: &Document,
    request: &ForwardRequest,
    destination: &Office,
    destination_user: Option<&User>,
) -> WorkflowResult<Transition> {
    request.destination()?;
    let receipt_date = request.receipt_date()?;
    check_destination(destination, "destination_office_id")?;
    if let Some(user) = destination_user {
        check_assignee(user, destination)?;
    }

    let origin_office_id = request
        .origin_office_id
        .or(ctx.office_id)
        .unwrap_or(document.area_origen_id);

    let draft = MovementDraft {
        origin_office_id,
        origin_user_id: ctx.user_id,
        destination_office_id: Some(destination.id),
        destination_user_id: destination_user.map(|user| user.id),
        action: MovementAction::Derivacion,
        indication: optional_text(request.indication.as_deref()),
        observation: optional_text(request.observation.as_deref()),
        status: MovementStatus::Pending,
        receipt_date: Some(receipt_date),
    };
    let routing = RoutingUpdate::routed_to(
        DocumentStatus::InProcess,
        destination,
        destination_user.map(|user| Some(user.id)),
    );
    finish(draft, routing)
}

pub fn plan_respond(
    ctx: &ActingContext,
    document: &Document,
    request: &RespondRequest,
    destination: &Office,
    destination_user: &User,
    today: NaiveDate,
) -> WorkflowResult<Transition> {
    request.check()?;
    check_destination(destination, "destination_office_id")?;
    check_assignee(destination_user, destination)?;

    let draft = MovementDraft {
        origin_office_id: acting_origin(ctx, document),
        origin_user_id: ctx.user_id,
        destination_office_id: Some(destination.id),
        destination_user_id: Some(destination_user.id),
        action: MovementAction::Respuesta,
        indication: None,
        observation: optional_text(request.observation.as_deref()),
        status: MovementStatus::Completed,
        receipt_date: Some(today),
    };
    let routing = RoutingUpdate::routed_to(DocumentStatus::Completed, destination, None);
    finish(draft, routing)
}

pub fn plan_reject(
    ctx: &ActingContext,
    document: &Document,
    request: &RejectRequest,
    today: NaiveDate,
) -> WorkflowResult<Transition> {
    let observation = required_text(request.observation.as_deref(), "observation")?;

    let draft = MovementDraft {
        origin_office_id: acting_origin(ctx, document),
        origin_user_id: ctx.user_id,
        destination_office_id: None,
        destination_user_id: None,
        action: MovementAction::Rechazado,
        indication: None,
        observation: Some(observation),
        status: MovementStatus::Rejected,
        receipt_date: Some(today),
    };
    finish(draft, RoutingUpdate::status_only(DocumentStatus::Rejected))
}

pub fn plan_archive(
    ctx: &ActingContext,
    document: &Document,
    request: &ArchiveRequest,
    today: NaiveDate,
) -> WorkflowResult<Transition> {
    let observation = optional_text(request.observation.as_deref())
        .unwrap_or_else(|| ARCHIVE_DEFAULT_OBSERVATION.to_string());

    let draft = MovementDraft {
        origin_office_id: acting_origin(ctx, document),
        origin_user_id: ctx.user_id,
        destination_office_id: None,
        destination_user_id: None,
        action: MovementAction::Archivado,
        indication: None,
        observation: Some(observation),
        status: MovementStatus::Completed,
        receipt_date: Some(today),
    };
    finish(draft, RoutingUpdate::status_only(DocumentStatus::Archived))
}

fn finish(draft: MovementDraft, routing: RoutingUpdate) -> WorkflowResult<Transition> {
    draft.validate()?;
    Ok(Transition { draft, routing })
}

fn acting_origin(ctx: &ActingContext, document: &Document) -> Uuid {
    ctx.office_id
        .or(document.id_office_destination)
        .unwrap_or(document.area_origen_id)
}

fn check_assignee(user: &User, office: &Office) -> WorkflowResult<()> {
    if !user.active {
        return Err(WorkflowError::validation(
            "destination_user_id",
            format!("user {} is not active", user.id),
        ));
    }
    if user.office_id != Some(office.id) {
        return Err(WorkflowError::validation(
            "destination_user_id",
            format!("user {} does not belong to office {}", user.id, office.code),
        ));
    }
    Ok(())
}

fn required<T>(value: Option<T>, field: &'static str) -> WorkflowResult<T> {
    value.ok_or_else(|| WorkflowError::validation(field, "is required"))
}

fn required_text(value: Option<&str>, field: &'static str) -> WorkflowResult<String> {
    non_blank(value)
        .map(str::to_string)
        .ok_or_else(|| WorkflowError::validation(field, "must not be empty"))
}

fn optional_text(value: Option<&str>) -> Option<String> {
    non_blank(value).map(str::to_string)
}
