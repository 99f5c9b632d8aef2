use axum::extract::{Json, Multipart, Path, State};
use diesel::prelude::*;
use uuid::Uuid;

use super::documents::{read_attachment_form, MovementResponse, WorkflowResponse};
use crate::attachments::SubmittedAttachment;
use crate::context::ActingUser;
use crate::error::{AppError, AppResult};
use crate::models::Movement;
use crate::schema::movements;
use crate::state::AppState;
use crate::workflow::{ArchiveRequest, RejectRequest, RespondRequest};

pub async fn list_inbox(
    State(state): State<AppState>,
    acting: ActingUser,
) -> AppResult<Json<Vec<MovementResponse>>> {
    let Some(office_id) = acting.context().office_id else {
        return Ok(Json(Vec::new()));
    };

    let mut conn = state.db()?;
    let inbox: Vec<Movement> = movements::table
        .filter(movements::destination_office_id.eq(office_id))
        .order(movements::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(inbox.into_iter().map(Into::into).collect()))
}

pub async fn respond(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(movement_id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<WorkflowResponse>> {
    let form = read_attachment_form(multipart).await?;
    let request = RespondRequest {
        destination_office_id: form.uuid_field("destination_office_id")?,
        destination_user_id: form.uuid_field("destination_user_id")?,
        observation: form.field("observation").map(str::to_string),
    };

    let mut uploads = Vec::with_capacity(form.attachments.len());
    for attachment in form.attachments {
        match attachment {
            SubmittedAttachment::Upload(upload) => uploads.push(upload),
            SubmittedAttachment::Existing(_) => {
                return Err(AppError::bad_request(
                    "responses accept new files only, not existing_path",
                ))
            }
        }
    }

    let outcome = state
        .workflow()
        .respond(acting.context(), movement_id, request, uploads)
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn reject(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(movement_id): Path<Uuid>,
    Json(request): Json<RejectRequest>,
) -> AppResult<Json<WorkflowResponse>> {
    let outcome = state
        .workflow()
        .reject(acting.context(), movement_id, request)
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn archive(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(movement_id): Path<Uuid>,
    Json(request): Json<ArchiveRequest>,
) -> AppResult<Json<WorkflowResponse>> {
    let outcome = state
        .workflow()
        .archive(acting.context(), movement_id, request)
        .await?;
    Ok(Json(outcome.into()))
}
