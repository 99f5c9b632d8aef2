use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Json, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::attachments::{self, reconciler::load_files, SubmittedAttachment};
use crate::context::ActingUser;
use crate::error::{AppError, AppResult};
use crate::intake::{self, IntakeRequest};
use crate::models::{
    Document, DocumentFile, DocumentOrigin, DocumentStatus, Movement, MovementAction,
    MovementStatus,
};
use crate::schema::{document_files, documents};
use crate::storage::{inline_content_disposition, Upload};
use crate::state::AppState;
use crate::workflow::{ledger, ForwardRequest, WorkflowOutcome};

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub document_number: String,
    pub case_number: String,
    pub subject: String,
    pub origen: DocumentOrigin,
    pub document_type_id: Uuid,
    pub area_origen_id: Uuid,
    pub gestion_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub folio: i32,
    pub reception_date: NaiveDate,
    pub response_deadline: Option<NaiveDate>,
    pub status: DocumentStatus,
    pub id_office_destination: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            customer_id: doc.customer_id,
            document_number: doc.document_number,
            case_number: doc.case_number,
            subject: doc.subject,
            origen: doc.origen,
            document_type_id: doc.document_type_id,
            area_origen_id: doc.area_origen_id,
            gestion_id: doc.gestion_id,
            user_id: doc.user_id,
            folio: doc.folio,
            reception_date: doc.reception_date,
            response_deadline: doc.response_deadline,
            status: doc.status,
            id_office_destination: doc.id_office_destination,
            created_at: to_iso(doc.created_at),
            updated_at: to_iso(doc.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct MovementResponse {
    pub id: Uuid,
    pub document_id: Uuid,
    pub sequence_number: i32,
    pub origin_office_id: Uuid,
    pub origin_user_id: Uuid,
    pub destination_office_id: Option<Uuid>,
    pub destination_user_id: Option<Uuid>,
    pub action: MovementAction,
    pub indication: Option<String>,
    pub observation: Option<String>,
    pub status: MovementStatus,
    pub receipt_date: Option<NaiveDate>,
    pub created_at: String,
}

impl From<Movement> for MovementResponse {
    fn from(movement: Movement) -> Self {
        Self {
            id: movement.id,
            document_id: movement.document_id,
            sequence_number: movement.sequence_number,
            origin_office_id: movement.origin_office_id,
            origin_user_id: movement.origin_user_id,
            destination_office_id: movement.destination_office_id,
            destination_user_id: movement.destination_user_id,
            action: movement.action,
            indication: movement.indication,
            observation: movement.observation,
            status: movement.status,
            receipt_date: movement.receipt_date,
            created_at: to_iso(movement.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub filename: String,
    pub path: String,
    pub mime_type: String,
    pub size: i64,
    pub uploaded_by: Option<Uuid>,
    pub created_at: String,
}

impl From<DocumentFile> for AttachmentResponse {
    fn from(file: DocumentFile) -> Self {
        Self {
            id: file.id,
            filename: file.filename,
            path: file.path,
            mime_type: file.mime_type,
            size: file.size,
            uploaded_by: file.uploaded_by,
            created_at: to_iso(file.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct DocumentDetailResponse {
    pub document: DocumentResponse,
    pub movements: Vec<MovementResponse>,
    pub attachments: Vec<AttachmentResponse>,
}

#[derive(Serialize)]
pub struct WorkflowResponse {
    pub document: DocumentResponse,
    pub movement: MovementResponse,
    pub attachments: Vec<AttachmentResponse>,
}

impl From<WorkflowOutcome> for WorkflowResponse {
    fn from(outcome: WorkflowOutcome) -> Self {
        Self {
            document: outcome.document.into(),
            movement: outcome.movement.into(),
            attachments: outcome.attachments.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct ReconcileResponse {
    pub created: Vec<AttachmentResponse>,
    pub deleted: Vec<String>,
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

#[derive(Default)]
pub(crate) struct AttachmentForm {
    pub attachments: Vec<SubmittedAttachment>,
    pub fields: HashMap<String, String>,
}

impl AttachmentForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn uuid_field(&self, name: &str) -> AppResult<Option<Uuid>> {
        self.field(name)
            .map(|value| {
                Uuid::parse_str(value)
                    .map_err(|_| AppError::bad_request(format!("{name} must be a valid UUID")))
            })
            .transpose()
    }
}

pub(crate) async fn read_attachment_form(mut multipart: Multipart) -> AppResult<AttachmentForm> {
    let mut form = AttachmentForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(|n| n.to_string()).unwrap_or_default();
                let content_type = field.content_type().map(|mime| mime.to_string());
                let bytes = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }
                form.attachments.push(SubmittedAttachment::Upload(Upload {
                    filename,
                    content_type,
                    bytes,
                }));
            }
            Some("existing_path") => {
                let path = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid existing_path: {err}"))
                })?;
                form.attachments.push(SubmittedAttachment::Existing(path));
            }
            Some(other) => {
                let other = other.to_string();
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid field {other}: {err}"))
                })?;
                form.fields.insert(other, value);
            }
            None => {}
        }
    }

    Ok(form)
}

pub async fn list_documents(
    State(state): State<AppState>,
    acting: ActingUser,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let Some(office_id) = acting.context().office_id else {
        return Ok(Json(Vec::new()));
    };

    let mut conn = state.db()?;
    let docs: Vec<Document> = documents::table
        .filter(documents::area_origen_id.eq(office_id))
        .order(documents::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(docs.into_iter().map(Into::into).collect()))
}

pub async fn create_document(
    State(state): State<AppState>,
    acting: ActingUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DocumentDetailResponse>)> {
    let form = read_attachment_form(multipart).await?;
    let raw = form
        .field("document")
        .ok_or_else(|| AppError::bad_request("document field is required"))?;
    let request: IntakeRequest = serde_json::from_str(raw).map_err(|err| {
        warn!(error = %err, "document payload rejected");
        AppError::bad_request(format!("document must be valid JSON: {err}"))
    })?;

    let (document, files) = intake::register_document(
        &state.pool,
        &state.blobs(),
        acting.context(),
        request,
        form.attachments,
        state.config.max_upload_bytes,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(DocumentDetailResponse {
            document: document.into(),
            movements: Vec::new(),
            attachments: files.into_iter().map(Into::into).collect(),
        }),
    ))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<DocumentDetailResponse>> {
    let mut conn = state.db()?;
    let document: Document = documents::table.find(document_id).first(&mut conn)?;
    let movements = ledger::history(&mut conn, document_id)?;
    let files = load_files(&mut conn, document_id)?;

    Ok(Json(DocumentDetailResponse {
        document: document.into(),
        movements: movements.into_iter().map(Into::into).collect(),
        attachments: files.into_iter().map(Into::into).collect(),
    }))
}

pub async fn reconcile_files(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(document_id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<ReconcileResponse>> {
    let form = read_attachment_form(multipart).await?;
    let outcome = attachments::reconcile(
        &state.pool,
        &state.blobs(),
        acting.context(),
        document_id,
        form.attachments,
        state.config.max_upload_bytes,
    )
    .await?;

    Ok(Json(ReconcileResponse {
        created: outcome.created.into_iter().map(Into::into).collect(),
        deleted: outcome.deleted,
    }))
}

pub async fn download_file(
    State(state): State<AppState>,
    Path((document_id, file_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Response> {
    let file: DocumentFile = {
        let mut conn = state.db()?;
        document_files::table
            .filter(document_files::document_id.eq(document_id))
            .filter(document_files::id.eq(file_id))
            .first(&mut conn)?
    };

    let bytes = state.blobs().read(&file.path).await.map_err(|err| {
        error!(path = %file.path, error = %err, "failed to read attachment");
        AppError::internal(format!("failed to read attachment: {err}"))
    })?;

    let mut response = (
        [(header::CONTENT_TYPE, file.mime_type.clone())],
        Body::from(bytes),
    )
        .into_response();
    if let Some(disposition) = inline_content_disposition(&file.filename) {
        if let Ok(value) = disposition.parse() {
            response
                .headers_mut()
                .insert(header::CONTENT_DISPOSITION, value);
        }
    }
    Ok(response)
}

pub async fn forward_document(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(document_id): Path<Uuid>,
    Json(request): Json<ForwardRequest>,
) -> AppResult<Json<WorkflowResponse>> {
    let outcome = state
        .workflow()
        .forward(acting.context(), document_id, request)
        .await?;
    Ok(Json(outcome.into()))
}
