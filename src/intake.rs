use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::PgConnection;
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::attachments::{
    plan_reconciliation, StagedAttachments, SubmittedAttachment, DOCUMENTS_DIRECTORY,
};
use crate::db::PgPool;
use crate::directory::require_office;
use crate::models::{Document, DocumentFile, DocumentOrigin, DocumentStatus, NewDocument};
use crate::schema::{administrations, customers, document_types, documents};
use crate::storage::BlobStore;
use crate::workflow::error::{WorkflowError, WorkflowResult};
use crate::workflow::ledger::non_blank;
use crate::workflow::state_machine::check_destination;
use crate::workflow::ActingContext;

const OPERATION: &str = "register document";

#[derive(Debug, Clone, Deserialize)]
pub struct IntakeRequest {
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    pub document_number: String,
    #[serde(default)]
    pub case_number: String,
    pub subject: String,
    pub origen: DocumentOrigin,
    pub document_type_id: Uuid,
    #[serde(default)]
    pub area_origen_id: Option<Uuid>,
    #[serde(default)]
    pub gestion_id: Option<Uuid>,
    #[serde(default)]
    pub folio: i32,
    pub reception_date: NaiveDate,
    #[serde(default)]
    pub response_deadline: Option<NaiveDate>,
}

impl IntakeRequest {
    fn check(&self, ctx: &ActingContext) -> WorkflowResult<Uuid> {
        if non_blank(Some(self.document_number.as_str())).is_none() {
            return Err(WorkflowError::validation("document_number", "must not be empty"));
        }
        if non_blank(Some(self.subject.as_str())).is_none() {
            return Err(WorkflowError::validation("subject", "must not be empty"));
        }
        if self.folio < 0 {
            return Err(WorkflowError::validation("folio", "must not be negative"));
        }
        if let Some(deadline) = self.response_deadline {
            if deadline < self.reception_date {
                return Err(WorkflowError::validation(
                    "response_deadline",
                    "must not be before the reception date",
                ));
            }
        }
        self.area_origen_id
            .or(ctx.office_id)
            .ok_or_else(|| WorkflowError::validation("area_origen_id", "is required"))
    }

    fn into_row(self, area_origen_id: Uuid) -> NewDocument {
        NewDocument {
            id: Uuid::new_v4(),
            customer_id: self.customer_id,
            document_number: self.document_number.trim().to_string(),
            case_number: self.case_number.trim().to_string(),
            subject: self.subject.trim().to_string(),
            origen: self.origen,
            document_type_id: self.document_type_id,
            area_origen_id,
            gestion_id: self.gestion_id,
            folio: self.folio,
            reception_date: self.reception_date,
            response_deadline: self.response_deadline,
            status: DocumentStatus::InProcess,
        }
    }
}

fn require_references(conn: &mut PgConnection, row: &NewDocument) -> WorkflowResult<()> {
    let origin = require_office(conn, row.area_origen_id)?;
    check_destination(&origin, "area_origen_id")?;

    let type_exists: bool = diesel::select(diesel::dsl::exists(
        document_types::table.filter(document_types::id.eq(row.document_type_id)),
    ))
    .get_result(conn)?;
    if !type_exists {
        return Err(WorkflowError::not_found("document_type", row.document_type_id));
    }

    if let Some(customer_id) = row.customer_id {
        let found: bool = diesel::select(diesel::dsl::exists(
            customers::table.filter(customers::id.eq(customer_id)),
        ))
        .get_result(conn)?;
        if !found {
            return Err(WorkflowError::not_found("customer", customer_id));
        }
    }

    if let Some(gestion_id) = row.gestion_id {
        let found: bool = diesel::select(diesel::dsl::exists(
            administrations::table.filter(administrations::id.eq(gestion_id)),
        ))
        .get_result(conn)?;
        if !found {
            return Err(WorkflowError::not_found("administration", gestion_id));
        }
    }

    Ok(())
}

pub async fn register_document(
    pool: &PgPool,
    blobs: &BlobStore,
    ctx: &ActingContext,
    request: IntakeRequest,
    submitted: Vec<SubmittedAttachment>,
    max_upload_bytes: usize,
) -> WorkflowResult<(Document, Vec<DocumentFile>)> {
    let area_origen_id = request.check(ctx)?;
    let row = request.into_row(area_origen_id);

    let plan = plan_reconciliation(&[], submitted);
    let mut staged = StagedAttachments::stage(blobs, plan, DOCUMENTS_DIRECTORY, max_upload_bytes)
        .await
        .map_err(|err| err.during(OPERATION))?;

    let result = pool.get().map_err(WorkflowError::from).and_then(|mut conn| {
        conn.build_transaction()
            .serializable()
            .run(|conn| -> WorkflowResult<(Document, Vec<DocumentFile>)> {
                require_references(conn, &row)?;
                let document: Document = diesel::insert_into(documents::table)
                    .values(&row)
                    .get_result(conn)?;
                let files = staged.persist(conn, document.id, Some(ctx.user_id))?;
                Ok((document, files))
            })
    });

    match result {
        Ok((document, files)) => {
            staged.mark_committed();
            staged.finish(OPERATION).await?;
            info!(
                document_id = %document.id,
                document_number = %document.document_number,
                attachments = files.len(),
                "document registered"
            );
            Ok((document, files))
        }
        Err(err) => {
            staged.discard().await;
            let err = err.during(OPERATION);
            error!(error = %err, "document registration rolled back");
            Err(err)
        }
    }
}
