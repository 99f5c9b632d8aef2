use chrono::Utc;
use diesel::PgConnection;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::commands::{
    plan_archive, plan_forward, plan_reject, plan_respond, ArchiveRequest, ForwardRequest,
    RejectRequest, RespondRequest, Transition,
};
use super::error::{WorkflowError, WorkflowResult};
use super::{ledger, ActingContext, WorkflowOutcome};
use crate::attachments::{ReconcilePlan, StagedAttachments, RESPONSES_DIRECTORY};
use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use crate::db::PgPool;
use crate::directory::{require_office, require_user};
use crate::models::{Document, Movement};
use crate::storage::{BlobStore, Upload};

#[derive(Clone)]
pub struct WorkflowService {
    pool: PgPool,
    blobs: BlobStore,
    max_upload_bytes: usize,
}

impl WorkflowService {
    pub fn new(pool: PgPool, blobs: BlobStore) -> Self {
        Self {
            pool,
            blobs,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_upload_limit(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub async fn forward(
        &self,
        ctx: &ActingContext,
        document_id: Uuid,
        request: ForwardRequest,
    ) -> WorkflowResult<WorkflowOutcome> {
        const OPERATION: &str = "forward";

        let result = self.in_transaction(|conn| {
            let document = ledger::lock_document(conn, document_id)?;
            let destination = require_office(conn, request.destination()?)?;
            let destination_user = request
                .destination_user_id
                .map(|user_id| require_user(conn, user_id))
                .transpose()?;
            if let Some(origin) = request.origin_office_id {
                require_office(conn, origin)?;
            }

            let transition = plan_forward(
                ctx,
                &document,
                &request,
                &destination,
                destination_user.as_ref(),
            )?;
            commit(conn, &document, transition)
        });

        let (document, movement) = settle(OPERATION, document_id, result)?;
        Ok(WorkflowOutcome {
            document,
            movement,
            attachments: Vec::new(),
        })
    }

    pub async fn respond(
        &self,
        ctx: &ActingContext,
        movement_id: Uuid,
        request: RespondRequest,
        uploads: Vec<Upload>,
    ) -> WorkflowResult<WorkflowOutcome> {
        const OPERATION: &str = "respond";

        let (office_id, user_id) = request.check().map_err(|err| {
            warn!(%movement_id, error = %err, "respond rejected");
            err
        })?;
        let document_id = self.document_of(movement_id).map_err(|err| err.during(OPERATION))?;

        let mut staged = StagedAttachments::stage(
            &self.blobs,
            ReconcilePlan::uploads_only(uploads),
            RESPONSES_DIRECTORY,
            self.max_upload_bytes,
        )
        .await
        .map_err(|err| err.during(OPERATION))?;

        let result = self.in_transaction(|conn| {
            let document = ledger::lock_document(conn, document_id)?;
            let destination = require_office(conn, office_id)?;
            let destination_user = require_user(conn, user_id)?;
            let transition = plan_respond(
                ctx,
                &document,
                &request,
                &destination,
                &destination_user,
                today(),
            )?;
            let (document, movement) = commit(conn, &document, transition)?;
            let attachments = staged.persist(conn, document.id, Some(ctx.user_id))?;
            Ok((document, movement, attachments))
        });

        match result {
            Ok((document, movement, attachments)) => {
                staged.mark_committed();
                staged.finish(OPERATION).await?;
                log_committed(OPERATION, &document, &movement);
                Ok(WorkflowOutcome {
                    document,
                    movement,
                    attachments,
                })
            }
            Err(err) => {
                staged.discard().await;
                Err(log_failure(OPERATION, document_id, err))
            }
        }
    }

    pub async fn reject(
        &self,
        ctx: &ActingContext,
        movement_id: Uuid,
        request: RejectRequest,
    ) -> WorkflowResult<WorkflowOutcome> {
        const OPERATION: &str = "reject";

        let document_id = self.document_of(movement_id).map_err(|err| err.during(OPERATION))?;
        let result = self.in_transaction(|conn| {
            let document = ledger::lock_document(conn, document_id)?;
            let transition = plan_reject(ctx, &document, &request, today())?;
            commit(conn, &document, transition)
        });

        let (document, movement) = settle(OPERATION, document_id, result)?;
        Ok(WorkflowOutcome {
            document,
            movement,
            attachments: Vec::new(),
        })
    }

    pub async fn archive(
        &self,
        ctx: &ActingContext,
        movement_id: Uuid,
        request: ArchiveRequest,
    ) -> WorkflowResult<WorkflowOutcome> {
        const OPERATION: &str = "archive";

        let document_id = self.document_of(movement_id).map_err(|err| err.during(OPERATION))?;
        let result = self.in_transaction(|conn| {
            let document = ledger::lock_document(conn, document_id)?;
            let transition = plan_archive(ctx, &document, &request, today())?;
            commit(conn, &document, transition)
        });

        let (document, movement) = settle(OPERATION, document_id, result)?;
        Ok(WorkflowOutcome {
            document,
            movement,
            attachments: Vec::new(),
        })
    }

    fn document_of(&self, movement_id: Uuid) -> WorkflowResult<Uuid> {
        let mut conn = self.pool.get()?;
        Ok(ledger::find_movement(&mut conn, movement_id)?.document_id)
    }

    fn in_transaction<T, F>(&self, body: F) -> WorkflowResult<T>
    where
        F: FnOnce(&mut PgConnection) -> WorkflowResult<T>,
    {
        let mut conn = self.pool.get()?;
        conn.build_transaction().serializable().run(body)
    }
}

fn commit(
    conn: &mut PgConnection,
    document: &Document,
    transition: Transition,
) -> WorkflowResult<(Document, Movement)> {
    ledger::append(conn, document, transition.draft, &transition.routing)
}

fn today() -> chrono::NaiveDate {
    Utc::now().date_naive()
}

fn settle(
    operation: &'static str,
    document_id: Uuid,
    result: WorkflowResult<(Document, Movement)>,
) -> WorkflowResult<(Document, Movement)> {
    match result {
        Ok((document, movement)) => {
            log_committed(operation, &document, &movement);
            Ok((document, movement))
        }
        Err(err) => Err(log_failure(operation, document_id, err)),
    }
}

fn log_committed(operation: &'static str, document: &Document, movement: &Movement) {
    info!(
        operation,
        document_id = %document.id,
        movement_id = %movement.id,
        sequence = movement.sequence_number,
        action = %movement.action,
        status = %document.status,
        "workflow command committed"
    );
}

fn log_failure(operation: &'static str, document_id: Uuid, err: WorkflowError) -> WorkflowError {
    let err = err.during(operation);
    match &err {
        WorkflowError::Validation { .. } | WorkflowError::NotFound { .. } => {
            warn!(operation, %document_id, error = %err, "workflow command rejected");
        }
        WorkflowError::Persistence { .. } | WorkflowError::InconsistentState { .. } => {
            error!(operation, %document_id, error = %err, "workflow command rolled back");
        }
    }
    err
}
