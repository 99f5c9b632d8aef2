use std::fmt;

use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::plan::{plan_reconciliation, ReconcilePlan};
use super::{ReconcileOutcome, SubmittedAttachment, DOCUMENTS_DIRECTORY};
use crate::db::PgPool;
use crate::models::{DocumentFile, NewDocumentFile};
use crate::schema::{document_files, documents};
use crate::storage::{is_valid_key, BlobStore, StoredBlob};
use crate::workflow::error::{WorkflowError, WorkflowResult};
use crate::workflow::{ledger, ActingContext};

/// Blobs written ahead of a transaction, plus the rows it will remove.
///
/// Settle with [`finish`](Self::finish) after a commit (call
/// [`mark_committed`](Self::mark_committed) first) or
/// [`discard`](Self::discard) after a rollback. Dropped unsettled, it
/// spawns cleanup of whatever blobs would otherwise be left unreferenced.
pub struct StagedAttachments {
    blobs: BlobStore,
    staged: Vec<StoredBlob>,
    delete: Vec<DocumentFile>,
    snapshot: Option<Vec<Uuid>>,
    committed: bool,
}

impl StagedAttachments {
    pub async fn stage(
        blobs: &BlobStore,
        plan: ReconcilePlan,
        directory_hint: &str,
        max_upload_bytes: usize,
    ) -> WorkflowResult<Self> {
        for upload in &plan.uploads {
            if upload.bytes.len() > max_upload_bytes {
                return Err(WorkflowError::validation(
                    "file",
                    format!(
                        "{} is {} bytes, larger than the {} byte limit",
                        upload.filename,
                        upload.bytes.len(),
                        max_upload_bytes
                    ),
                ));
            }
        }
        for path in &plan.adopt {
            if !is_valid_key(path) {
                return Err(WorkflowError::not_found("blob", path));
            }
            let present = blobs
                .exists(path)
                .await
                .map_err(|err| WorkflowError::storage("stage attachments", err))?;
            if !present {
                return Err(WorkflowError::not_found("blob", path));
            }
        }

        let mut staged = Self {
            blobs: blobs.clone(),
            staged: Vec::with_capacity(plan.uploads.len() + plan.adopt.len()),
            delete: plan.delete,
            snapshot: plan.snapshot,
            committed: false,
        };

        for upload in &plan.uploads {
            match blobs.store(upload, directory_hint).await {
                Ok(blob) => staged.staged.push(blob),
                Err(err) => {
                    staged.discard().await;
                    return Err(WorkflowError::storage("store attachment", err));
                }
            }
        }
        for path in &plan.adopt {
            match blobs.copy(path).await {
                Ok(blob) => {
                    info!(source = %path, path = %blob.path, "copied adopted attachment");
                    staged.staged.push(blob);
                }
                Err(err) => {
                    staged.discard().await;
                    return Err(WorkflowError::storage("copy attachment", err));
                }
            }
        }

        Ok(staged)
    }

    pub fn staged_paths(&self) -> impl Iterator<Item = &str> {
        self.staged.iter().map(|blob| blob.path.as_str())
    }

    pub fn persist(
        &self,
        conn: &mut PgConnection,
        document_id: Uuid,
        uploaded_by: Option<Uuid>,
    ) -> WorkflowResult<Vec<DocumentFile>> {
        if let Some(snapshot) = &self.snapshot {
            let mut expected = snapshot.clone();
            expected.sort();
            let mut current: Vec<Uuid> = document_files::table
                .filter(document_files::document_id.eq(document_id))
                .select(document_files::id)
                .load(conn)?;
            current.sort();
            if current != expected {
                return Err(WorkflowError::persistence(
                    "persist attachments",
                    "attachments changed while the submission was being stored",
                ));
            }
        }

        let mut created = Vec::with_capacity(self.staged.len());
        for blob in &self.staged {
            let row = NewDocumentFile {
                id: Uuid::new_v4(),
                document_id,
                filename: blob.filename.clone(),
                path: blob.path.clone(),
                mime_type: blob.mime_type.clone(),
                size: i64::try_from(blob.size).unwrap_or(i64::MAX),
                uploaded_by,
            };
            let file: DocumentFile = diesel::insert_into(document_files::table)
                .values(&row)
                .get_result(conn)?;
            created.push(file);
        }

        if !self.delete.is_empty() {
            let ids: Vec<Uuid> = self.delete.iter().map(|file| file.id).collect();
            diesel::delete(
                document_files::table
                    .filter(document_files::document_id.eq(document_id))
                    .filter(document_files::id.eq_any(ids)),
            )
            .execute(conn)?;
        }

        Ok(created)
    }

    pub fn mark_committed(&mut self) {
        self.committed = true;
        self.staged.clear();
    }

    pub async fn finish(mut self, operation: &'static str) -> WorkflowResult<Vec<String>> {
        self.mark_committed();
        let mut deleted = Vec::with_capacity(self.delete.len());
        let mut leftover = Vec::new();

        while let Some(path) = self.delete.last().map(|file| file.path.clone()) {
            match self.blobs.delete(&path).await {
                Ok(true) => deleted.push(path),
                Ok(false) => {
                    warn!(path = %path, "attachment blob was already gone");
                    deleted.push(path);
                }
                Err(err) => {
                    error!(
                        operation,
                        path = %path,
                        error = %err,
                        "attachment row removed but blob could not be deleted"
                    );
                    leftover.push(path);
                }
            }
            self.delete.pop();
        }
        deleted.reverse();

        if !leftover.is_empty() {
            return Err(WorkflowError::InconsistentState {
                operation,
                detail: format!("unreferenced blobs left in storage: {}", leftover.join(", ")),
            });
        }
        Ok(deleted)
    }

    pub async fn discard(mut self) {
        while let Some(path) = self.staged.last().map(|blob| blob.path.clone()) {
            if let Err(err) = self.blobs.delete(&path).await {
                error!(path = %path, error = %err, "failed to remove staged attachment blob");
            }
            self.staged.pop();
        }
    }

    fn unsettled_paths(&mut self) -> Vec<String> {
        if self.committed {
            self.delete.drain(..).map(|file| file.path).collect()
        } else {
            self.staged.drain(..).map(|blob| blob.path).collect()
        }
    }
}

impl fmt::Debug for StagedAttachments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedAttachments")
            .field("staged", &self.staged)
            .field("delete", &self.delete)
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}

impl Drop for StagedAttachments {
    fn drop(&mut self) {
        let paths = self.unsettled_paths();
        if paths.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(?paths, "attachment blobs abandoned without a runtime to remove them");
            return;
        };
        warn!(count = paths.len(), "attachment work abandoned, removing unreferenced blobs");
        let blobs = self.blobs.clone();
        runtime.spawn(async move {
            for path in paths {
                if let Err(err) = blobs.delete(&path).await {
                    error!(path = %path, error = %err, "failed to remove abandoned attachment blob");
                }
            }
        });
    }
}

pub fn load_files(conn: &mut PgConnection, document_id: Uuid) -> QueryResult<Vec<DocumentFile>> {
    document_files::table
        .filter(document_files::document_id.eq(document_id))
        .order(document_files::created_at.asc())
        .load(conn)
}

pub async fn reconcile(
    pool: &PgPool,
    blobs: &BlobStore,
    ctx: &ActingContext,
    document_id: Uuid,
    submitted: Vec<SubmittedAttachment>,
    max_upload_bytes: usize,
) -> WorkflowResult<ReconcileOutcome> {
    const OPERATION: &str = "reconcile";

    let current = {
        let mut conn = pool.get().map_err(|err| WorkflowError::from(err).during(OPERATION))?;
        let exists = documents::table
            .find(document_id)
            .select(documents::id)
            .first::<Uuid>(&mut conn)
            .optional()
            .map_err(|err| WorkflowError::from(err).during(OPERATION))?;
        if exists.is_none() {
            return Err(WorkflowError::not_found("document", document_id));
        }
        load_files(&mut conn, document_id).map_err(|err| WorkflowError::from(err).during(OPERATION))?
    };

    let plan = plan_reconciliation(&current, submitted);
    if plan.is_noop() {
        return Ok(ReconcileOutcome::default());
    }

    let mut staged = StagedAttachments::stage(blobs, plan, DOCUMENTS_DIRECTORY, max_upload_bytes)
        .await
        .map_err(|err| err.during(OPERATION))?;

    // Touching the row makes an overlapping reconcile fail to serialize.
    let committed = pool.get().map_err(WorkflowError::from).and_then(|mut conn| {
        conn.build_transaction()
            .serializable()
            .run(|conn| -> WorkflowResult<Vec<DocumentFile>> {
                ledger::lock_document(conn, document_id)?;
                diesel::update(documents::table.find(document_id))
                    .set(documents::updated_at.eq(Utc::now().naive_utc()))
                    .execute(conn)?;
                staged.persist(conn, document_id, Some(ctx.user_id))
            })
    });

    match committed {
        Ok(created) => {
            staged.mark_committed();
            let deleted = staged.finish(OPERATION).await?;
            info!(
                %document_id,
                created = created.len(),
                deleted = deleted.len(),
                "reconciled document attachments"
            );
            Ok(ReconcileOutcome { created, deleted })
        }
        Err(err) => {
            staged.discard().await;
            error!(%document_id, error = %err, "attachment reconciliation rolled back");
            Err(err.during(OPERATION))
        }
    }
}
