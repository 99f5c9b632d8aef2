pub mod plan;
pub mod reconciler;

use crate::models::DocumentFile;
use crate::storage::Upload;

pub use plan::{plan_reconciliation, ReconcilePlan};
pub use reconciler::{reconcile, StagedAttachments};

pub const DOCUMENTS_DIRECTORY: &str = "documents";
pub const RESPONSES_DIRECTORY: &str = "document-responses";

#[derive(Debug, Clone)]
pub enum SubmittedAttachment {
    Upload(Upload),
    Existing(String),
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub created: Vec<DocumentFile>,
    pub deleted: Vec<String>,
}
