pub mod commands;
pub mod error;
pub mod ledger;
pub mod service;
pub mod state_machine;

use uuid::Uuid;

use crate::models::{Document, DocumentFile, Movement};

pub use commands::{ArchiveRequest, ForwardRequest, RejectRequest, RespondRequest};
pub use error::{WorkflowError, WorkflowResult};
pub use service::WorkflowService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingContext {
    pub user_id: Uuid,
    pub office_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub document: Document,
    pub movement: Movement,
    pub attachments: Vec<DocumentFile>,
}
