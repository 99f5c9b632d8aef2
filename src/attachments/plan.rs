use std::collections::HashSet;

use uuid::Uuid;

use super::SubmittedAttachment;
use crate::models::DocumentFile;
use crate::storage::Upload;

#[derive(Debug, Default)]
pub struct ReconcilePlan {
    pub uploads: Vec<Upload>,
    pub adopt: Vec<String>,
    pub retained: Vec<String>,
    pub delete: Vec<DocumentFile>,
    /// Ids of the attachments the plan was computed from. `None` appends
    /// without regard to the current set.
    pub snapshot: Option<Vec<Uuid>>,
}

impl ReconcilePlan {
    pub fn uploads_only(uploads: Vec<Upload>) -> Self {
        Self {
            uploads,
            ..Self::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.uploads.is_empty() && self.adopt.is_empty() && self.delete.is_empty()
    }
}

pub fn plan_reconciliation(
    current: &[DocumentFile],
    submitted: Vec<SubmittedAttachment>,
) -> ReconcilePlan {
    let current_paths: HashSet<&str> = current.iter().map(|file| file.path.as_str()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut plan = ReconcilePlan::default();

    for entry in submitted {
        match entry {
            SubmittedAttachment::Upload(upload) => plan.uploads.push(upload),
            SubmittedAttachment::Existing(path) => {
                let path = path.trim().to_string();
                if path.is_empty() || !seen.insert(path.clone()) {
                    continue;
                }
                if current_paths.contains(path.as_str()) {
                    plan.retained.push(path);
                } else {
                    plan.adopt.push(path);
                }
            }
        }
    }

    plan.delete = current
        .iter()
        .filter(|file| !seen.contains(&file.path))
        .cloned()
        .collect();
    plan.snapshot = Some(current.iter().map(|file| file.id).collect());

    plan
}
