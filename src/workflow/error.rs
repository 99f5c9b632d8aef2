use std::error::Error as StdError;

use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{operation} failed: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("{operation} left inconsistent state: {detail}")]
    InconsistentState {
        operation: &'static str,
        detail: String,
    },
}

impl WorkflowError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn persistence(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Persistence {
            operation,
            source: source.into(),
        }
    }

    pub fn storage(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Persistence {
            operation,
            source: source.into(),
        }
    }

    pub fn during(self, operation: &'static str) -> Self {
        match self {
            Self::Persistence { source, .. } => Self::Persistence { operation, source },
            Self::InconsistentState { detail, .. } => Self::InconsistentState { operation, detail },
            other => other,
        }
    }
}

impl From<diesel::result::Error> for WorkflowError {
    fn from(value: diesel::result::Error) -> Self {
        Self::persistence("transaction", value)
    }
}

impl From<diesel::r2d2::PoolError> for WorkflowError {
    fn from(value: diesel::r2d2::PoolError) -> Self {
        Self::persistence("acquire connection", value)
    }
}
