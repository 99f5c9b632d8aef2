use std::sync::Arc;

use anyhow::Result;

use crate::{
    config::{AppConfig, StorageBackend},
    db::{PgPool, PgPooledConnection},
    error::{AppError, AppResult},
    s3,
    storage::{BlobStore, LocalStorage, ObjectStorage},
    workflow::WorkflowService,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            storage,
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    pub fn blobs(&self) -> BlobStore {
        BlobStore::new(self.storage.clone())
    }

    pub fn workflow(&self) -> WorkflowService {
        WorkflowService::new(self.pool.clone(), self.blobs())
            .with_upload_limit(self.config.max_upload_bytes)
    }
}

pub async fn storage_from_config(config: &AppConfig) -> Result<Arc<dyn ObjectStorage>> {
    let storage: Arc<dyn ObjectStorage> = match config.storage_backend {
        StorageBackend::S3 => Arc::new(s3::connect(config).await?),
        StorageBackend::Local => {
            tracing::info!(root = %config.storage_root.display(), "using local attachment storage");
            Arc::new(LocalStorage::new(config.storage_root.clone()))
        }
    };
    Ok(storage)
}
