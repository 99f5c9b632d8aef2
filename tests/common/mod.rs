use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use http_body_util::BodyExt;
use mesa_partes::config::{AppConfig, StorageBackend};
use mesa_partes::db::{self, PgPool};
use mesa_partes::models::{
    DocumentOrigin, DocumentStatus, NewDocument, NewDocumentFile, NewOffice, NewUser,
};
use mesa_partes::routes;
use mesa_partes::schema::{document_files, document_types, documents, movements, offices, users};
use mesa_partes::state::AppState;
use mesa_partes::storage::{ObjectMetadata, ObjectStorage};
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

/// Holds one `copy_object` call: `reached` fires when the copy starts and
/// the copy waits for `release`.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct CopyGate {
    pub reached: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_deletes: AtomicBool,
    copy_gate: Mutex<Option<CopyGate>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
            content_disposition,
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let guard = self.objects.lock().await;
        guard
            .get(key)
            .map(|obj| obj.bytes.to_vec())
            .ok_or_else(|| anyhow!("object {key} missing"))
    }

    async fn copy_object(&self, source: &str, destination: &str) -> Result<()> {
        let gate = self.copy_gate.lock().await.take();
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
        let mut guard = self.objects.lock().await;
        let mut copy = guard
            .get(source)
            .cloned()
            .ok_or_else(|| anyhow!("object {source} missing"))?;
        copy.key = destination.to_string();
        guard.insert(copy.key.clone(), copy);
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        let guard = self.objects.lock().await;
        Ok(guard.get(key).map(|obj| ObjectMetadata {
            size: obj.bytes.len() as u64,
            content_type: obj.content_type.clone(),
        }))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            bail!("delete of {key} refused");
        }
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }
}

#[allow(dead_code)]
impl FakeStorage {
    pub async fn contains(&self, key: &str) -> bool {
        self.objects.lock().await.contains_key(key)
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn insert(&self, key: &str, data: &[u8], content_type: &str) {
        let stored = StoredObject {
            key: key.to_string(),
            bytes: Bytes::copy_from_slice(data),
            content_type: Some(content_type.to_string()),
            content_disposition: None,
        };
        self.objects.lock().await.insert(key.to_string(), stored);
    }

    pub fn refuse_deletes(&self, refuse: bool) {
        self.fail_deletes.store(refuse, Ordering::SeqCst);
    }

    pub async fn hold_next_copy(&self) -> CopyGate {
        let gate = CopyGate::default();
        *self.copy_gate.lock().await = Some(gate.clone());
        gate
    }
}

/// One part of a multipart request body.
#[allow(dead_code)]
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

#[derive(Clone)]
pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
}

#[allow(dead_code)]
impl TestApp {
    /// `None` when `TEST_DATABASE_URL` is unset.
    pub async fn try_new() -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping integration test");
            return Ok(None);
        };

        let config = AppConfig {
            database_url,
            database_max_pool_size: 4,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            cors_allowed_origin: None,
            storage_backend: StorageBackend::Local,
            storage_root: env::temp_dir(),
            max_upload_bytes: 64 * 1024,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        let state = AppState::new(pool, config, storage_for_state);
        let router = routes::create_router(state.clone());

        Ok(Some(Self {
            state,
            router,
            storage,
        }))
    }

    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub async fn insert_office(&self, code: &str, parent: Option<Uuid>, active: bool) -> Result<Uuid> {
        let row = NewOffice {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: format!("Oficina {code}"),
            parent_office_id: parent,
            level: if parent.is_some() { 2 } else { 1 },
            manager: None,
            active,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(offices::table)
                .values(&row)
                .execute(conn)
                .context("failed to insert office")?;
            Ok(row.id)
        })
        .await
    }

    pub async fn insert_user(&self, name: &str, office_id: Option<Uuid>, active: bool) -> Result<Uuid> {
        let row = NewUser {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: None,
            office_id,
            active,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(users::table)
                .values(&row)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(row.id)
        })
        .await
    }

    pub async fn insert_document_type(&self, name: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let name = name.to_string();
        self.with_conn(move |conn| {
            diesel::insert_into(document_types::table)
                .values((
                    document_types::id.eq(id),
                    document_types::name.eq(name),
                    document_types::active.eq(true),
                ))
                .execute(conn)
                .context("failed to insert document type")?;
            Ok(id)
        })
        .await
    }

    /// A registered document originated by `office_id`, with no movements.
    pub async fn insert_document(&self, office_id: Uuid) -> Result<Uuid> {
        let document_type_id = self.insert_document_type(&format!("Oficio {}", Uuid::new_v4())).await?;
        let row = NewDocument {
            id: Uuid::new_v4(),
            customer_id: None,
            document_number: "OF-001-2025".to_string(),
            case_number: "EXP-0001".to_string(),
            subject: "Solicitud de informe".to_string(),
            origen: DocumentOrigin::Internal,
            document_type_id,
            area_origen_id: office_id,
            gestion_id: None,
            folio: 1,
            reception_date: today(),
            response_deadline: None,
            status: DocumentStatus::InProcess,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(documents::table)
                .values(&row)
                .execute(conn)
                .context("failed to insert document")?;
            Ok(row.id)
        })
        .await
    }

    /// Stores a blob at `path` and records it as an attachment of `document_id`.
    pub async fn attach_file(&self, document_id: Uuid, path: &str, data: &[u8]) -> Result<Uuid> {
        self.storage.insert(path, data, "application/pdf").await;
        let row = NewDocumentFile {
            id: Uuid::new_v4(),
            document_id,
            filename: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            mime_type: "application/pdf".to_string(),
            size: data.len() as i64,
            uploaded_by: None,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(document_files::table)
                .values(&row)
                .execute(conn)
                .context("failed to insert attachment")?;
            Ok(row.id)
        })
        .await
    }

    pub async fn movement_count(&self, document_id: Uuid) -> Result<i64> {
        self.with_conn(move |conn| {
            Ok(movements::table
                .filter(movements::document_id.eq(document_id))
                .count()
                .get_result(conn)?)
        })
        .await
    }

    pub async fn document_status(&self, document_id: Uuid) -> Result<DocumentStatus> {
        self.with_conn(move |conn| {
            Ok(documents::table
                .find(document_id)
                .select(documents::status)
                .first(conn)?)
        })
        .await
    }

    pub async fn movement_sequences(&self, document_id: Uuid) -> Result<Vec<i32>> {
        self.with_conn(move |conn| {
            Ok(movements::table
                .filter(movements::document_id.eq(document_id))
                .select(movements::sequence_number)
                .order(movements::sequence_number.asc())
                .load(conn)?)
        })
        .await
    }

    pub async fn file_paths(&self, document_id: Uuid) -> Result<Vec<String>> {
        self.with_conn(move |conn| {
            Ok(document_files::table
                .filter(document_files::document_id.eq(document_id))
                .select(document_files::path)
                .order(document_files::path.asc())
                .load(conn)?)
        })
        .await
    }

    pub async fn get(&self, path: &str, user: Option<Uuid>) -> Result<hyper::Response<Body>> {
        let builder = with_user(Request::builder().method(Method::GET).uri(path), user);
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        user: Option<Uuid>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let builder = with_user(
            Request::builder()
                .method(Method::POST)
                .uri(path)
                .header("content-type", "application/json"),
            user,
        );
        self.send(builder.body(Body::from(body))?).await
    }

    pub async fn multipart(
        &self,
        method: Method,
        path: &str,
        parts: &[Part<'_>],
        user: Option<Uuid>,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        for part in parts {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend(value.as_bytes());
                }
                Part::File {
                    name,
                    filename,
                    content_type,
                    data,
                } => {
                    body.extend(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
                    body.extend(*data);
                }
            }
            body.extend(b"\r\n");
        }
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let builder = with_user(
            Request::builder().method(method).uri(path).header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            ),
            user,
        );
        self.send(builder.body(Body::from(body))?).await
    }

    async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

fn with_user(builder: axum::http::request::Builder, user: Option<Uuid>) -> axum::http::request::Builder {
    match user {
        Some(user_id) => builder.header("x-user-id", user_id.to_string()),
        None => builder,
    }
}

#[allow(dead_code)]
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

#[allow(dead_code)]
pub async fn body_json<T: serde::de::DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let bytes = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&bytes).with_context(|| {
        format!(
            "unexpected response body: {}",
            String::from_utf8_lossy(&bytes)
        )
    })
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(db::MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE document_files, movements, documents, users, offices, customers, document_types, administrations RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
