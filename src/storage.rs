use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use uuid::Uuid;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";
const MAX_STORED_NAME_CHARS: usize = 200;

const COPY_SOURCE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: u64,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    async fn copy_object(&self, source: &str, destination: &str) -> Result<()>;

    /// Returns `None` when no object is stored under `key`.
    async fn head_object(&self, key: &str) -> Result<Option<ObjectMetadata>>;

    /// Deleting a missing key is not an error.
    async fn delete_object(&self, key: &str) -> Result<()>;
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        if let Some(content_disposition) = content_disposition {
            request = request.content_disposition(content_disposition);
        }

        request
            .send()
            .await
            .context("failed to upload object to S3")?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to download object from S3")?;

        let bytes = response
            .body
            .collect()
            .await
            .context("failed to read object stream")?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    async fn copy_object(&self, source: &str, destination: &str) -> Result<()> {
        let copy_source = format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(source, COPY_SOURCE_ENCODE_SET)
        );
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source)
            .key(destination)
            .send()
            .await
            .context("failed to copy object in S3")?;
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectMetadata {
                size: output.content_length().unwrap_or(0).max(0) as u64,
                content_type: output.content_type().map(str::to_string),
            })),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|service| service.is_not_found())
                    .unwrap_or(false)
                {
                    return Ok(None);
                }
                Err(err).context("failed to inspect object in S3")
            }
        }
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to delete object from S3")?;
        Ok(())
    }
}

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if !is_valid_key(key) {
            bail!("invalid object key '{key}'");
        }
        Ok(self.root.join(key))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        _content_type: Option<String>,
        _content_disposition: Option<String>,
    ) -> Result<()> {
        let path = self.resolve(key)?;
        Self::ensure_parent(&path).await?;
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("failed to write object {key}"))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read object {key}"))
    }

    async fn copy_object(&self, source: &str, destination: &str) -> Result<()> {
        let from = self.resolve(source)?;
        let to = self.resolve(destination)?;
        Self::ensure_parent(&to).await?;
        tokio::fs::copy(&from, &to)
            .await
            .with_context(|| format!("failed to copy object {source} to {destination}"))?;
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        let path = self.resolve(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(ObjectMetadata {
                size: metadata.len(),
                content_type: mime_guess::from_path(&path)
                    .first()
                    .map(|mime| mime.essence_str().to_string()),
            })),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to inspect object {key}")),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to delete object {key}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub path: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
}

/// Path-allocating facade over an [`ObjectStorage`]. Every `store` and
/// `copy` mints a fresh path, so a path is never shared between records.
#[derive(Clone)]
pub struct BlobStore {
    storage: Arc<dyn ObjectStorage>,
}

impl BlobStore {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.storage.head_object(path).await?.is_some())
    }

    pub async fn store(&self, upload: &Upload, directory_hint: &str) -> Result<StoredBlob> {
        let filename = sanitize_filename(&upload.filename);
        let path = fresh_path(directory_hint, &filename);
        let mime_type = upload
            .content_type
            .clone()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| guess_mime_type(&filename));

        self.storage
            .put_object(
                &path,
                upload.bytes.clone(),
                Some(mime_type.clone()),
                inline_content_disposition(&filename),
            )
            .await?;

        Ok(StoredBlob {
            path,
            filename,
            mime_type,
            size: upload.bytes.len() as u64,
        })
    }

    pub async fn copy(&self, source: &str) -> Result<StoredBlob> {
        let filename = display_name_from_path(source);
        let directory = source
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .filter(|dir| !dir.is_empty())
            .unwrap_or("documents");
        let path = fresh_path(directory, &filename);

        self.storage.copy_object(source, &path).await?;
        let metadata = self
            .storage
            .head_object(&path)
            .await?
            .with_context(|| format!("copied object {path} is missing"))?;

        Ok(StoredBlob {
            path,
            mime_type: metadata
                .content_type
                .unwrap_or_else(|| guess_mime_type(&filename)),
            filename,
            size: metadata.size,
        })
    }

    pub async fn size(&self, path: &str) -> Result<u64> {
        let metadata = self
            .storage
            .head_object(path)
            .await?
            .with_context(|| format!("object {path} does not exist"))?;
        Ok(metadata.size)
    }

    pub async fn mime_type(&self, path: &str) -> Result<String> {
        let metadata = self
            .storage
            .head_object(path)
            .await?
            .with_context(|| format!("object {path} does not exist"))?;
        Ok(metadata
            .content_type
            .unwrap_or_else(|| guess_mime_type(&display_name_from_path(path))))
    }

    pub async fn delete(&self, path: &str) -> Result<bool> {
        let existed = self.exists(path).await?;
        if existed {
            self.storage.delete_object(path).await?;
        }
        Ok(existed)
    }

    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.storage.get_object(path).await
    }
}

/// Relative keys made only of plain segments. Anything else can never have
/// been minted by [`BlobStore`].
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && Path::new(key)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

fn fresh_path(directory: &str, filename: &str) -> String {
    let directory = directory.trim_matches('/');
    let directory = if directory.is_empty() {
        "documents"
    } else {
        directory
    };
    format!("{directory}/{}_{filename}", Uuid::new_v4().simple())
}

pub fn display_name_from_path(path: &str) -> String {
    let basename = path.rsplit('/').next().unwrap_or(path);
    let stripped = match basename.split_once('_') {
        Some((prefix, rest)) if !rest.is_empty() && Uuid::try_parse(prefix).is_ok() => rest,
        _ => basename,
    };
    sanitize_filename(stripped)
}

pub fn sanitize_filename(raw: &str) -> String {
    let basename = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = basename
        .trim()
        .chars()
        .map(|ch| if ch.is_control() { '_' } else { ch })
        .take(MAX_STORED_NAME_CHARS)
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "file".to_string()
    } else {
        cleaned
    }
}

fn guess_mime_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string())
}

pub fn inline_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded = utf8_percent_encode(&sanitized, NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    ))
}
