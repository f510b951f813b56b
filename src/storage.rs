use async_trait::async_trait;
use log::{error, info, warn};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{Config, S3Config};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not_found")]
    NotFound,
    #[error("invalid key '{0}'")]
    InvalidKey(String),
    #[error("other: {0}")]
    Other(String),
}

/// Object storage for uploaded design files. Keys look like `{owner_id}/{name}.{ext}`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
    async fn get(&self, key: &str) -> Result<(Vec<u8>, String), StorageError>;
    /// Removing a key that does not exist is not an error.
    async fn remove(&self, keys: &[String]) -> Result<(), StorageError>;
    /// Public URL clients use to fetch `key`.
    fn public_url(&self, key: &str) -> String;
}

/// Path segment that precedes the object key in every public URL.
pub const BUCKET_SEGMENT: &str = "/designs/";

/// Fresh random object key for a file owned by `owner`.
pub fn object_key(owner: Uuid, ext: &str) -> String {
    format!("{owner}/{}.{}", Uuid::new_v4().simple(), ext.trim_start_matches('.').to_ascii_lowercase())
}

/// Recover the object key from a public URL produced by [`ObjectStore::public_url`].
pub fn key_from_public_url(url: &str) -> Option<String> {
    let idx = url.find(BUCKET_SEGMENT)?;
    let key = &url[idx + BUCKET_SEGMENT.len()..];
    let key = key.split(['?', '#']).next().unwrap_or_default();
    if key.is_empty() { None } else { Some(key.to_string()) }
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let ok = !key.is_empty()
        && Path::new(key).components().all(|c| matches!(c, Component::Normal(_)));
    if ok { Ok(()) } else { Err(StorageError::InvalidKey(key.to_string())) }
}

fn sniff_mime(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into())
}

// ---------------- Filesystem implementation (local runs and tests) ----------------
pub struct FsObjectStore {
    root: PathBuf,
    media_base_url: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, media_base_url: impl Into<String>) -> Self {
        Self { root: root.into(), media_base_url: media_base_url.into().trim_end_matches('/').to_string() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, _content_type: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StorageError::Other(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            error!("write failed key={key} path={}: {e}", path.display());
            StorageError::Other(e.to_string())
        })
    }
    async fn get(&self, key: &str) -> Result<(Vec<u8>, String), StorageError> {
        let path = self.path_for(key)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound,
            _ => StorageError::Other(e.to_string()),
        })?;
        let mime = sniff_mime(&bytes);
        Ok((bytes, mime))
    }
    async fn remove(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            let path = self.path_for(key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::Other(format!("{key}: {e}"))),
            }
        }
        Ok(())
    }
    fn public_url(&self, key: &str) -> String {
        format!("{}{}{}", self.media_base_url, BUCKET_SEGMENT, key)
    }
}

// ---------------- S3 implementation (MinIO compatible) ----------------
pub struct S3ObjectStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    public_base_url: String,
}

impl S3ObjectStore {
    pub async fn new(cfg: &S3Config, media_base_url: &str) -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(cfg.region.clone()))
            .endpoint_url(cfg.endpoint.clone());
        if !cfg.access_key.is_empty() && !cfg.secret_key.is_empty() {
            let creds = Credentials::new(cfg.access_key.clone(), cfg.secret_key.clone(), None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // Path-style addressing: MinIO/local endpoints rarely have wildcard DNS.
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf).force_path_style(true).build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("initialized S3 client for bucket '{}'", cfg.bucket);

        if let Err(e) = client.head_bucket().bucket(&cfg.bucket).send().await {
            warn!("head_bucket failed for '{}' (will attempt create): {e:?}", cfg.bucket);
            client
                .create_bucket()
                .bucket(&cfg.bucket)
                .send()
                .await
                .map_err(|e2| anyhow::anyhow!("failed to ensure bucket '{}': {e2}", cfg.bucket))?;
            info!("created bucket '{}'", cfg.bucket);
        }

        // Without a public endpoint, files are proxied through our own /media route.
        let public_base_url = cfg
            .public_url
            .clone()
            .unwrap_or_else(|| media_base_url.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self { bucket: cfg.bucket.clone(), client, public_base_url })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        use aws_sdk_s3::primitives::ByteStream;
        validate_key(key)?;
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes));
        if let Err(e) = put.send().await {
            error!("put_object failed key={key} bucket={} err={:?}", self.bucket, e);
            let hint = if e.to_string().contains("AccessDenied") {
                " (check S3_ACCESS_KEY/S3_SECRET_KEY permissions)"
            } else {
                ""
            };
            return Err(StorageError::Other(format!("{e}{hint}")));
        }
        Ok(())
    }
    async fn get(&self, key: &str) -> Result<(Vec<u8>, String), StorageError> {
        validate_key(key)?;
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|_| StorageError::NotFound)?;
        let declared = obj.content_type().map(str::to_string);
        let data = obj.body.collect().await.map_err(|e| StorageError::Other(e.to_string()))?;
        let bytes = data.into_bytes().to_vec();
        let mime = declared.unwrap_or_else(|| sniff_mime(&bytes));
        Ok((bytes, mime))
    }
    async fn remove(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            validate_key(key)?;
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| StorageError::Other(format!("{key}: {e}")))?;
        }
        Ok(())
    }
    fn public_url(&self, key: &str) -> String {
        format!("{}{}{}", self.public_base_url, BUCKET_SEGMENT, key)
    }
}

/// S3 when `S3_ENDPOINT` is configured, otherwise files under `{data_dir}/media`.
pub async fn build_object_store(cfg: &Config) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match &cfg.s3 {
        Some(s3) => Ok(Arc::new(S3ObjectStore::new(s3, &cfg.media_base_url).await?)),
        None => {
            let root = cfg.data_dir.join("media");
            info!("using filesystem object store at '{}'", root.display());
            Ok(Arc::new(FsObjectStore::new(root, cfg.media_base_url.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_round_trips_through_public_url() {
        let store = FsObjectStore::new("/tmp/unused", "http://localhost:8080/media/");
        let owner = Uuid::new_v4();
        let key = object_key(owner, ".PNG");
        assert!(key.starts_with(&owner.to_string()));
        assert!(key.ends_with(".png"));
        let url = store.public_url(&key);
        assert_eq!(url, format!("http://localhost:8080/media/designs/{key}"));
        assert_eq!(key_from_public_url(&url).as_deref(), Some(key.as_str()));
    }

    #[test]
    fn foreign_urls_have_no_key() {
        assert_eq!(key_from_public_url("https://cdn.example.com/avatars/a.png"), None);
        assert_eq!(key_from_public_url("https://x/designs/"), None);
        assert_eq!(key_from_public_url("https://x/designs/a/b.png?v=2").as_deref(), Some("a/b.png"));
    }

    #[test]
    fn traversal_keys_rejected() {
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/abs/path").is_err());
        assert!(validate_key("owner/file.png").is_ok());
    }
}
