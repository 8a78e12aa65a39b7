//! Object stores the export sink uploads into

use crate::error::{ExtractError, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub mod config;

pub use config::{StorageConfig, StoreKind};

const CONTENT_TYPE: &str = crate::export::CONTENT_TYPE;

/// Whole-object upload. Implementations must never expose a partially
/// written object under `key`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key` and return a URL for the object
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String>;
}

/// Build the store selected by `config`
pub async fn from_config(config: &StorageConfig) -> Result<Box<dyn ObjectStore>> {
    match config.kind {
        StoreKind::S3 => Ok(Box::new(S3Store::new(config).await?)),
        StoreKind::Local => Ok(Box::new(LocalStore::new(&config.local_root))),
    }
}

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    public_url: Option<String>,
}

impl S3Store {
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        debug!("Initializing storage with config: {:?}", config);

        let bucket = config
            .bucket
            .clone()
            .ok_or_else(|| ExtractError::config("S3_BUCKET is not set"))?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "surveysync-storage",
            ));
        }
        let sdk_config = loader.load().await;

        let mut s3_config_builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }
        let client = Client::from_conf(s3_config_builder.build());

        info!("Storage client initialized for bucket: {}", bucket);

        Ok(Self {
            client,
            bucket,
            public_url: config.public_url.clone(),
        })
    }

    pub fn url_for(&self, key: &str) -> String {
        match &self.public_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!("s3://{}/{}", self.bucket, key),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self, bytes), fields(bucket = %self.bucket, size = bytes.len()))]
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        debug!("Uploading {} bytes to s3://{}/{}", bytes.len(), self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(CONTENT_TYPE)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                ExtractError::storage(format!(
                    "upload to s3://{}/{} failed: {}",
                    self.bucket,
                    key,
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;

        Ok(self.url_for(key))
    }
}

/// Writes objects as files under a root directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir));
        if key.is_empty() || escapes {
            return Err(ExtractError::storage(format!("invalid object key '{}'", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        let path = self.path_for(key)?;
        let target = path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| ExtractError::storage(format!("write task failed: {}", e)))?
            .map_err(|e| {
                ExtractError::storage(format!("failed to write {}: {}", path.display(), e))
            })?;

        let absolute = std::path::absolute(&path)?;
        Ok(format!("file://{}", absolute.display()))
    }
}

/// Stage `bytes` in a temp file in the destination directory, then rename.
/// The temp file is deleted if anything fails before the rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_put_creates_directories() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        let url = store
            .put("surveygizmo/survey/42.json.gz", b"payload".to_vec())
            .await
            .unwrap();

        let path = dir.path().join("surveygizmo/survey/42.json.gz");
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("surveygizmo/survey/42.json.gz"));
    }

    #[tokio::test]
    async fn test_local_put_overwrites_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        store.put("s/survey/1.json.gz", b"first".to_vec()).await.unwrap();
        store.put("s/survey/1.json.gz", b"second".to_vec()).await.unwrap();

        let survey_dir = dir.path().join("s/survey");
        assert_eq!(std::fs::read(survey_dir.join("1.json.gz")).unwrap(), b"second");
        assert_eq!(std::fs::read_dir(&survey_dir).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_local_put_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("root"));

        for key in ["../outside.json.gz", "/etc/passwd", ""] {
            let err = store.put(key, vec![1]).await.unwrap_err();
            assert!(matches!(err, ExtractError::Storage(_)), "{key}");
        }
    }

    #[tokio::test]
    async fn test_local_put_failure_is_storage_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("blocker"), b"x").unwrap();
        let store = LocalStore::new(dir.path().join("blocker"));

        let err = store.put("s/survey/1.json.gz", vec![1]).await.unwrap_err();
        assert!(matches!(err, ExtractError::Storage(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_s3_urls() {
        let mut config = StorageConfig::for_minio("http://localhost:9000", "exports");
        let store = S3Store::new(&config).await.unwrap();
        assert_eq!(store.url_for("s/survey/1.json.gz"), "s3://exports/s/survey/1.json.gz");

        config.public_url = Some("https://cdn.example.com/exports/".to_string());
        let store = S3Store::new(&config).await.unwrap();
        assert_eq!(
            store.url_for("s/survey/1.json.gz"),
            "https://cdn.example.com/exports/s/survey/1.json.gz"
        );
    }
}
