use crate::config::{flag, Vars};
use crate::error::{ExtractError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default S3 region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Directory under the data dir that the local store writes into.
pub const LOCAL_STORE_DIR: &str = "exports";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    S3,
    Local,
}

impl FromStr for StoreKind {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(StoreKind::S3),
            "local" | "file" => Ok(StoreKind::Local),
            other => Err(ExtractError::config(format!(
                "SYNC_STORE must be 's3' or 'local', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Clone)]
pub struct StorageConfig {
    pub kind: StoreKind,
    pub bucket: Option<String>,
    pub region: String,
    pub endpoint: Option<String>,
    /// Static credentials; when unset the AWS default provider chain is used
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
    /// Public base URL objects are reachable under, if any
    pub public_url: Option<String>,
    pub local_root: PathBuf,
}

impl StorageConfig {
    pub fn from_vars(vars: &impl Vars, data_dir: &Path) -> Result<Self> {
        let kind = match vars.var("SYNC_STORE") {
            Some(raw) => raw.parse()?,
            None => StoreKind::S3,
        };

        Ok(Self {
            kind,
            bucket: vars.var("S3_BUCKET"),
            region: vars
                .var("S3_REGION")
                .or_else(|| vars.var("AWS_REGION"))
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint: vars.var("S3_ENDPOINT"),
            access_key: vars
                .var("S3_ACCESS_KEY")
                .or_else(|| vars.var("AWS_ACCESS_KEY_ID")),
            secret_key: vars
                .var("S3_SECRET_KEY")
                .or_else(|| vars.var("AWS_SECRET_ACCESS_KEY")),
            path_style: flag(vars, "S3_PATH_STYLE", false)?,
            public_url: vars.var("S3_PUBLIC_URL"),
            local_root: data_dir.join(LOCAL_STORE_DIR),
        })
    }

    /// Local store rooted at `root`, for development and tests
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            kind: StoreKind::Local,
            bucket: None,
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            path_style: false,
            public_url: None,
            local_root: root.into(),
        }
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            kind: StoreKind::S3,
            bucket: Some(bucket.into()),
            endpoint: Some(endpoint.into()),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
            ..Self::local(LOCAL_STORE_DIR)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.kind == StoreKind::S3 && self.bucket.is_none() {
            return Err(ExtractError::config("S3_BUCKET is required when SYNC_STORE=s3"));
        }
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(ExtractError::config(
                "S3_ACCESS_KEY and S3_SECRET_KEY must be set together",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("kind", &self.kind)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("path_style", &self.path_style)
            .field("public_url", &self.public_url)
            .field("local_root", &self.local_root)
            .finish()
    }
}
