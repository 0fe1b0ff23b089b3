//! Configuration for the remote build pipeline.
//!
//! Loaded from an optional TOML file and then overridden by `ZEPPELIN_*`
//! environment variables. Every field has a default, so an empty file (or no
//! file at all) is a valid configuration with remote building disabled.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZeppelinError};
use crate::storage::UploadOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote_build: RemoteBuildConfig,
    pub repository: RepositoryConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

/// When to build remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteBuildConfig {
    /// Feature flag; remote building is never attempted when off.
    pub enabled: bool,
    /// Name of the repository vectors are uploaded to.
    pub repository: Option<String>,
    /// Vector blobs smaller than this are built locally.
    pub size_threshold_bytes: u64,
    /// Identifies this cluster to the build service.
    pub tenant_id: String,
}

impl Default for RemoteBuildConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repository: None,
            size_threshold_bytes: 50 * 1024 * 1024,
            tenant_id: "zeppelin".to_string(),
        }
    }
}

/// The blob repository shared with the build service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub name: String,
    /// `s3`, `fs` or `memory`. Only `s3` repositories can be used by the
    /// build service.
    #[serde(rename = "type")]
    pub repository_type: String,
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom S3 endpoint (MinIO, LocalStack).
    pub endpoint: Option<String>,
    /// Root directory for `fs` repositories.
    pub path: Option<String>,
    /// Prefix under which vector blobs are written.
    pub base_path: String,
    pub part_size_bytes: u64,
    pub max_upload_concurrency: usize,
    pub parallel_upload: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        let upload = UploadOptions::default();
        Self {
            name: "vectors".to_string(),
            repository_type: "s3".to_string(),
            bucket: None,
            region: None,
            endpoint: None,
            path: None,
            base_path: "zeppelin".to_string(),
            part_size_bytes: upload.part_size,
            max_upload_concurrency: upload.max_concurrency,
            parallel_upload: upload.parallel_upload,
        }
    }
}

impl RepositoryConfig {
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            part_size: self.part_size_bytes,
            max_concurrency: self.max_upload_concurrency,
            parallel_upload: self.parallel_upload,
        }
    }
}

/// The HTTP client talking to the build service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Wait before the first status poll.
    pub initial_delay_ms: u64,
    pub poll_interval_ms: u64,
    /// Give up on a job after this long.
    pub timeout_secs: u64,
    /// Timeout of a single HTTP request.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:1025".to_string(),
            username: None,
            password: None,
            initial_delay_ms: 1_000,
            poll_interval_ms: 5_000,
            timeout_secs: 60 * 60,
            request_timeout_secs: 60,
        }
    }
}

impl ClientConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Config {
    /// Load `.env`, then the TOML file at `path` (or `$ZEPPELIN_CONFIG`), then
    /// environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = path
            .map(str::to_string)
            .or_else(|| std::env::var("ZEPPELIN_CONFIG").ok());
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| ZeppelinError::Config(format!("cannot read {path}: {e}")))?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ZeppelinError::Config(format!("invalid config: {e}")))
    }

    /// Apply `ZEPPELIN_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("ZEPPELIN_REMOTE_BUILD_ENABLED") {
            self.remote_build.enabled = parse_var("ZEPPELIN_REMOTE_BUILD_ENABLED", &v)?;
        }
        if let Some(v) = lookup("ZEPPELIN_REMOTE_BUILD_REPOSITORY") {
            self.remote_build.repository = Some(v);
        }
        if let Some(v) = lookup("ZEPPELIN_REMOTE_BUILD_SIZE_THRESHOLD") {
            self.remote_build.size_threshold_bytes =
                parse_var("ZEPPELIN_REMOTE_BUILD_SIZE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("ZEPPELIN_TENANT_ID") {
            self.remote_build.tenant_id = v;
        }
        if let Some(v) = lookup("ZEPPELIN_REPOSITORY_TYPE") {
            self.repository.repository_type = v;
        }
        if let Some(v) = lookup("ZEPPELIN_REPOSITORY_BUCKET") {
            self.repository.bucket = Some(v);
        }
        if let Some(v) = lookup("ZEPPELIN_REPOSITORY_REGION") {
            self.repository.region = Some(v);
        }
        if let Some(v) = lookup("ZEPPELIN_REPOSITORY_ENDPOINT") {
            self.repository.endpoint = Some(v);
        }
        if let Some(v) = lookup("ZEPPELIN_CLIENT_ENDPOINT") {
            self.client.endpoint = v;
        }
        if let Some(v) = lookup("ZEPPELIN_CLIENT_USERNAME") {
            self.client.username = Some(v);
        }
        if let Some(v) = lookup("ZEPPELIN_CLIENT_PASSWORD") {
            self.client.password = Some(v);
        }
        if let Some(v) = lookup("ZEPPELIN_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("ZEPPELIN_LOG_FORMAT") {
            self.logging.format = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.repository.part_size_bytes == 0 {
            return Err(ZeppelinError::Config(
                "repository.part_size_bytes must be positive".to_string(),
            ));
        }
        if self.repository.max_upload_concurrency == 0 {
            return Err(ZeppelinError::Config(
                "repository.max_upload_concurrency must be positive".to_string(),
            ));
        }
        if self.client.poll_interval_ms == 0 {
            return Err(ZeppelinError::Config(
                "client.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.remote_build.enabled {
            url::Url::parse(&self.client.endpoint).map_err(|e| {
                ZeppelinError::Config(format!(
                    "invalid client.endpoint {}: {e}",
                    self.client.endpoint
                ))
            })?;
        }
        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(ZeppelinError::Config(format!(
                "unknown logging.format {other}"
            ))),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ZeppelinError::Config(format!("invalid {key}={value}: {e}")))
}
