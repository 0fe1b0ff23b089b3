use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use tracing::info;

use crate::config::RepositoryConfig;
use crate::error::{Result, ZeppelinError};

use super::{BlobContainer, BlobStoreRepository, ObjectStoreBlobContainer, RepositoryMetadata, UploadOptions};

/// A repository whose containers are prefixes of one object store.
#[derive(Clone)]
pub struct ObjectStoreRepository {
    store: Arc<dyn ObjectStore>,
    metadata: RepositoryMetadata,
    base_path: String,
    options: UploadOptions,
}

impl ObjectStoreRepository {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        metadata: RepositoryMetadata,
        base_path: impl Into<String>,
        options: UploadOptions,
    ) -> Self {
        Self {
            store,
            metadata,
            base_path: base_path.into(),
            options,
        }
    }

    /// Build the object store described by `config`.
    pub fn from_config(config: &RepositoryConfig) -> Result<Self> {
        let mut metadata = RepositoryMetadata::new(&config.name, &config.repository_type);

        let store: Arc<dyn ObjectStore> = match config.repository_type.as_str() {
            "s3" => {
                let bucket = config.bucket.as_deref().ok_or_else(|| {
                    ZeppelinError::Config("s3 repository requires a bucket".to_string())
                })?;
                metadata = metadata.with_setting("bucket", bucket);

                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                    metadata = metadata.with_setting("region", region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_allow_http(endpoint.starts_with("http://"));
                    metadata = metadata.with_setting("endpoint", endpoint);
                }
                Arc::new(builder.build().map_err(|e| {
                    ZeppelinError::Config(format!("failed to create S3 store: {e}"))
                })?)
            }
            "fs" => {
                let root = config.path.as_deref().ok_or_else(|| {
                    ZeppelinError::Config("fs repository requires a path".to_string())
                })?;
                std::fs::create_dir_all(root).map_err(|e| {
                    ZeppelinError::Config(format!("failed to create repository dir {root}: {e}"))
                })?;
                metadata = metadata.with_setting("path", root);
                Arc::new(LocalFileSystem::new_with_prefix(root).map_err(|e| {
                    ZeppelinError::Config(format!("failed to open repository dir {root}: {e}"))
                })?)
            }
            "memory" => Arc::new(InMemory::new()),
            other => {
                return Err(ZeppelinError::Config(format!(
                    "unsupported repository type: {other}"
                )))
            }
        };

        info!(
            repository = %config.name,
            repository_type = %config.repository_type,
            base_path = %config.base_path,
            "initialized repository"
        );

        Ok(Self::new(
            store,
            metadata,
            config.base_path.clone(),
            config.upload_options(),
        ))
    }
}

impl BlobStoreRepository for ObjectStoreRepository {
    fn metadata(&self) -> &RepositoryMetadata {
        &self.metadata
    }

    fn base_path(&self) -> &str {
        &self.base_path
    }

    fn blob_container(&self, path: &str) -> Arc<dyn BlobContainer> {
        Arc::new(ObjectStoreBlobContainer::new(
            self.store.clone(),
            path,
            self.options.clone(),
        ))
    }
}
