use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use ulid::Ulid;

use crate::client::{RemoteBuildRequest, RemoteBuildStatusRequest, RemoteIndexClient};
use crate::error::{Result, ZeppelinError};
use crate::metrics::{MetricsSink, RemoteIndexBuildMetrics};
use crate::repository::{
    DefaultVectorRepositoryAccessor, VectorRepositoryAccessor, DOC_ID_FILE_EXTENSION,
    VECTOR_BLOB_FILE_EXTENSION,
};
use crate::storage::{BlobContainer, BlobStoreRepository};

use super::{BuildIndexParams, NativeIndexBuildStrategy};

/// Only S3 repositories can be read by the build service.
pub const S3_REPOSITORY_TYPE: &str = "s3";
const BUCKET_SETTING: &str = "bucket";
const VECTORS_PATH_SUFFIX: &str = "_vectors";

/// Builds indexes on the remote build service.
///
/// Runs WRITE, SUBMIT, AWAIT and READ in order. Any failure along the way is
/// logged and the build is handed to `fallback` once; the remote error itself
/// is not returned.
pub struct RemoteIndexBuildStrategy {
    repository: Arc<dyn BlobStoreRepository>,
    client: Arc<dyn RemoteIndexClient>,
    fallback: Arc<dyn NativeIndexBuildStrategy>,
    metrics: Arc<dyn MetricsSink>,
    tenant_id: String,
}

impl RemoteIndexBuildStrategy {
    pub fn new(
        repository: Arc<dyn BlobStoreRepository>,
        client: Arc<dyn RemoteIndexClient>,
        fallback: Arc<dyn NativeIndexBuildStrategy>,
        metrics: Arc<dyn MetricsSink>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            client,
            fallback,
            metrics,
            tenant_id: tenant_id.into(),
        }
    }

    /// Container path holding the blobs of one index.
    fn container_path(&self, index_uuid: &str) -> String {
        let base = self.repository.base_path().trim_end_matches('/');
        if base.is_empty() {
            format!("{index_uuid}{VECTORS_PATH_SUFFIX}")
        } else {
            format!("{base}/{index_uuid}{VECTORS_PATH_SUFFIX}")
        }
    }

    async fn build_remotely(
        &self,
        params: &mut BuildIndexParams,
        metrics: &mut RemoteIndexBuildMetrics,
    ) -> Result<()> {
        let container = self
            .repository
            .blob_container(&self.container_path(&params.index_uuid));
        let accessor = DefaultVectorRepositoryAccessor::new(container.clone(), params.engine);
        let blob_name = format!(
            "{}_{}_{}",
            Ulid::new(),
            params.field_name,
            params.segment_name
        );

        // WRITE
        let written = accessor
            .write_to_repository(
                &blob_name,
                params.total_live_docs,
                params.data_type,
                params.vectors.clone(),
            )
            .await;
        metrics.end_repository_write(written.is_ok());
        written.inspect_err(|e| warn!(error = %e, blob = %blob_name, "repository write failed"))?;

        // SUBMIT
        let submitted = match self.build_request(container.as_ref(), &blob_name, params) {
            Ok(request) => self.client.submit_vector_build(&request).await,
            Err(e) => Err(e),
        };
        metrics.end_submit(submitted.is_ok());
        let job = submitted.inspect_err(|e| warn!(error = %e, "remote build submission failed"))?;

        // AWAIT
        let status = self
            .client
            .await_vector_build(&RemoteBuildStatusRequest {
                job_id: job.job_id.clone(),
            })
            .await?;
        if !status.is_completed() {
            return Err(ZeppelinError::RemoteBuildFailed {
                job_id: job.job_id,
                message: status.error_message.unwrap_or(status.task_status),
            });
        }
        let file_name = status
            .file_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ZeppelinError::RemoteBuildFailed {
                job_id: job.job_id.clone(),
                message: "completed without an index file name".to_string(),
            })?;
        metrics.end_waiting();

        // READ
        let read = accessor
            .read_from_repository(&file_name, &mut *params.output)
            .await;
        metrics.end_repository_read(read.is_ok());
        read.inspect_err(|e| warn!(error = %e, file_name = %file_name, "repository read failed"))
    }

    fn build_request(
        &self,
        container: &dyn BlobContainer,
        blob_name: &str,
        params: &BuildIndexParams,
    ) -> Result<RemoteBuildRequest> {
        let metadata = self.repository.metadata();
        if metadata.repository_type != S3_REPOSITORY_TYPE {
            return Err(ZeppelinError::Config(format!(
                "repository {} has unsupported type {}; remote builds need {S3_REPOSITORY_TYPE}",
                metadata.name, metadata.repository_type
            )));
        }
        let container_name = metadata.setting(BUCKET_SETTING).ok_or_else(|| {
            ZeppelinError::Config(format!("repository {} has no bucket", metadata.name))
        })?;

        let dimension = params.vectors.get()?.dimension();
        if dimension == 0 {
            return Err(ZeppelinError::Validation(
                "vector dimension must be positive".to_string(),
            ));
        }

        Ok(RemoteBuildRequest {
            repository_type: metadata.repository_type.clone(),
            container_name: container_name.to_string(),
            vector_path: container.blob_path(&format!("{blob_name}{VECTOR_BLOB_FILE_EXTENSION}")),
            doc_id_path: container.blob_path(&format!("{blob_name}{DOC_ID_FILE_EXTENSION}")),
            tenant_id: self.tenant_id.clone(),
            dimension,
            doc_count: params.total_live_docs,
            data_type: params.data_type,
            engine: params.engine,
            index_parameters: params.index_parameters.clone(),
        })
    }
}

#[async_trait]
impl NativeIndexBuildStrategy for RemoteIndexBuildStrategy {
    #[instrument(skip_all, fields(field = %params.field_name, segment = %params.segment_name, operation = params.operation.as_str()))]
    async fn build_and_write_index(&self, params: &mut BuildIndexParams) -> Result<()> {
        let size_bytes = params.vector_blob_length().unwrap_or(0);
        let mut metrics = RemoteIndexBuildMetrics::start(
            self.metrics.clone(),
            params.operation,
            size_bytes,
            &params.field_name,
        );

        match self.build_remotely(params, &mut metrics).await {
            Ok(()) => {
                info!(size_bytes, "remote index build succeeded");
                metrics.end(true);
                Ok(())
            }
            Err(e) => {
                warn!(
                    error = %e,
                    kind = ?e.kind(),
                    "remote index build failed, building locally"
                );
                let result = self.fallback.build_and_write_index(params).await;
                metrics.end(false);
                result
            }
        }
    }
}
