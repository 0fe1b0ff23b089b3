//! Index build strategies.
//!
//! A strategy turns the vectors of one segment field into an index file
//! written to `BuildIndexParams::output`. `RemoteIndexBuildStrategy` offloads
//! the work to the build service and falls back to a local strategy when
//! anything goes wrong; `select_build_strategy` decides up front whether the
//! remote path is worth trying at all.

pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tracing::debug;

use crate::config::RemoteBuildConfig;
use crate::error::Result;
use crate::types::{IndexParameters, KnnEngine, OperationKind, VectorDataType};
use crate::vectors::KnnVectorValuesSupplier;

pub use remote::RemoteIndexBuildStrategy;

/// Everything needed to build the index of one field of one segment.
pub struct BuildIndexParams {
    pub field_name: String,
    pub segment_name: String,
    /// Identifies the index the segment belongs to; scopes the blob path.
    pub index_uuid: String,
    pub engine: KnnEngine,
    pub data_type: VectorDataType,
    pub index_parameters: IndexParameters,
    pub total_live_docs: u64,
    pub operation: OperationKind,
    pub vectors: Arc<dyn KnnVectorValuesSupplier>,
    /// Where the finished index file is written.
    pub output: Box<dyn AsyncWrite + Unpin + Send>,
}

impl BuildIndexParams {
    /// Length of the vector blob these params would upload.
    pub fn vector_blob_length(&self) -> Result<u64> {
        let bytes_per_vector = self.vectors.get()?.bytes_per_vector() as u64;
        Ok(bytes_per_vector * self.total_live_docs)
    }
}

impl std::fmt::Debug for BuildIndexParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildIndexParams")
            .field("field_name", &self.field_name)
            .field("segment_name", &self.segment_name)
            .field("index_uuid", &self.index_uuid)
            .field("engine", &self.engine)
            .field("data_type", &self.data_type)
            .field("total_live_docs", &self.total_live_docs)
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

/// Trait every index build strategy implements.
///
/// Object-safe (via `async_trait`) so the remote strategy can hold its
/// fallback as an `Arc<dyn NativeIndexBuildStrategy>`.
#[async_trait]
pub trait NativeIndexBuildStrategy: Send + Sync {
    /// Build the index for `params` and write it to `params.output`.
    ///
    /// # Errors
    /// Whatever the strategy cannot recover from. The remote strategy only
    /// returns errors raised by its fallback.
    async fn build_and_write_index(&self, params: &mut BuildIndexParams) -> Result<()>;
}

/// Whether a build with a vector blob of `vector_blob_length` bytes should go
/// to the build service.
pub fn should_build_index_remotely(config: &RemoteBuildConfig, vector_blob_length: u64) -> bool {
    config.enabled
        && config
            .repository
            .as_deref()
            .is_some_and(|repository| !repository.is_empty())
        && vector_blob_length >= config.size_threshold_bytes
}

/// Pick the remote strategy when the build qualifies, the local one otherwise.
pub fn select_build_strategy(
    config: &RemoteBuildConfig,
    params: &BuildIndexParams,
    remote: Arc<dyn NativeIndexBuildStrategy>,
    local: Arc<dyn NativeIndexBuildStrategy>,
) -> Result<Arc<dyn NativeIndexBuildStrategy>> {
    let vector_blob_length = params.vector_blob_length()?;
    let use_remote = should_build_index_remotely(config, vector_blob_length);
    debug!(
        field = %params.field_name,
        segment = %params.segment_name,
        vector_blob_length,
        use_remote,
        "selected index build strategy"
    );
    Ok(if use_remote { remote } else { local })
}
