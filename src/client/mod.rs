//! Client side of the remote build service.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{IndexParameters, KnnEngine, VectorDataType};

pub use http::HttpRemoteIndexClient;

/// Task status reported once the build finished and the index was uploaded.
pub const COMPLETED_INDEX_BUILD: &str = "COMPLETED_INDEX_BUILD";
pub const FAILED_INDEX_BUILD: &str = "FAILED_INDEX_BUILD";
pub const RUNNING_INDEX_BUILD: &str = "RUNNING_INDEX_BUILD";

/// Body of a build submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteBuildRequest {
    pub repository_type: String,
    pub container_name: String,
    pub vector_path: String,
    pub doc_id_path: String,
    pub tenant_id: String,
    pub dimension: usize,
    pub doc_count: u64,
    pub data_type: VectorDataType,
    pub engine: KnnEngine,
    pub index_parameters: IndexParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBuildResponse {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBuildStatusRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBuildStatusResponse {
    pub task_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RemoteBuildStatusResponse {
    pub fn is_terminal(&self) -> bool {
        self.task_status == COMPLETED_INDEX_BUILD || self.task_status == FAILED_INDEX_BUILD
    }

    pub fn is_completed(&self) -> bool {
        self.task_status == COMPLETED_INDEX_BUILD
    }
}

/// Submits builds and waits for them.
#[async_trait]
pub trait RemoteIndexClient: Send + Sync {
    /// Submit a build job and return its id.
    async fn submit_vector_build(&self, request: &RemoteBuildRequest) -> Result<RemoteBuildResponse>;

    /// Wait until the job reaches a terminal state and return that state.
    /// Implementations enforce their own timeout and report it as an error.
    async fn await_vector_build(
        &self,
        request: &RemoteBuildStatusRequest,
    ) -> Result<RemoteBuildStatusResponse>;
}
