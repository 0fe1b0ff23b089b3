use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZeppelinError {
    // Storage errors
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("blob already exists: {key}")]
    BlobAlreadyExists { key: String },

    #[error("storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("storage path error: {0}")]
    StoragePath(#[from] object_store::path::Error),

    #[error("async upload of {file_name} failed")]
    AsyncUpload {
        file_name: String,
        #[source]
        source: Box<ZeppelinError>,
    },

    // Serialization errors
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Stream contract errors
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("stream is closed")]
    StreamClosed,

    // Remote build errors
    #[error("remote build error: {0}")]
    RemoteBuild(String),

    #[error("remote build job {job_id} did not complete: {message}")]
    RemoteBuildFailed { job_id: String, message: String },

    #[error("remote build job {job_id} timed out after {elapsed_ms} ms")]
    RemoteBuildTimeout { job_id: String, elapsed_ms: u64 },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    // Validation errors
    #[error("validation error: {0}")]
    Validation(String),

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    // IO errors
    #[error("io error: {0}")]
    Io(std::io::Error),

    // Internal
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used to decide how an error is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad settings or inputs. Never retried.
    Configuration,
    /// Blob write/read failures.
    Io,
    /// Submit rejections, failed or timed out jobs.
    RemoteService,
    /// Misuse of a stream (skip, read after close).
    Contract,
    Internal,
}

pub type Result<T> = std::result::Result<T, ZeppelinError>;

impl From<std::io::Error> for ZeppelinError {
    fn from(e: std::io::Error) -> Self {
        // Streams report their own errors through io::Error; unwrap them again.
        if e.get_ref().is_some_and(|inner| inner.is::<ZeppelinError>()) {
            if let Some(inner) = e.into_inner() {
                if let Ok(err) = inner.downcast::<ZeppelinError>() {
                    return *err;
                }
            }
            return ZeppelinError::Internal("lost wrapped stream error".to_string());
        }
        ZeppelinError::Io(e)
    }
}

impl From<ZeppelinError> for std::io::Error {
    fn from(e: ZeppelinError) -> Self {
        match e {
            ZeppelinError::Io(inner) => inner,
            other => std::io::Error::other(other),
        }
    }
}

impl ZeppelinError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ZeppelinError::Config(_) | ZeppelinError::Validation(_) => ErrorKind::Configuration,

            ZeppelinError::NotFound { .. }
            | ZeppelinError::BlobAlreadyExists { .. }
            | ZeppelinError::Storage(_)
            | ZeppelinError::StoragePath(_)
            | ZeppelinError::AsyncUpload { .. }
            | ZeppelinError::Io(_) => ErrorKind::Io,

            ZeppelinError::RemoteBuild(_)
            | ZeppelinError::RemoteBuildFailed { .. }
            | ZeppelinError::RemoteBuildTimeout { .. }
            | ZeppelinError::Http(_) => ErrorKind::RemoteService,

            ZeppelinError::UnsupportedOperation(_) | ZeppelinError::StreamClosed => {
                ErrorKind::Contract
            }

            ZeppelinError::Json(_) | ZeppelinError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the failure is transient: I/O and remote-service errors are,
    /// configuration and contract errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Io | ErrorKind::RemoteService)
    }
}
