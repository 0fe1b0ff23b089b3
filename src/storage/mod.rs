//! Blob storage seen by the build pipeline.
//!
//! `BlobContainer` is one directory of blobs; `BlobStoreRepository` is the
//! configured repository that hands out containers and describes itself to
//! the remote build service. The object_store backed implementations live in
//! `blob` and `repository`.

pub mod blob;
pub mod repository;

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::{Result, ZeppelinError};

pub use blob::{ObjectStoreBlobContainer, UploadOptions};
pub use repository::ObjectStoreRepository;

/// Opens the byte stream for one part: `(part_index, part_size, part_offset)`.
pub type PartStreamSupplier =
    Arc<dyn Fn(usize, u64, u64) -> Result<Box<dyn Read + Send>> + Send + Sync>;

/// Maps the part size chosen by the backend to the part layout of a blob.
pub type StreamContextSupplier = Box<dyn FnOnce(u64) -> Result<StreamContext> + Send>;

/// Called once when an asynchronous upload finishes, successfully or not.
pub type CompletionListener = Box<dyn FnOnce(Result<()>) + Send>;

/// Part layout of one blob for a multipart upload.
pub struct StreamContext {
    part_supplier: PartStreamSupplier,
    part_size: u64,
    last_part_size: u64,
    number_of_parts: usize,
}

impl StreamContext {
    /// Split `total_size` bytes into parts of `part_size`; the last part holds
    /// the remainder. An empty blob has no parts.
    pub fn new(part_supplier: PartStreamSupplier, part_size: u64, total_size: u64) -> Result<Self> {
        if part_size == 0 {
            return Err(ZeppelinError::Validation(
                "part size must be positive".to_string(),
            ));
        }
        let number_of_parts = total_size.div_ceil(part_size);
        let last_part_size = match total_size % part_size {
            0 if total_size == 0 => 0,
            0 => part_size,
            rem => rem,
        };
        Ok(Self {
            part_supplier,
            part_size,
            last_part_size,
            number_of_parts: usize::try_from(number_of_parts).map_err(|_| {
                ZeppelinError::Validation(format!("{number_of_parts} parts is too many"))
            })?,
        })
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    pub fn last_part_size(&self) -> u64 {
        self.last_part_size
    }

    pub fn number_of_parts(&self) -> usize {
        self.number_of_parts
    }

    /// `(offset, size)` of part `index`.
    pub fn part_range(&self, index: usize) -> (u64, u64) {
        let offset = index as u64 * self.part_size;
        let size = if index + 1 == self.number_of_parts {
            self.last_part_size
        } else {
            self.part_size
        };
        (offset, size)
    }

    /// Open a fresh stream positioned at part `index`.
    pub fn open_part(&self, index: usize) -> Result<Box<dyn Read + Send>> {
        if index >= self.number_of_parts {
            return Err(ZeppelinError::Validation(format!(
                "part {index} out of range, blob has {} parts",
                self.number_of_parts
            )));
        }
        let (offset, size) = self.part_range(index);
        (self.part_supplier)(index, size, offset)
    }
}

/// Everything a backend needs to upload one blob in parallel parts.
pub struct WriteContext {
    pub file_name: String,
    /// Declared up front; the backend never learns the length from the data.
    pub file_size: u64,
    pub fail_if_exists: bool,
    pub stream_context_supplier: StreamContextSupplier,
}

/// A directory of blobs.
#[async_trait]
pub trait BlobContainer: Send + Sync {
    /// Path of this container inside the repository's storage.
    fn path(&self) -> &str;

    /// Full storage path of blob `name`.
    fn blob_path(&self, name: &str) -> String {
        let path = self.path().trim_end_matches('/');
        if path.is_empty() {
            name.to_string()
        } else {
            format!("{path}/{name}")
        }
    }

    /// Write `length` bytes read sequentially from `reader`.
    async fn write_blob(
        &self,
        name: &str,
        reader: Box<dyn Read + Send>,
        length: u64,
        fail_if_exists: bool,
    ) -> Result<()>;

    fn supports_parallel_upload(&self) -> bool {
        false
    }

    /// Start uploading a blob in parts and return immediately. The backend
    /// chooses the part size, asks `context` for the part layout and calls
    /// `on_complete` from its own task once every part is durable or the
    /// upload failed.
    fn async_parallel_write(&self, context: WriteContext, on_complete: CompletionListener) {
        on_complete(Err(ZeppelinError::UnsupportedOperation(format!(
            "container {} does not support parallel upload of {}",
            self.path(),
            context.file_name
        ))));
    }

    /// Read blob `name` as a stream of chunks.
    async fn read_blob(&self, name: &str) -> Result<BoxStream<'static, Result<Bytes>>>;
}

/// Describes a registered repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryMetadata {
    pub name: String,
    /// Backend type, e.g. `s3`.
    pub repository_type: String,
    pub settings: HashMap<String, String>,
}

impl RepositoryMetadata {
    pub fn new(name: impl Into<String>, repository_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository_type: repository_type.into(),
            settings: HashMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

/// A repository the pipeline writes vectors to and reads indexes from.
pub trait BlobStoreRepository: Send + Sync {
    fn metadata(&self) -> &RepositoryMetadata;

    /// Root path of the repository inside its storage.
    fn base_path(&self) -> &str;

    /// Container rooted at `path` (relative to the storage root).
    fn blob_container(&self, path: &str) -> Arc<dyn BlobContainer>;
}
