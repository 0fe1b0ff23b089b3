//! Moves vectors into the repository and built indexes back out.

use std::io::Read;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::{debug, instrument};

use crate::error::{Result, ZeppelinError};
use crate::storage::{BlobContainer, PartStreamSupplier, StreamContext, WriteContext};
use crate::stream::{DocIdStream, VectorValuesStream, DOC_ID_BYTES};
use crate::types::{KnnEngine, VectorDataType};
use crate::vectors::KnnVectorValuesSupplier;

pub const VECTOR_BLOB_FILE_EXTENSION: &str = ".vec";
pub const DOC_ID_FILE_EXTENSION: &str = ".did";

#[async_trait]
pub trait VectorRepositoryAccessor: Send + Sync {
    /// Write `{blob_name}.vec` and `{blob_name}.did` for the vectors of
    /// `supplier`. Returns once both blobs are durable.
    async fn write_to_repository(
        &self,
        blob_name: &str,
        total_live_docs: u64,
        data_type: VectorDataType,
        supplier: Arc<dyn KnnVectorValuesSupplier>,
    ) -> Result<()>;

    /// Copy the built index `file_name` into `output`.
    async fn read_from_repository(
        &self,
        file_name: &str,
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<()>;
}

/// Accessor over one blob container.
pub struct DefaultVectorRepositoryAccessor {
    container: Arc<dyn BlobContainer>,
    engine: KnnEngine,
}

impl DefaultVectorRepositoryAccessor {
    pub fn new(container: Arc<dyn BlobContainer>, engine: KnnEngine) -> Self {
        Self { container, engine }
    }

    /// Start the parallel upload of the vector blob. The returned receiver
    /// fires once the upload finished; its outcome is in the returned cell.
    fn start_parallel_vector_upload(
        &self,
        vector_blob: String,
        vector_blob_length: u64,
        data_type: VectorDataType,
        supplier: Arc<dyn KnnVectorValuesSupplier>,
    ) -> (oneshot::Receiver<()>, Arc<Mutex<Option<ZeppelinError>>>) {
        let (done_tx, done_rx) = oneshot::channel();
        let failure: Arc<Mutex<Option<ZeppelinError>>> = Arc::new(Mutex::new(None));

        let context = WriteContext {
            file_name: vector_blob,
            file_size: vector_blob_length,
            fail_if_exists: true,
            stream_context_supplier: Box::new(move |part_size| {
                let part_supplier: PartStreamSupplier = Arc::new(
                    move |_part_index: usize, size: u64, offset: u64| -> Result<Box<dyn Read + Send>> {
                        let stream = VectorValuesStream::open_range(
                            supplier.as_ref(),
                            data_type,
                            offset,
                            size,
                        )?;
                        Ok(Box::new(stream))
                    },
                );
                StreamContext::new(part_supplier, part_size, vector_blob_length)
            }),
        };

        let holder = failure.clone();
        self.container.async_parallel_write(
            context,
            Box::new(move |result| {
                if let Err(e) = result {
                    if let Ok(mut slot) = holder.lock() {
                        *slot = Some(e);
                    }
                }
                let _ = done_tx.send(());
            }),
        );

        (done_rx, failure)
    }
}

#[async_trait]
impl VectorRepositoryAccessor for DefaultVectorRepositoryAccessor {
    #[instrument(skip(self, supplier), fields(container = %self.container.path()))]
    async fn write_to_repository(
        &self,
        blob_name: &str,
        total_live_docs: u64,
        data_type: VectorDataType,
        supplier: Arc<dyn KnnVectorValuesSupplier>,
    ) -> Result<()> {
        let bytes_per_vector = supplier.get()?.bytes_per_vector() as u64;
        let vector_blob_length = bytes_per_vector * total_live_docs;
        let vector_blob = format!("{blob_name}{VECTOR_BLOB_FILE_EXTENSION}");
        let doc_id_blob = format!("{blob_name}{DOC_ID_FILE_EXTENSION}");

        let pending = if self.container.supports_parallel_upload() {
            Some(self.start_parallel_vector_upload(
                vector_blob.clone(),
                vector_blob_length,
                data_type,
                supplier.clone(),
            ))
        } else {
            let stream = VectorValuesStream::open(supplier.as_ref(), data_type)?;
            self.container
                .write_blob(&vector_blob, Box::new(stream), vector_blob_length, true)
                .await?;
            None
        };

        // Doc ids are small; they go sequentially while the vector parts upload.
        let written = match DocIdStream::open(supplier.as_ref()) {
            Ok(doc_ids) => {
                self.container
                    .write_blob(
                        &doc_id_blob,
                        Box::new(doc_ids),
                        DOC_ID_BYTES as u64 * total_live_docs,
                        true,
                    )
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            // The vector upload still reads from the supplier; let it settle
            // before the caller moves on.
            if let Some((done, _)) = pending {
                debug!(error = %e, vector_blob = %vector_blob, "doc id write failed, waiting for vector upload");
                let _ = done.await;
            }
            return Err(e);
        }

        if let Some((done, failure)) = pending {
            let signalled = done.await;
            let captured = failure
                .lock()
                .map_err(|_| ZeppelinError::Internal("upload failure cell poisoned".to_string()))?
                .take();
            if let Some(cause) = captured {
                return Err(ZeppelinError::AsyncUpload {
                    file_name: vector_blob,
                    source: Box::new(cause),
                });
            }
            if signalled.is_err() {
                return Err(ZeppelinError::Internal(format!(
                    "upload of {vector_blob} ended without reporting completion"
                )));
            }
        }

        debug!(
            vector_blob = %vector_blob,
            doc_id_blob = %doc_id_blob,
            vector_bytes = vector_blob_length,
            "wrote vectors to repository"
        );
        Ok(())
    }

    #[instrument(skip(self, output), fields(container = %self.container.path()))]
    async fn read_from_repository(
        &self,
        file_name: &str,
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<()> {
        if file_name.is_empty() || !file_name.ends_with(self.engine.extension()) {
            return Err(ZeppelinError::Validation(format!(
                "index file {file_name:?} does not have the {} extension {}",
                self.engine,
                self.engine.extension()
            )));
        }

        let mut chunks = self.container.read_blob(file_name).await?;
        let mut copied = 0u64;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            output.write_all(&chunk).await?;
            copied += chunk.len() as u64;
        }
        output.flush().await?;

        debug!(file_name, bytes = copied, "read index from repository");
        Ok(())
    }
}
