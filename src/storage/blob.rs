use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, FuturesUnordered};
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::{MultipartUpload, ObjectStore, PutPayload, WriteMultipart};
use tracing::{debug, instrument, warn};

use crate::error::{Result, ZeppelinError};

use super::{BlobContainer, CompletionListener, StreamContext, WriteContext};

/// How blobs are uploaded to the object store.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Size of every multipart part except the last.
    pub part_size: u64,
    /// Parts read and uploaded at the same time.
    pub max_concurrency: usize,
    /// Advertise parallel multipart upload to callers.
    pub parallel_upload: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            part_size: 16 * 1024 * 1024,
            max_concurrency: 8,
            parallel_upload: true,
        }
    }
}

/// A `BlobContainer` backed by any `object_store` implementation.
#[derive(Clone)]
pub struct ObjectStoreBlobContainer {
    store: Arc<dyn ObjectStore>,
    path: String,
    options: UploadOptions,
}

impl ObjectStoreBlobContainer {
    pub fn new(store: Arc<dyn ObjectStore>, path: impl Into<String>, options: UploadOptions) -> Self {
        Self {
            store,
            path: path.into(),
            options,
        }
    }

    fn location(&self, name: &str) -> Result<Path> {
        Ok(Path::parse(self.blob_path(name))?)
    }

    async fn exists(&self, location: &Path) -> Result<bool> {
        exists(self.store.as_ref(), location).await
    }
}

async fn exists(store: &dyn ObjectStore, location: &Path) -> Result<bool> {
    match store.head(location).await {
        Ok(_) => Ok(true),
        Err(object_store::Error::NotFound { .. }) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Read up to `len` bytes on a blocking thread, handing the reader back.
async fn read_chunk(
    reader: Box<dyn Read + Send>,
    len: u64,
) -> Result<(Box<dyn Read + Send>, Vec<u8>)> {
    tokio::task::spawn_blocking(move || -> Result<_> {
        let mut reader = reader;
        let mut buf = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
        (&mut reader).take(len).read_to_end(&mut buf)?;
        Ok((reader, buf))
    })
    .await
    .map_err(|e| ZeppelinError::Internal(format!("blocking read panicked: {e}")))?
}

/// Read part `index` of a multipart upload into memory.
async fn read_part(context: Arc<StreamContext>, index: usize) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let (offset, size) = context.part_range(index);
        let reader = context.open_part(index)?;
        let mut buf = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        reader.take(size).read_to_end(&mut buf)?;
        if buf.len() as u64 != size {
            return Err(ZeppelinError::Validation(format!(
                "part {index} at offset {offset} yielded {} of {size} bytes",
                buf.len()
            )));
        }
        Ok(buf)
    })
    .await
    .map_err(|e| ZeppelinError::Internal(format!("part reader panicked: {e}")))?
}

/// Read parts with bounded concurrency and hand them to the upload in order.
/// Part numbers follow the order of `put_part` calls, so reads are buffered
/// in order while the uploads themselves complete in any order.
async fn put_parts(
    upload: &mut dyn MultipartUpload,
    context: &Arc<StreamContext>,
    max_concurrency: usize,
) -> Result<()> {
    let concurrency = max_concurrency.max(1);
    let mut parts = stream::iter(0..context.number_of_parts())
        .map(|index| read_part(context.clone(), index))
        .buffered(concurrency);
    let mut in_flight = FuturesUnordered::new();

    while let Some(part) = parts.next().await {
        in_flight.push(upload.put_part(PutPayload::from(part?)));
        while in_flight.len() >= concurrency {
            if let Some(done) = in_flight.next().await {
                done?;
            }
        }
    }
    while let Some(done) = in_flight.next().await {
        done?;
    }
    Ok(())
}

async fn upload_parts(
    store: Arc<dyn ObjectStore>,
    location: Path,
    context: WriteContext,
    options: UploadOptions,
) -> Result<()> {
    if context.fail_if_exists && exists(store.as_ref(), &location).await? {
        return Err(ZeppelinError::BlobAlreadyExists {
            key: location.to_string(),
        });
    }

    let stream_context = (context.stream_context_supplier)(options.part_size)?;
    if stream_context.number_of_parts() == 0 {
        store.put(&location, PutPayload::default()).await?;
        return Ok(());
    }

    let stream_context = Arc::new(stream_context);
    let mut upload = store.put_multipart(&location).await?;
    match put_parts(upload.as_mut(), &stream_context, options.max_concurrency).await {
        Ok(()) => {
            upload.complete().await?;
            debug!(
                location = %location,
                parts = stream_context.number_of_parts(),
                bytes = context.file_size,
                "completed multipart upload"
            );
            Ok(())
        }
        Err(e) => {
            if let Err(abort_err) = upload.abort().await {
                warn!(location = %location, error = %abort_err, "failed to abort multipart upload");
            }
            Err(e)
        }
    }
}

#[async_trait]
impl BlobContainer for ObjectStoreBlobContainer {
    fn path(&self) -> &str {
        &self.path
    }

    #[instrument(skip(self, reader), fields(container = %self.path))]
    async fn write_blob(
        &self,
        name: &str,
        reader: Box<dyn Read + Send>,
        length: u64,
        fail_if_exists: bool,
    ) -> Result<()> {
        let location = self.location(name)?;
        if fail_if_exists && self.exists(&location).await? {
            return Err(ZeppelinError::BlobAlreadyExists {
                key: location.to_string(),
            });
        }

        if length <= self.options.part_size {
            let (_, data) = read_chunk(reader, length).await?;
            if data.len() as u64 != length {
                return Err(ZeppelinError::Validation(format!(
                    "{name}: stream ended after {} of {length} declared bytes",
                    data.len()
                )));
            }
            // existence checked above
            self.store.put(&location, PutPayload::from(data)).await?;
            debug!(location = %location, bytes = length, "wrote blob");
            return Ok(());
        }

        let upload = self.store.put_multipart(&location).await?;
        let mut writer =
            WriteMultipart::new_with_chunk_size(upload, self.options.part_size as usize);
        let mut reader = reader;
        let mut written = 0u64;
        while written < length {
            let want = (length - written).min(self.options.part_size);
            let (next, chunk) = match read_chunk(reader, want).await {
                Ok(read) => read,
                Err(e) => {
                    writer.abort().await.ok();
                    return Err(e);
                }
            };
            reader = next;
            if chunk.is_empty() {
                writer.abort().await.ok();
                return Err(ZeppelinError::Validation(format!(
                    "{name}: stream ended after {written} of {length} declared bytes"
                )));
            }
            written += chunk.len() as u64;
            if let Err(e) = writer.wait_for_capacity(self.options.max_concurrency).await {
                writer.abort().await.ok();
                return Err(e.into());
            }
            writer.write(&chunk);
        }
        writer.finish().await?;
        debug!(location = %location, bytes = length, "wrote blob in parts");
        Ok(())
    }

    fn supports_parallel_upload(&self) -> bool {
        self.options.parallel_upload
    }

    fn async_parallel_write(&self, context: WriteContext, on_complete: CompletionListener) {
        let store = self.store.clone();
        let options = self.options.clone();
        let location = self.location(&context.file_name);
        tokio::spawn(async move {
            let result = match location {
                Ok(location) => upload_parts(store, location, context, options).await,
                Err(e) => Err(e),
            };
            on_complete(result);
        });
    }

    #[instrument(skip(self), fields(container = %self.path))]
    async fn read_blob(&self, name: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
        let location = self.location(name)?;
        let result = self.store.get(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => ZeppelinError::NotFound {
                key: location.to_string(),
            },
            other => other.into(),
        })?;
        debug!(location = %location, size = result.meta.size, "reading blob");
        Ok(result.into_stream().map_err(ZeppelinError::from).boxed())
    }
}
