use std::io::Read;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use zeppelin_remote_build::client::{
    RemoteBuildRequest, RemoteBuildResponse, RemoteBuildStatusRequest, RemoteBuildStatusResponse,
    RemoteIndexClient, COMPLETED_INDEX_BUILD,
};
use zeppelin_remote_build::error::{Result, ZeppelinError};
use zeppelin_remote_build::metrics::{BuildCounter, BuildGauge, BuildTimer, MetricsSink};
use zeppelin_remote_build::storage::{
    BlobContainer, BlobStoreRepository, CompletionListener, ObjectStoreBlobContainer,
    ObjectStoreRepository, RepositoryMetadata, UploadOptions, WriteContext,
};
use zeppelin_remote_build::strategy::{BuildIndexParams, NativeIndexBuildStrategy};
use zeppelin_remote_build::types::OperationKind;

pub const TEST_BUCKET: &str = "test-bucket";
pub const TEST_BASE_PATH: &str = "zeppelin";

/// Small parts so tests exercise multi-part uploads with little data.
pub fn small_parts(part_size: u64) -> UploadOptions {
    UploadOptions {
        part_size,
        max_concurrency: 3,
        parallel_upload: true,
    }
}

/// An S3-typed repository over an in-memory store. Returns the store too so
/// tests can inspect what was written.
pub fn memory_repository(options: UploadOptions) -> (Arc<InMemory>, Arc<ObjectStoreRepository>) {
    let store = Arc::new(InMemory::new());
    let metadata = RepositoryMetadata::new("vectors", "s3").with_setting("bucket", TEST_BUCKET);
    let repository = ObjectStoreRepository::new(
        store.clone() as Arc<dyn ObjectStore>,
        metadata,
        TEST_BASE_PATH,
        options,
    );
    (store, Arc::new(repository))
}

/// Wraps a real container, records the calls it sees and can be told to fail.
pub struct ScriptedContainer {
    inner: ObjectStoreBlobContainer,
    parallel: bool,
    fail_writes: bool,
    parallel_failure: Option<String>,
    upload_delay: Option<Duration>,
    upload_finished: Arc<AtomicBool>,
    events: Mutex<Vec<String>>,
}

impl ScriptedContainer {
    pub fn new(inner: ObjectStoreBlobContainer) -> Self {
        Self {
            inner,
            parallel: true,
            fail_writes: false,
            parallel_failure: None,
            upload_delay: None,
            upload_finished: Arc::new(AtomicBool::new(false)),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Report `message` from the parallel upload's completion listener.
    pub fn failing_parallel_upload(mut self, message: &str) -> Self {
        self.parallel_failure = Some(message.to_string());
        self
    }

    /// Hold the parallel upload for `delay` before it starts.
    pub fn slow_parallel_upload(mut self, delay: Duration) -> Self {
        self.upload_delay = Some(delay);
        self
    }

    /// Whether the parallel upload has called its completion listener.
    pub fn parallel_upload_finished(&self) -> bool {
        self.upload_finished.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl BlobContainer for ScriptedContainer {
    fn path(&self) -> &str {
        self.inner.path()
    }

    async fn write_blob(
        &self,
        name: &str,
        reader: Box<dyn Read + Send>,
        length: u64,
        fail_if_exists: bool,
    ) -> Result<()> {
        self.record(format!("write:{name}"));
        if self.fail_writes {
            return Err(ZeppelinError::Io(std::io::Error::other("simulated write failure")));
        }
        self.inner
            .write_blob(name, reader, length, fail_if_exists)
            .await
    }

    fn supports_parallel_upload(&self) -> bool {
        self.parallel
    }

    fn async_parallel_write(&self, context: WriteContext, on_complete: CompletionListener) {
        self.record(format!("parallel:{}", context.file_name));
        let finished = self.upload_finished.clone();
        let on_complete: CompletionListener = Box::new(move |result| {
            finished.store(true, Ordering::SeqCst);
            on_complete(result);
        });
        match (&self.parallel_failure, self.upload_delay) {
            (Some(message), _) => {
                let message = message.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    on_complete(Err(ZeppelinError::Io(std::io::Error::other(message))));
                });
            }
            (None, Some(delay)) => {
                let inner = self.inner.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.async_parallel_write(context, on_complete);
                });
            }
            (None, None) => self.inner.async_parallel_write(context, on_complete),
        }
    }

    async fn read_blob(&self, name: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
        self.record(format!("read:{name}"));
        self.inner.read_blob(name).await
    }
}

/// Repository handing out one fixed container regardless of path.
pub struct FixedRepository {
    pub metadata: RepositoryMetadata,
    pub container: Arc<dyn BlobContainer>,
}

impl BlobStoreRepository for FixedRepository {
    fn metadata(&self) -> &RepositoryMetadata {
        &self.metadata
    }

    fn base_path(&self) -> &str {
        TEST_BASE_PATH
    }

    fn blob_container(&self, _path: &str) -> Arc<dyn BlobContainer> {
        self.container.clone()
    }
}

/// Build service double. Answers every await with the configured status.
pub struct FakeBuildClient {
    pub job_id: String,
    status: Mutex<std::result::Result<RemoteBuildStatusResponse, String>>,
    fail_submit: bool,
    pub submitted: Mutex<Vec<RemoteBuildRequest>>,
    pub awaited: AtomicUsize,
}

impl FakeBuildClient {
    pub fn completed(file_name: &str) -> Self {
        Self::with_status(RemoteBuildStatusResponse {
            task_status: COMPLETED_INDEX_BUILD.to_string(),
            file_name: Some(file_name.to_string()),
            error_message: None,
        })
    }

    pub fn with_status(status: RemoteBuildStatusResponse) -> Self {
        Self {
            job_id: "job-1".to_string(),
            status: Mutex::new(Ok(status)),
            fail_submit: false,
            submitted: Mutex::new(Vec::new()),
            awaited: AtomicUsize::new(0),
        }
    }

    /// Every await fails as if the poller timed out.
    pub fn timing_out() -> Self {
        let client = Self::completed("unused.faiss");
        *client.status.lock().unwrap() = Err("timeout".to_string());
        client
    }

    pub fn rejecting_submit() -> Self {
        Self {
            fail_submit: true,
            ..Self::completed("unused.faiss")
        }
    }

    pub fn submit_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn await_count(&self) -> usize {
        self.awaited.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteIndexClient for FakeBuildClient {
    async fn submit_vector_build(&self, request: &RemoteBuildRequest) -> Result<RemoteBuildResponse> {
        self.submitted.lock().unwrap().push(request.clone());
        if self.fail_submit {
            return Err(ZeppelinError::RemoteBuild("build request returned 503".to_string()));
        }
        Ok(RemoteBuildResponse {
            job_id: self.job_id.clone(),
        })
    }

    async fn await_vector_build(
        &self,
        request: &RemoteBuildStatusRequest,
    ) -> Result<RemoteBuildStatusResponse> {
        assert_eq!(request.job_id, self.job_id);
        self.awaited.fetch_add(1, Ordering::SeqCst);
        match &*self.status.lock().unwrap() {
            Ok(status) => Ok(status.clone()),
            Err(_) => Err(ZeppelinError::RemoteBuildTimeout {
                job_id: request.job_id.clone(),
                elapsed_ms: 1,
            }),
        }
    }
}

/// Records everything reported to it.
#[derive(Default)]
pub struct RecordingMetrics {
    counters: Mutex<Vec<BuildCounter>>,
    timers: Mutex<Vec<BuildTimer>>,
    gauges: Mutex<Vec<(BuildGauge, OperationKind, i64)>>,
}

impl RecordingMetrics {
    pub fn count(&self, counter: BuildCounter) -> usize {
        self.counters
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == counter)
            .count()
    }

    pub fn timed(&self, timer: BuildTimer) -> usize {
        self.timers
            .lock()
            .unwrap()
            .iter()
            .filter(|t| **t == timer)
            .count()
    }

    /// Sum of every delta applied to `gauge` for `operation`.
    pub fn gauge(&self, gauge: BuildGauge, operation: OperationKind) -> i64 {
        self.gauges
            .lock()
            .unwrap()
            .iter()
            .filter(|(g, op, _)| *g == gauge && *op == operation)
            .map(|(_, _, delta)| delta)
            .sum()
    }

    pub fn gauge_peak(&self, gauge: BuildGauge, operation: OperationKind) -> i64 {
        let mut current = 0;
        let mut peak = 0;
        for (g, op, delta) in self.gauges.lock().unwrap().iter() {
            if *g == gauge && *op == operation {
                current += delta;
                peak = peak.max(current);
            }
        }
        peak
    }
}

impl MetricsSink for RecordingMetrics {
    fn increment(&self, counter: BuildCounter) {
        self.counters.lock().unwrap().push(counter);
    }

    fn record_duration(&self, timer: BuildTimer, _elapsed: Duration) {
        self.timers.lock().unwrap().push(timer);
    }

    fn adjust_gauge(&self, gauge: BuildGauge, operation: OperationKind, delta: i64) {
        self.gauges.lock().unwrap().push((gauge, operation, delta));
    }
}

/// Local build double: writes `LOCAL_INDEX` to the output and remembers
/// which params it was called with.
#[derive(Default)]
pub struct RecordingFallback {
    fail: bool,
    pub calls: Mutex<Vec<(String, String, String, u64)>>,
}

pub const LOCAL_INDEX: &[u8] = b"local-index";

impl RecordingFallback {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl NativeIndexBuildStrategy for RecordingFallback {
    async fn build_and_write_index(&self, params: &mut BuildIndexParams) -> Result<()> {
        self.calls.lock().unwrap().push((
            params.field_name.clone(),
            params.segment_name.clone(),
            params.index_uuid.clone(),
            params.total_live_docs,
        ));
        if self.fail {
            return Err(ZeppelinError::Internal("local build failed".to_string()));
        }
        params.output.write_all(LOCAL_INDEX).await?;
        params.output.flush().await?;
        Ok(())
    }
}

/// In-memory `AsyncWrite` whose contents stay reachable after it is boxed.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
