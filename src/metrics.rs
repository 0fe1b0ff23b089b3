//! Remote build metrics.
//!
//! The pipeline reports through a `MetricsSink` it is handed, so callers
//! decide where numbers go: a Prometheus registry in production, a recording
//! fake in tests, or nowhere.

use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use tracing::debug;

use crate::types::OperationKind;

/// Success/failure events counted per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildCounter {
    WriteSuccess,
    WriteFailure,
    SubmitSuccess,
    SubmitFailure,
    ReadSuccess,
    ReadFailure,
    BuildSuccess,
    BuildFailure,
}

impl BuildCounter {
    fn labels(&self) -> (&'static str, &'static str) {
        match self {
            BuildCounter::WriteSuccess => ("write", "success"),
            BuildCounter::WriteFailure => ("write", "failure"),
            BuildCounter::SubmitSuccess => ("submit", "success"),
            BuildCounter::SubmitFailure => ("submit", "failure"),
            BuildCounter::ReadSuccess => ("read", "success"),
            BuildCounter::ReadFailure => ("read", "failure"),
            BuildCounter::BuildSuccess => ("build", "success"),
            BuildCounter::BuildFailure => ("build", "failure"),
        }
    }
}

/// Timed phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildTimer {
    RepositoryWrite,
    Waiting,
    RepositoryRead,
    /// Whole run, labelled by what triggered it.
    Build(OperationKind),
}

impl BuildTimer {
    fn label(&self) -> &'static str {
        match self {
            BuildTimer::RepositoryWrite => "write",
            BuildTimer::Waiting => "waiting",
            BuildTimer::RepositoryRead => "read",
            BuildTimer::Build(OperationKind::Flush) => "flush_build",
            BuildTimer::Build(OperationKind::Merge) => "merge_build",
        }
    }
}

/// In-flight gauges, labelled by operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildGauge {
    CurrentOperations,
    CurrentSizeBytes,
}

pub trait MetricsSink: Send + Sync {
    fn increment(&self, counter: BuildCounter);
    fn record_duration(&self, timer: BuildTimer, elapsed: Duration);
    fn adjust_gauge(&self, gauge: BuildGauge, operation: OperationKind, delta: i64);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn increment(&self, _counter: BuildCounter) {}
    fn record_duration(&self, _timer: BuildTimer, _elapsed: Duration) {}
    fn adjust_gauge(&self, _gauge: BuildGauge, _operation: OperationKind, _delta: i64) {}
}

/// Prometheus collectors registered on a caller-owned registry.
#[derive(Clone)]
pub struct PrometheusMetricsSink {
    events: IntCounterVec,
    durations: HistogramVec,
    current_operations: IntGaugeVec,
    current_size: IntGaugeVec,
}

impl PrometheusMetricsSink {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let events = IntCounterVec::new(
            Opts::new(
                "zeppelin_remote_build_events_total",
                "Remote build phase outcomes",
            ),
            &["phase", "status"],
        )?;
        let durations = HistogramVec::new(
            HistogramOpts::new(
                "zeppelin_remote_build_duration_seconds",
                "Remote build phase duration",
            )
            .buckets(vec![
                0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0,
            ]),
            &["phase"],
        )?;
        let current_operations = IntGaugeVec::new(
            Opts::new(
                "zeppelin_remote_build_current_operations",
                "Remote builds in flight",
            ),
            &["operation"],
        )?;
        let current_size = IntGaugeVec::new(
            Opts::new(
                "zeppelin_remote_build_current_size_bytes",
                "Vector bytes of remote builds in flight",
            ),
            &["operation"],
        )?;

        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(durations.clone()))?;
        registry.register(Box::new(current_operations.clone()))?;
        registry.register(Box::new(current_size.clone()))?;

        Ok(Self {
            events,
            durations,
            current_operations,
            current_size,
        })
    }
}

impl MetricsSink for PrometheusMetricsSink {
    fn increment(&self, counter: BuildCounter) {
        let (phase, status) = counter.labels();
        self.events.with_label_values(&[phase, status]).inc();
    }

    fn record_duration(&self, timer: BuildTimer, elapsed: Duration) {
        self.durations
            .with_label_values(&[timer.label()])
            .observe(elapsed.as_secs_f64());
    }

    fn adjust_gauge(&self, gauge: BuildGauge, operation: OperationKind, delta: i64) {
        let vec = match gauge {
            BuildGauge::CurrentOperations => &self.current_operations,
            BuildGauge::CurrentSizeBytes => &self.current_size,
        };
        vec.with_label_values(&[operation.as_str()]).add(delta);
    }
}

/// Stopwatch and bookkeeping for one remote build run.
///
/// `start` bumps the in-flight gauges; `end` must be called exactly once to
/// release them.
pub struct RemoteIndexBuildMetrics {
    sink: Arc<dyn MetricsSink>,
    operation: OperationKind,
    size_bytes: i64,
    field_name: String,
    started: Instant,
    phase_started: Instant,
}

impl RemoteIndexBuildMetrics {
    pub fn start(
        sink: Arc<dyn MetricsSink>,
        operation: OperationKind,
        size_bytes: u64,
        field_name: &str,
    ) -> Self {
        let size_bytes = i64::try_from(size_bytes).unwrap_or(i64::MAX);
        sink.adjust_gauge(BuildGauge::CurrentOperations, operation, 1);
        sink.adjust_gauge(BuildGauge::CurrentSizeBytes, operation, size_bytes);
        let now = Instant::now();
        Self {
            sink,
            operation,
            size_bytes,
            field_name: field_name.to_string(),
            started: now,
            phase_started: now,
        }
    }

    fn lap(&mut self) -> Duration {
        let elapsed = self.phase_started.elapsed();
        self.phase_started = Instant::now();
        elapsed
    }

    pub fn end_repository_write(&mut self, success: bool) {
        let elapsed = self.lap();
        if success {
            self.sink.increment(BuildCounter::WriteSuccess);
            self.sink.record_duration(BuildTimer::RepositoryWrite, elapsed);
            debug!(field = %self.field_name, elapsed_ms = elapsed.as_millis() as u64, "repository write done");
        } else {
            self.sink.increment(BuildCounter::WriteFailure);
        }
    }

    pub fn end_submit(&mut self, success: bool) {
        self.lap();
        self.sink.increment(if success {
            BuildCounter::SubmitSuccess
        } else {
            BuildCounter::SubmitFailure
        });
    }

    /// Waiting only records its duration, and only when the job completed.
    pub fn end_waiting(&mut self) {
        let elapsed = self.lap();
        self.sink.record_duration(BuildTimer::Waiting, elapsed);
        debug!(field = %self.field_name, elapsed_ms = elapsed.as_millis() as u64, "remote build finished");
    }

    pub fn end_repository_read(&mut self, success: bool) {
        let elapsed = self.lap();
        if success {
            self.sink.increment(BuildCounter::ReadSuccess);
            self.sink.record_duration(BuildTimer::RepositoryRead, elapsed);
        } else {
            self.sink.increment(BuildCounter::ReadFailure);
        }
    }

    pub fn end(self, success: bool) {
        let elapsed = self.started.elapsed();
        self.sink
            .record_duration(BuildTimer::Build(self.operation), elapsed);
        self.sink.increment(if success {
            BuildCounter::BuildSuccess
        } else {
            BuildCounter::BuildFailure
        });
        self.sink
            .adjust_gauge(BuildGauge::CurrentOperations, self.operation, -1);
        self.sink
            .adjust_gauge(BuildGauge::CurrentSizeBytes, self.operation, -self.size_bytes);
    }
}
