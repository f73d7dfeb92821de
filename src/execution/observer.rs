use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::ErrorAction;

/// Lifecycle events emitted by the stream driver.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    RunStarted {
        stream_id: u64,
    },
    /// An execution error was routed through the error policy.
    ErrorHandled {
        stream_id: u64,
        action: ErrorAction,
        message: String,
    },
    /// A stage asked the driver to stop pulling.
    UpstreamStopped {
        stream_id: u64,
        position: u64,
    },
    RunFinished {
        stream_id: u64,
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
    RunFailed {
        stream_id: u64,
        message: String,
    },
}

impl StreamEvent {
    pub fn stream_id(&self) -> u64 {
        match self {
            StreamEvent::RunStarted { stream_id }
            | StreamEvent::ErrorHandled { stream_id, .. }
            | StreamEvent::UpstreamStopped { stream_id, .. }
            | StreamEvent::RunFinished { stream_id, .. }
            | StreamEvent::RunFailed { stream_id, .. } => *stream_id,
        }
    }
}

/// Observer hook for stream events.
pub trait StreamObserver: Send + Sync {
    fn on_event(&self, event: &StreamEvent);
}

/// A simple stderr logger for stream events.
#[derive(Default)]
pub struct StdErrObserver;

impl StreamObserver for StdErrObserver {
    fn on_event(&self, event: &StreamEvent) {
        eprintln!("{event:?}");
    }
}

/// Fans events out to several observers, in registration order.
#[derive(Default, Clone)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn StreamObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn StreamObserver>>) -> Self {
        Self { observers }
    }

    pub fn push(&mut self, observer: Arc<dyn StreamObserver>) {
        self.observers.push(observer);
    }
}

impl StreamObserver for CompositeObserver {
    fn on_event(&self, event: &StreamEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

/// Counters for one stream run.
///
/// The driver updates these while the stream runs; callers can snapshot them at any time.
#[derive(Default)]
pub struct ExecutionMetrics {
    elapsed_ns: AtomicU64,
    signals_pulled: AtomicU64,
    signals_accepted: AtomicU64,
    signals_delivered: AtomicU64,
    errors_skipped: AtomicU64,
    upstream_stops: AtomicU64,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    /// An item was taken from the producer.
    pub fn on_pulled(&self) {
        let _ = self.signals_pulled.fetch_add(1, Ordering::SeqCst);
    }

    /// A signal entered the pipe (pulled, pushed by a feeder, or routed by a fork).
    pub fn on_accepted(&self) {
        let _ = self.signals_accepted.fetch_add(1, Ordering::SeqCst);
    }

    /// A signal reached the terminal stage (or the end of a pipe without one).
    pub fn on_delivered(&self) {
        let _ = self.signals_delivered.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_error_skipped(&self) {
        let _ = self.errors_skipped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_upstream_stop(&self) {
        let _ = self.upstream_stops.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        let elapsed = if elapsed_ns > 0 {
            Some(Duration::from_nanos(elapsed_ns))
        } else {
            None
        };

        ExecutionMetricsSnapshot {
            elapsed,
            signals_pulled: self.signals_pulled.load(Ordering::SeqCst),
            signals_accepted: self.signals_accepted.load(Ordering::SeqCst),
            signals_delivered: self.signals_delivered.load(Ordering::SeqCst),
            errors_skipped: self.errors_skipped.load(Ordering::SeqCst),
            upstream_stops: self.upstream_stops.load(Ordering::SeqCst),
        }
    }
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub elapsed: Option<Duration>,
    pub signals_pulled: u64,
    pub signals_accepted: u64,
    pub signals_delivered: u64,
    pub errors_skipped: u64,
    pub upstream_stops: u64,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pulled={}, accepted={}, delivered={}, errors_skipped={}, upstream_stops={}, elapsed={:?}",
            self.signals_pulled,
            self.signals_accepted,
            self.signals_delivered,
            self.errors_skipped,
            self.upstream_stops,
            self.elapsed
        )
    }
}
