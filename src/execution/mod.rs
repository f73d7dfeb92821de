//! Execution configuration: error policy, stream options and run instrumentation.
//!
//! This module sits beside the driver in [`crate::stream`] and provides:
//!
//! - [`ErrorPolicy`]: what to do when a stage or the producer fails
//! - [`StreamOptions`]: per-stream configuration (policy, fusion, observer)
//! - Real-time metrics + observer hooks for monitoring

mod observer;

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::error::StreamError;

pub use observer::{
    CompositeObserver, ExecutionMetrics, ExecutionMetricsSnapshot, StdErrObserver, StreamEvent,
    StreamObserver,
};

/// What the driver does with one execution error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Fail the stream; `run` returns the error.
    Abort,
    /// Drop the offending signal and keep going. Buffered state is kept.
    Skip,
    /// End the stream gracefully: stop pulling, flush buffers, finish successfully.
    Stop,
}

type DecideFn = Rc<dyn Fn(&StreamError) -> ErrorAction>;

/// Error policy consulted for [`crate::ErrorClass::Execution`] errors.
///
/// Construction and structural errors never reach the policy.
#[derive(Clone, Default)]
pub enum ErrorPolicy {
    #[default]
    Abort,
    Skip,
    Custom(DecideFn),
}

impl ErrorPolicy {
    pub fn custom<F>(decide: F) -> Self
    where
        F: Fn(&StreamError) -> ErrorAction + 'static,
    {
        ErrorPolicy::Custom(Rc::new(decide))
    }

    /// The action for `err`; unrecoverable errors always abort.
    pub fn decide(&self, err: &StreamError) -> ErrorAction {
        if !err.is_recoverable() {
            return ErrorAction::Abort;
        }
        match self {
            ErrorPolicy::Abort => ErrorAction::Abort,
            ErrorPolicy::Skip => ErrorAction::Skip,
            ErrorPolicy::Custom(decide) => decide(err),
        }
    }
}

impl fmt::Debug for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Abort => write!(f, "Abort"),
            ErrorPolicy::Skip => write!(f, "Skip"),
            ErrorPolicy::Custom(_) => write!(f, "Custom(fn)"),
        }
    }
}

/// Configuration for a [`crate::Stream`].
#[derive(Clone)]
pub struct StreamOptions {
    pub error_policy: ErrorPolicy,
    /// Apply the fusion optimizer when appending stages. Disabling it never changes results.
    pub optimize: bool,
    pub observer: Option<Arc<dyn StreamObserver>>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::default(),
            optimize: true,
            observer: None,
        }
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("error_policy", &self.error_policy)
            .field("optimize", &self.optimize)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Metrics and observer of one stream, shared by its driver and pipe.
#[derive(Clone)]
pub(crate) struct Instrumentation {
    pub stream_id: u64,
    pub metrics: Arc<ExecutionMetrics>,
    pub observer: Option<Arc<dyn StreamObserver>>,
}

impl Instrumentation {
    pub fn new(stream_id: u64, observer: Option<Arc<dyn StreamObserver>>) -> Self {
        Self {
            stream_id,
            metrics: Arc::new(ExecutionMetrics::new()),
            observer,
        }
    }

    pub fn emit(&self, event: StreamEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(&event);
        }
    }

    /// Apply `policy` to `err`, recording the decision.
    pub fn handle_error(&self, policy: &ErrorPolicy, err: &StreamError) -> ErrorAction {
        let action = policy.decide(err);
        debug!(stream_id = self.stream_id, ?action, error = %err, "error policy applied");
        if action == ErrorAction::Skip {
            self.metrics.on_error_skipped();
        }
        self.emit(StreamEvent::ErrorHandled {
            stream_id: self.stream_id,
            action,
            message: err.to_string(),
        });
        action
    }
}
