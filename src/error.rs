use thiserror::Error;

/// Convenience result type used across the crate.
pub type StreamResult<T> = Result<T, StreamError>;

/// Broad classification of a [`StreamError`].
///
/// The class decides how the execution driver treats the error:
///
/// - [`ErrorClass::Construction`] errors are returned from the builder call that caused them.
/// - [`ErrorClass::Execution`] errors are routed through the active
///   [`crate::execution::ErrorPolicy`].
/// - [`ErrorClass::Structural`] errors are always fatal, whatever the policy says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Construction,
    Execution,
    Structural,
}

/// Error type returned by stream construction and execution.
///
/// This is a single error enum shared by the builder, the driver, the fork/feed layer and the
/// ingestion producers.
#[derive(Debug, Error)]
pub enum StreamError {
    /// An operation was configured with an unusable parameter (e.g. a zero window size).
    #[error("invalid argument for '{operation}': {message}")]
    InvalidArgument {
        operation: &'static str,
        message: String,
    },

    /// An operation was appended after a terminal operation froze the pipe.
    #[error("cannot append '{operation}': pipe already ends with a terminal operation")]
    PipeFrozen { operation: &'static str },

    /// A structural change was attempted after the stream started executing.
    #[error("cannot apply '{operation}': stream execution has already started")]
    AlreadyStarted { operation: &'static str },

    /// `run` was called on a stream that already finished.
    #[error("stream {stream_id} has already been executed")]
    AlreadyExecuted { stream_id: u64 },

    /// `run` was called on a stream that is currently being driven.
    #[error("stream {stream_id} is already running")]
    AlreadyRunning { stream_id: u64 },

    /// A feed/fork graph would make a stream its own ancestor.
    #[error("loop detected: {message}")]
    Loop { message: String },

    /// A signal was pushed into a stream that has already finished.
    #[error("cannot feed stream {stream_id}: it has already terminated")]
    FeedAfterTermination { stream_id: u64 },

    /// A pipe could not be duplicated as a fork prototype.
    #[error("operation '{operation}' cannot be cloned into a fork child")]
    NotClonable { operation: &'static str },

    /// A user supplied function (predicate, mapper, reducer, ...) failed.
    #[error("operation failed: {message}")]
    Failed { message: String },

    /// An `assert` operation rejected a signal.
    #[error("assertion failed at position {position}: {message}")]
    AssertionFailed { position: u64, message: String },

    /// The result of a stream that previously failed was requested.
    #[error("stream {stream_id} failed earlier: {message}")]
    PreviousFailure { stream_id: u64, message: String },

    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The input does not conform to the provided schema (missing required fields/columns, etc.).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A value could not be parsed into the required [`crate::types::DataType`].
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },
}

impl StreamError {
    /// Shorthand for a [`StreamError::Failed`] raised from user code.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub(crate) fn invalid(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation,
            message: message.into(),
        }
    }

    /// Classify this error (see [`ErrorClass`]).
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidArgument { .. }
            | Self::PipeFrozen { .. }
            | Self::AlreadyStarted { .. } => ErrorClass::Construction,
            Self::AlreadyExecuted { .. }
            | Self::AlreadyRunning { .. }
            | Self::Loop { .. }
            | Self::FeedAfterTermination { .. }
            | Self::NotClonable { .. }
            | Self::PreviousFailure { .. } => ErrorClass::Structural,
            Self::Failed { .. }
            | Self::AssertionFailed { .. }
            | Self::Io(_)
            | Self::Csv(_)
            | Self::Json(_)
            | Self::SchemaMismatch { .. }
            | Self::ParseError { .. } => ErrorClass::Execution,
        }
    }

    /// Whether the error policy is allowed to recover from this error.
    pub fn is_recoverable(&self) -> bool {
        self.class() == ErrorClass::Execution
    }
}
