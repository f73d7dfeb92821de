use std::fmt;

use crate::error::{StreamError, StreamResult};
use crate::types::Value;

use super::{RunState, Stream};

/// Lazy handle to the result of a terminal stage.
///
/// [`Outcome::get`] runs the stream the first time it is needed. Later calls, and calls after
/// the stream was driven some other way (`run`, a feeder, a fork), return the stored result.
#[derive(Clone)]
pub struct Outcome {
    stream: Stream,
}

impl Outcome {
    pub(crate) fn new(stream: Stream) -> Self {
        Self { stream }
    }

    /// The stream's result, running it first if it has not finished.
    ///
    /// A stream that failed reports [`StreamError::PreviousFailure`] on later calls.
    pub fn get(&self) -> StreamResult<Value> {
        if self.stream.shared.driving.get() {
            return Err(StreamError::AlreadyRunning {
                stream_id: self.stream.id(),
            });
        }
        let state = self.stream.core()?.state;
        if state != RunState::Done {
            self.stream.finish()?;
        }
        self.stream.result()
    }

    pub fn is_ready(&self) -> bool {
        self.stream.is_done()
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn into_stream(self) -> Stream {
        self.stream
    }
}

impl AsRef<Stream> for Outcome {
    fn as_ref(&self) -> &Stream {
        &self.stream
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outcome")
            .field("stream", &self.stream.id())
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::processing::reduce;
    use crate::stream::Stream;
    use crate::types::Value;

    #[test]
    fn get_runs_once_and_caches() {
        let out = Stream::from_values(vec![1, 2, 3]).reduce(reduce::sum()).unwrap();
        assert!(!out.is_ready());
        assert_eq!(out.get().unwrap(), Value::Int64(6));
        assert!(out.is_ready());
        assert_eq!(out.get().unwrap(), Value::Int64(6));
    }
}
