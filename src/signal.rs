//! The unit flowing through a pipe and the directives an operation answers with.

use crate::error::StreamError;
use crate::types::Value;

/// A `(key, value)` pair as produced by a [`crate::Producer`] or pushed by a feeding stream.
pub type Item = (Value, Value);

/// One unit flowing through a [`crate::Pipe`].
///
/// `position` is assigned when the item enters a stream and strictly increases while that
/// stream runs. The terminal signal (`terminal == true`) carries `Null` key and value and marks
/// that no more signals will follow.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub key: Value,
    pub value: Value,
    pub position: u64,
    pub terminal: bool,
}

impl Signal {
    pub fn new(key: Value, value: Value, position: u64) -> Self {
        Self {
            key,
            value,
            position,
            terminal: false,
        }
    }

    /// The end-of-input marker.
    pub fn end(position: u64) -> Self {
        Self {
            key: Value::Null,
            value: Value::Null,
            position,
            terminal: true,
        }
    }

    /// A new signal at the same position with a different value.
    pub fn with_value(&self, value: Value) -> Self {
        Self::new(self.key.clone(), value, self.position)
    }

    /// A new signal at the same position with a different key.
    pub fn with_key(&self, key: Value) -> Self {
        Self::new(key, self.value.clone(), self.position)
    }

    pub fn into_item(self) -> Item {
        (self.key, self.value)
    }
}

/// What an operation wants done after handling one signal.
#[derive(Debug)]
pub enum Directive {
    /// Pass one signal to the next operation.
    Forward(Signal),
    /// Pass several signals, in order, to the next operation.
    ForwardMany(Vec<Signal>),
    /// Emit nothing.
    Drop,
    /// Emit the given signals, then stop pulling from the producer.
    StopUpstream(Vec<Signal>),
    /// Handling failed; the driver consults the error policy.
    Fail(StreamError),
    /// Route each error through the error policy, then emit the signals.
    Partial(Vec<Signal>, Vec<StreamError>),
}

impl Directive {
    /// Turn a fallible single-signal result into a directive.
    pub fn from_result(result: Result<Option<Signal>, StreamError>) -> Self {
        match result {
            Ok(Some(signal)) => Directive::Forward(signal),
            Ok(None) => Directive::Drop,
            Err(err) => Directive::Fail(err),
        }
    }

    /// Emit a batch, collapsing the empty case to [`Directive::Drop`].
    pub fn many(signals: Vec<Signal>) -> Self {
        if signals.is_empty() {
            Directive::Drop
        } else {
            Directive::ForwardMany(signals)
        }
    }
}
