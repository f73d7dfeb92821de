//! Read-ahead: a trigger signal makes the stage consume the following upstream signals itself.
//!
//! Signals that are not triggers pass through. The trigger is consumed.
//!
//! - [`ReadMode::Next`] forwards the next `n` signals in place of the trigger.
//! - [`ReadMode::Many`] gathers the next `n` values into one `List` keyed by the trigger key.
//! - [`ReadMode::While`] / [`ReadMode::Until`] forward upstream signals while the filter
//!   accepts / until it accepts. The signal ending such a read is handled as a fresh trigger.

use crate::error::{StreamError, StreamResult};
use crate::processing::{Filter, Mapper};
use crate::signal::{Directive, Signal};
use crate::types::Value;

use super::{Operation, OperationClass};

/// How many signals a counted read takes.
#[derive(Debug, Clone)]
pub enum ReadCount {
    Fixed(usize),
    /// Evaluated on the trigger signal; must yield a non-negative integer.
    Dynamic(Mapper),
}

impl ReadCount {
    fn resolve(&self, trigger: &Signal) -> StreamResult<usize> {
        match self {
            ReadCount::Fixed(n) => Ok(*n),
            ReadCount::Dynamic(mapper) => {
                let n = mapper.apply(&trigger.value, &trigger.key)?;
                n.as_i64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| {
                        StreamError::failed(format!(
                            "read count must be a non-negative integer, got '{n}'"
                        ))
                    })
            }
        }
    }
}

impl From<usize> for ReadCount {
    fn from(n: usize) -> Self {
        ReadCount::Fixed(n)
    }
}

impl From<Mapper> for ReadCount {
    fn from(mapper: Mapper) -> Self {
        ReadCount::Dynamic(mapper)
    }
}

#[derive(Debug, Clone)]
pub enum ReadMode {
    Next(ReadCount),
    Many(ReadCount),
    While(Filter),
    Until(Filter),
}

#[derive(Debug, Clone)]
enum ReadState {
    Idle,
    Counting {
        remaining: usize,
        key: Value,
        gathered: Vec<Value>,
    },
    Conditional,
}

#[derive(Debug, Clone)]
pub struct ReadAhead {
    trigger: Option<Filter>,
    mode: ReadMode,
    state: ReadState,
}

impl ReadAhead {
    /// `trigger == None` makes every idle signal a trigger.
    pub fn new(trigger: Option<Filter>, mode: ReadMode) -> Self {
        Self {
            trigger,
            mode,
            state: ReadState::Idle,
        }
    }

    fn is_trigger(&self, signal: &Signal) -> StreamResult<bool> {
        match &self.trigger {
            Some(filter) => filter.evaluate(&signal.value, &signal.key),
            None => Ok(true),
        }
    }

    fn start(&mut self, trigger: Signal) -> Directive {
        match &self.mode {
            ReadMode::Next(count) | ReadMode::Many(count) => {
                let n = match count.resolve(&trigger) {
                    Ok(n) => n,
                    Err(err) => return Directive::Fail(err),
                };
                if n == 0 {
                    return match self.mode {
                        ReadMode::Many(_) => {
                            Directive::Forward(trigger.with_value(Value::List(Vec::new())))
                        }
                        _ => Directive::Drop,
                    };
                }
                self.state = ReadState::Counting {
                    remaining: n,
                    key: trigger.key,
                    gathered: Vec::new(),
                };
            }
            ReadMode::While(_) | ReadMode::Until(_) => self.state = ReadState::Conditional,
        }
        Directive::Drop
    }

    fn idle(&mut self, signal: Signal) -> Directive {
        match self.is_trigger(&signal) {
            Ok(true) => self.start(signal),
            Ok(false) => Directive::Forward(signal),
            Err(err) => Directive::Fail(err),
        }
    }
}

impl Operation for ReadAhead {
    fn name(&self) -> &'static str {
        match self.mode {
            ReadMode::Next(_) => "read_next",
            ReadMode::Many(_) => "read_many",
            ReadMode::While(_) => "read_while",
            ReadMode::Until(_) => "read_until",
        }
    }

    fn class(&self) -> OperationClass {
        OperationClass::Buffering
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            let state = std::mem::replace(&mut self.state, ReadState::Idle);
            return match (state, &self.mode) {
                (ReadState::Counting { key, gathered, .. }, ReadMode::Many(_))
                    if !gathered.is_empty() =>
                {
                    Directive::Forward(Signal::new(key, Value::List(gathered), signal.position))
                }
                _ => Directive::Drop,
            };
        }
        match &mut self.state {
            ReadState::Idle => self.idle(signal),
            ReadState::Counting {
                remaining,
                key,
                gathered,
            } => {
                *remaining -= 1;
                let done = *remaining == 0;
                let out = match self.mode {
                    ReadMode::Many(_) => {
                        gathered.push(signal.value);
                        if !done {
                            return Directive::Drop;
                        }
                        let batch = Value::List(std::mem::take(gathered));
                        Signal::new(key.clone(), batch, signal.position)
                    }
                    _ => signal,
                };
                if done {
                    self.state = ReadState::Idle;
                }
                Directive::Forward(out)
            }
            ReadState::Conditional => {
                let accepted = match &self.mode {
                    ReadMode::While(f) => f.evaluate(&signal.value, &signal.key),
                    ReadMode::Until(f) => f.evaluate(&signal.value, &signal.key).map(|hit| !hit),
                    _ => Ok(false),
                };
                match accepted {
                    Ok(true) => Directive::Forward(signal),
                    Ok(false) => {
                        self.state = ReadState::Idle;
                        self.idle(signal)
                    }
                    Err(err) => Directive::Fail(err),
                }
            }
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(ReadAhead::new(self.trigger.clone(), self.mode.clone())))
    }
}
