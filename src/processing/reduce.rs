//! Reductions used by [`crate::Stream::reduce`] and fork children.

use std::fmt;
use std::rc::Rc;

use crate::error::{StreamError, StreamResult};
use crate::types::Value;

/// Built-in numeric reduction operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    /// Count all signals (including nulls).
    Count,
    /// Sum numeric values, ignoring nulls.
    Sum,
    /// Minimum numeric value, ignoring nulls.
    Min,
    /// Maximum numeric value, ignoring nulls.
    Max,
    /// Arithmetic mean of numeric values, ignoring nulls.
    Average,
}

/// Folds the signals reaching a terminal into one [`Value`].
pub trait Reducer {
    /// Absorb one signal.
    fn consume(&mut self, value: &Value, key: &Value) -> StreamResult<()>;

    /// The reduction of everything consumed so far.
    fn result(&self) -> Value;

    /// A new reducer of the same configuration with no consumed state.
    fn fresh(&self) -> Box<dyn Reducer>;
}

/// Reducer for the built-in [`ReduceOp`]s.
///
/// - `Count` always returns `Int64(n)`.
/// - `Sum`/`Min`/`Max` keep `Int64` while every input is an integer and switch to `Float64`
///   once a float is seen. They return `Null` if there were no non-null values.
/// - `Average` returns `Float64`, or `Null` without numeric input.
/// - Non-numeric, non-null values are an error.
#[derive(Debug, Clone)]
pub struct NumericReducer {
    op: ReduceOp,
    acc: Option<Value>,
    count: u64,
}

impl NumericReducer {
    pub fn new(op: ReduceOp) -> Self {
        Self {
            op,
            acc: None,
            count: 0,
        }
    }

    pub fn op(&self) -> ReduceOp {
        self.op
    }
}

fn combine(op: ReduceOp, acc: &Value, v: &Value) -> StreamResult<Value> {
    match (acc, v) {
        (Value::Int64(a), Value::Int64(b)) => match op {
            ReduceOp::Sum | ReduceOp::Average => a
                .checked_add(*b)
                .map(Value::Int64)
                .ok_or_else(|| StreamError::failed(format!("integer overflow adding {a} and {b}"))),
            ReduceOp::Min => Ok(Value::Int64((*a).min(*b))),
            ReduceOp::Max => Ok(Value::Int64((*a).max(*b))),
            ReduceOp::Count => unreachable!("count does not combine values"),
        },
        _ => {
            let a = acc.as_f64().unwrap_or(f64::NAN);
            let b = v.as_f64().unwrap_or(f64::NAN);
            Ok(Value::Float64(match op {
                ReduceOp::Sum | ReduceOp::Average => a + b,
                ReduceOp::Min => a.min(b),
                ReduceOp::Max => a.max(b),
                ReduceOp::Count => unreachable!("count does not combine values"),
            }))
        }
    }
}

impl Reducer for NumericReducer {
    fn consume(&mut self, value: &Value, _key: &Value) -> StreamResult<()> {
        if self.op == ReduceOp::Count {
            self.count += 1;
            return Ok(());
        }
        match value {
            Value::Null => Ok(()),
            Value::Int64(_) | Value::Float64(_) => {
                self.count += 1;
                self.acc = Some(match &self.acc {
                    Some(acc) => combine(self.op, acc, value)?,
                    None => value.clone(),
                });
                Ok(())
            }
            other => Err(StreamError::failed(format!(
                "{:?} expects numeric values, got '{other}'",
                self.op
            ))),
        }
    }

    fn result(&self) -> Value {
        match self.op {
            ReduceOp::Count => Value::from(self.count as usize),
            ReduceOp::Average => match (&self.acc, self.count) {
                (Some(sum), n) if n > 0 => {
                    Value::Float64(sum.as_f64().unwrap_or(f64::NAN) / n as f64)
                }
                _ => Value::Null,
            },
            _ => self.acc.clone().unwrap_or(Value::Null),
        }
    }

    fn fresh(&self) -> Box<dyn Reducer> {
        Box::new(NumericReducer::new(self.op))
    }
}

/// Joins the string form of every value with a separator.
#[derive(Debug, Clone)]
pub struct Concat {
    separator: String,
    out: Option<String>,
}

impl Reducer for Concat {
    fn consume(&mut self, value: &Value, _key: &Value) -> StreamResult<()> {
        match self.out.as_mut() {
            Some(s) => {
                s.push_str(&self.separator);
                s.push_str(&value.to_string());
            }
            None => self.out = Some(value.to_string()),
        }
        Ok(())
    }

    fn result(&self) -> Value {
        Value::Utf8(self.out.clone().unwrap_or_default())
    }

    fn fresh(&self) -> Box<dyn Reducer> {
        Box::new(Concat {
            separator: self.separator.clone(),
            out: None,
        })
    }
}

type FoldFn = Rc<dyn Fn(Value, &Value, &Value) -> StreamResult<Value>>;

/// User supplied fold: `acc = f(acc, value, key)`.
#[derive(Clone)]
pub struct Fold {
    init: Value,
    acc: Value,
    f: FoldFn,
}

impl fmt::Debug for Fold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fold").field("init", &self.init).field("acc", &self.acc).finish()
    }
}

impl Reducer for Fold {
    fn consume(&mut self, value: &Value, key: &Value) -> StreamResult<()> {
        let acc = std::mem::replace(&mut self.acc, Value::Null);
        self.acc = (self.f)(acc, value, key)?;
        Ok(())
    }

    fn result(&self) -> Value {
        self.acc.clone()
    }

    fn fresh(&self) -> Box<dyn Reducer> {
        Box::new(Fold {
            init: self.init.clone(),
            acc: self.init.clone(),
            f: Rc::clone(&self.f),
        })
    }
}

pub fn count() -> NumericReducer {
    NumericReducer::new(ReduceOp::Count)
}

pub fn sum() -> NumericReducer {
    NumericReducer::new(ReduceOp::Sum)
}

pub fn min() -> NumericReducer {
    NumericReducer::new(ReduceOp::Min)
}

pub fn max() -> NumericReducer {
    NumericReducer::new(ReduceOp::Max)
}

pub fn average() -> NumericReducer {
    NumericReducer::new(ReduceOp::Average)
}

pub fn concat(separator: impl Into<String>) -> Concat {
    Concat {
        separator: separator.into(),
        out: None,
    }
}

/// Fold with an infallible step function.
pub fn fold<F>(init: impl Into<Value>, f: F) -> Fold
where
    F: Fn(Value, &Value, &Value) -> Value + 'static,
{
    try_fold(init, move |acc, v, k| Ok(f(acc, v, k)))
}

pub fn try_fold<F>(init: impl Into<Value>, f: F) -> Fold
where
    F: Fn(Value, &Value, &Value) -> StreamResult<Value> + 'static,
{
    let init = init.into();
    Fold {
        acc: init.clone(),
        init,
        f: Rc::new(f),
    }
}
