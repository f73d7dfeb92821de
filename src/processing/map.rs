//! Value transformations with an explicit argument role.
//!
//! The role of a mapper (value only, value and key, nothing) is decided once at construction;
//! it is never inspected per call.

use std::fmt;
use std::rc::Rc;

use crate::error::StreamResult;
use crate::processing::filter::Filter;
use crate::types::Value;

/// A function producing a new [`Value`] from a signal.
#[derive(Clone)]
pub enum Mapper {
    /// Receives the value.
    Value(Rc<dyn Fn(&Value) -> StreamResult<Value>>),
    /// Receives `(value, key)`.
    Pair(Rc<dyn Fn(&Value, &Value) -> StreamResult<Value>>),
    /// Receives nothing (generators, counters).
    Nullary(Rc<dyn Fn() -> StreamResult<Value>>),
    /// Returns the signal's value.
    UseValue,
    /// Returns the signal's key.
    UseKey,
    /// Returns a fixed value.
    Constant(Value),
}

impl Mapper {
    pub fn value<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Value + 'static,
    {
        Mapper::Value(Rc::new(move |v| Ok(f(v))))
    }

    pub fn try_value<F>(f: F) -> Self
    where
        F: Fn(&Value) -> StreamResult<Value> + 'static,
    {
        Mapper::Value(Rc::new(f))
    }

    pub fn pair<F>(f: F) -> Self
    where
        F: Fn(&Value, &Value) -> Value + 'static,
    {
        Mapper::Pair(Rc::new(move |v, k| Ok(f(v, k))))
    }

    pub fn try_pair<F>(f: F) -> Self
    where
        F: Fn(&Value, &Value) -> StreamResult<Value> + 'static,
    {
        Mapper::Pair(Rc::new(f))
    }

    pub fn generate<F>(f: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        Mapper::Nullary(Rc::new(move || Ok(f())))
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Mapper::Constant(value.into())
    }

    /// Apply the mapper to a `(value, key)` pair.
    pub fn apply(&self, value: &Value, key: &Value) -> StreamResult<Value> {
        match self {
            Mapper::Value(f) => f(value),
            Mapper::Pair(f) => f(value, key),
            Mapper::Nullary(f) => f(),
            Mapper::UseValue => Ok(value.clone()),
            Mapper::UseKey => Ok(key.clone()),
            Mapper::Constant(v) => Ok(v.clone()),
        }
    }

    pub fn is_use_value(&self) -> bool {
        matches!(self, Mapper::UseValue)
    }

    pub fn is_use_key(&self) -> bool {
        matches!(self, Mapper::UseKey)
    }
}

/// A filter used as a discriminator yields `Bool` bucket keys.
impl From<Filter> for Mapper {
    fn from(filter: Filter) -> Self {
        Mapper::Pair(Rc::new(move |v, k| filter.evaluate(v, k).map(Value::Bool)))
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mapper::Value(_) => write!(f, "Value(fn)"),
            Mapper::Pair(_) => write!(f, "Pair(fn)"),
            Mapper::Nullary(_) => write!(f, "Nullary(fn)"),
            Mapper::UseValue => write!(f, "UseValue"),
            Mapper::UseKey => write!(f, "UseKey"),
            Mapper::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
        }
    }
}
