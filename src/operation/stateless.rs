//! Stages that look at one signal at a time.
//!
//! Some keep a counter (limit, skip, every, reindex, scan) but none buffers signals.

use std::rc::Rc;

use crate::error::{StreamError, StreamResult};
use crate::processing::{Filter, Mapper};
use crate::signal::{Directive, Signal};
use crate::types::Value;

use super::{Operation, OperationClass, Shape};

/// Keeps signals accepted by a filter.
#[derive(Debug, Clone)]
pub struct FilterOp {
    filter: Filter,
}

impl FilterOp {
    pub fn new(filter: Filter) -> Self {
        Self { filter }
    }
}

impl Operation for FilterOp {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Stateless
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Filter(&self.filter)
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return Directive::Drop;
        }
        match self.filter.evaluate(&signal.value, &signal.key) {
            Ok(true) => Directive::Forward(signal),
            Ok(false) => Directive::Drop,
            Err(err) => Directive::Fail(err),
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(self.clone()))
    }
}

/// Replaces the value.
#[derive(Debug, Clone)]
pub struct MapOp {
    mapper: Mapper,
}

impl MapOp {
    pub fn new(mapper: Mapper) -> Self {
        Self { mapper }
    }
}

impl Operation for MapOp {
    fn name(&self) -> &'static str {
        "map"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Stateless
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Map(&self.mapper)
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return Directive::Drop;
        }
        match self.mapper.apply(&signal.value, &signal.key) {
            Ok(value) => Directive::Forward(signal.with_value(value)),
            Err(err) => Directive::Fail(err),
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(self.clone()))
    }
}

/// Replaces the key.
#[derive(Debug, Clone)]
pub struct MapKeyOp {
    mapper: Mapper,
}

impl MapKeyOp {
    pub fn new(mapper: Mapper) -> Self {
        Self { mapper }
    }
}

impl Operation for MapKeyOp {
    fn name(&self) -> &'static str {
        "map_key"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Stateless
    }

    fn shape(&self) -> Shape<'_> {
        Shape::MapKey(&self.mapper)
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return Directive::Drop;
        }
        match self.mapper.apply(&signal.value, &signal.key) {
            Ok(key) => Directive::Forward(signal.with_key(key)),
            Err(err) => Directive::Fail(err),
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(self.clone()))
    }
}

/// Swaps key and value.
#[derive(Debug, Clone, Default)]
pub struct Flip;

impl Operation for Flip {
    fn name(&self) -> &'static str {
        "flip"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Stateless
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Flip
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return Directive::Drop;
        }
        Directive::Forward(Signal::new(signal.value, signal.key, signal.position))
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Flip))
    }
}

/// Rewrites keys as the progression `start, start + step, ...`.
#[derive(Debug, Clone)]
pub struct Reindex {
    start: i64,
    step: i64,
    next: i64,
}

impl Reindex {
    pub fn new(start: i64, step: i64) -> Self {
        Self {
            start,
            step,
            next: start,
        }
    }
}

impl Operation for Reindex {
    fn name(&self) -> &'static str {
        "reindex"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Stateless
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Reindex {
            start: self.start,
            step: self.step,
        }
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return Directive::Drop;
        }
        let key = Value::Int64(self.next);
        self.next = self.next.wrapping_add(self.step);
        Directive::Forward(signal.with_key(key))
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Reindex::new(self.start, self.step)))
    }
}

/// Passes the first `limit` signals, then stops the upstream.
#[derive(Debug, Clone)]
pub struct Limit {
    limit: usize,
    seen: usize,
}

impl Limit {
    pub fn new(limit: usize) -> Self {
        Self { limit, seen: 0 }
    }
}

impl Operation for Limit {
    fn name(&self) -> &'static str {
        "limit"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Stateless
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Limit(self.limit)
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal || self.seen >= self.limit {
            return Directive::Drop;
        }
        self.seen += 1;
        if self.seen == self.limit {
            Directive::StopUpstream(vec![signal])
        } else {
            Directive::Forward(signal)
        }
    }

    fn accepts_input(&self) -> bool {
        self.seen < self.limit
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Limit::new(self.limit)))
    }
}

/// Drops the first `count` signals.
#[derive(Debug, Clone)]
pub struct Skip {
    count: usize,
    seen: usize,
}

impl Skip {
    pub fn new(count: usize) -> Self {
        Self { count, seen: 0 }
    }
}

impl Operation for Skip {
    fn name(&self) -> &'static str {
        "skip"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Stateless
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Skip(self.count)
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return Directive::Drop;
        }
        if self.seen < self.count {
            self.seen += 1;
            Directive::Drop
        } else {
            Directive::Forward(signal)
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Skip::new(self.count)))
    }
}

/// Passes every `nth` signal (the nth, 2nth, ...).
#[derive(Debug, Clone)]
pub struct Every {
    nth: usize,
    seen: usize,
}

impl Every {
    pub fn new(nth: usize) -> StreamResult<Self> {
        if nth == 0 {
            return Err(StreamError::invalid("every", "nth must be > 0"));
        }
        Ok(Self { nth, seen: 0 })
    }
}

impl Operation for Every {
    fn name(&self) -> &'static str {
        "every"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Stateless
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return Directive::Drop;
        }
        self.seen += 1;
        if self.seen % self.nth == 0 {
            Directive::Forward(signal)
        } else {
            Directive::Drop
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Every {
            nth: self.nth,
            seen: 0,
        }))
    }
}

/// Passes signals while the filter accepts; the first rejection stops the upstream.
///
/// `take_until(f)` is `take_while(!f)`.
#[derive(Debug, Clone)]
pub struct TakeWhile {
    filter: Filter,
    done: bool,
}

impl TakeWhile {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            done: false,
        }
    }
}

impl Operation for TakeWhile {
    fn name(&self) -> &'static str {
        "take_while"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Stateless
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal || self.done {
            return Directive::Drop;
        }
        match self.filter.evaluate(&signal.value, &signal.key) {
            Ok(true) => Directive::Forward(signal),
            Ok(false) => {
                self.done = true;
                Directive::StopUpstream(Vec::new())
            }
            Err(err) => Directive::Fail(err),
        }
    }

    fn accepts_input(&self) -> bool {
        !self.done
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(TakeWhile::new(self.filter.clone())))
    }
}

type ConsumerFn = Rc<dyn Fn(&Value, &Value) -> StreamResult<()>>;

/// Calls a consumer with `(value, key)` and passes the signal on.
#[derive(Clone)]
pub struct Tap {
    consumer: ConsumerFn,
}

impl Tap {
    pub fn new<F>(consumer: F) -> Self
    where
        F: Fn(&Value, &Value) -> StreamResult<()> + 'static,
    {
        Self {
            consumer: Rc::new(consumer),
        }
    }
}

impl Operation for Tap {
    fn name(&self) -> &'static str {
        "tap"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Stateless
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return Directive::Drop;
        }
        match (self.consumer)(&signal.value, &signal.key) {
            Ok(()) => Directive::Forward(signal),
            Err(err) => Directive::Fail(err),
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(self.clone()))
    }
}

/// Fails with [`StreamError::AssertionFailed`] on signals the filter rejects.
#[derive(Debug, Clone)]
pub struct Assert {
    filter: Filter,
    message: String,
}

impl Assert {
    pub fn new(filter: Filter, message: impl Into<String>) -> Self {
        Self {
            filter,
            message: message.into(),
        }
    }
}

impl Operation for Assert {
    fn name(&self) -> &'static str {
        "assert"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Stateless
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return Directive::Drop;
        }
        match self.filter.evaluate(&signal.value, &signal.key) {
            Ok(true) => Directive::Forward(signal),
            Ok(false) => Directive::Fail(StreamError::AssertionFailed {
                position: signal.position,
                message: format!("{} (key={}, value={})", self.message, signal.key, signal.value),
            }),
            Err(err) => Directive::Fail(err),
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(self.clone()))
    }
}

type ScanFn = Rc<dyn Fn(Value, &Value, &Value) -> StreamResult<Value>>;

/// Running fold: each signal's value becomes `acc = f(acc, value, key)`.
#[derive(Clone)]
pub struct Scan {
    initial: Value,
    acc: Value,
    step: ScanFn,
}

impl Scan {
    pub fn new<F>(initial: Value, step: F) -> Self
    where
        F: Fn(Value, &Value, &Value) -> StreamResult<Value> + 'static,
    {
        Self {
            acc: initial.clone(),
            initial,
            step: Rc::new(step),
        }
    }
}

impl Operation for Scan {
    fn name(&self) -> &'static str {
        "scan"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Stateless
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return Directive::Drop;
        }
        let acc = std::mem::replace(&mut self.acc, Value::Null);
        match (self.step)(acc.clone(), &signal.value, &signal.key) {
            Ok(next) => {
                self.acc = next.clone();
                Directive::Forward(signal.with_value(next))
            }
            Err(err) => {
                self.acc = acc;
                Directive::Fail(err)
            }
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Scan {
            initial: self.initial.clone(),
            acc: self.initial.clone(),
            step: Rc::clone(&self.step),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::{Every, Flip, Limit, Reindex, Scan, TakeWhile};
    use crate::operation::Operation;
    use crate::processing::Filter;
    use crate::signal::{Directive, Signal};
    use crate::types::Value;

    fn sig(key: i64, value: i64) -> Signal {
        Signal::new(Value::Int64(key), Value::Int64(value), key as u64)
    }

    fn forwarded(d: Directive) -> Vec<Signal> {
        match d {
            Directive::Forward(s) => vec![s],
            Directive::ForwardMany(v) | Directive::StopUpstream(v) => v,
            Directive::Drop => vec![],
            Directive::Fail(e) => panic!("unexpected failure: {e}"),
            Directive::Partial(_, errors) => panic!("unexpected failures: {errors:?}"),
        }
    }

    #[test]
    fn limit_stops_on_the_last_admitted_signal() {
        let mut op = Limit::new(2);
        assert!(matches!(op.handle(sig(0, 1)), Directive::Forward(_)));
        assert!(matches!(op.handle(sig(1, 2)), Directive::StopUpstream(ref v) if v.len() == 1));
        assert!(!op.accepts_input());
        assert!(matches!(op.handle(sig(2, 3)), Directive::Drop));
    }

    #[test]
    fn limit_zero_never_accepts() {
        assert!(!Limit::new(0).accepts_input());
    }

    #[test]
    fn reindex_assigns_progression() {
        let mut op = Reindex::new(10, -2);
        let keys: Vec<Value> = (0..3)
            .flat_map(|i| forwarded(op.handle(sig(i, i))))
            .map(|s| s.key)
            .collect();
        assert_eq!(keys, vec![Value::Int64(10), Value::Int64(8), Value::Int64(6)]);
    }

    #[test]
    fn flip_swaps() {
        let out = forwarded(Flip.handle(sig(1, 7)));
        assert_eq!(out[0].key, Value::Int64(7));
        assert_eq!(out[0].value, Value::Int64(1));
    }

    #[test]
    fn every_rejects_zero() {
        assert!(Every::new(0).is_err());
        let mut op = Every::new(3).unwrap();
        let kept: Vec<_> = (1..=7).flat_map(|i| forwarded(op.handle(sig(i, i)))).collect();
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn take_while_stops_at_first_rejection() {
        let mut op = TakeWhile::new(Filter::value(|v| v.as_i64().is_some_and(|x| x < 3)));
        assert_eq!(forwarded(op.handle(sig(0, 1))).len(), 1);
        assert!(matches!(op.handle(sig(1, 5)), Directive::StopUpstream(ref v) if v.is_empty()));
        assert!(forwarded(op.handle(sig(2, 1))).is_empty());
    }

    #[test]
    fn scan_duplicate_restarts_from_initial() {
        let mut op = Scan::new(Value::Int64(0), |acc, v, _| {
            Ok(Value::Int64(acc.as_i64().unwrap_or(0) + v.as_i64().unwrap_or(0)))
        });
        forwarded(op.handle(sig(0, 5)));
        let out = forwarded(op.handle(sig(1, 5)));
        assert_eq!(out[0].value, Value::Int64(10));
        let mut fresh = op.duplicate().unwrap();
        assert_eq!(forwarded(fresh.handle(sig(0, 1)))[0].value, Value::Int64(1));
    }
}
