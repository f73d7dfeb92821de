//! Terminal stages. Each holds the stream's result, read back through [`Operation::outcome`].

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{StreamError, StreamResult};
use crate::processing::{Collector, Filter, Reducer};
use crate::signal::{Directive, Signal};
use crate::types::Value;

use super::{Operation, OperationClass};

/// Collects values into a `List`.
#[derive(Debug, Clone, Default)]
pub struct CollectValues {
    values: Vec<Value>,
}

impl Operation for CollectValues {
    fn name(&self) -> &'static str {
        "collect"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Terminal
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if !signal.terminal {
            self.values.push(signal.value);
        }
        Directive::Drop
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(CollectValues::default()))
    }

    fn outcome(&self) -> Option<Value> {
        Some(Value::List(self.values.clone()))
    }
}

/// Collects `(key, value)` entries into a `Map`, in signal order.
#[derive(Debug, Clone, Default)]
pub struct CollectPairs {
    entries: Vec<(Value, Value)>,
}

impl Operation for CollectPairs {
    fn name(&self) -> &'static str {
        "collect_pairs"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Terminal
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if !signal.terminal {
            self.entries.push(signal.into_item());
        }
        Directive::Drop
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(CollectPairs::default()))
    }

    fn outcome(&self) -> Option<Value> {
        Some(Value::Map(self.entries.clone()))
    }
}

/// Writes every signal into a caller-owned [`Collector`]; the outcome is the number written.
///
/// Duplicates share the sink.
pub struct CollectInto {
    sink: Rc<RefCell<dyn Collector>>,
    written: usize,
}

impl CollectInto {
    pub fn new(sink: Rc<RefCell<dyn Collector>>) -> Self {
        Self { sink, written: 0 }
    }
}

impl Operation for CollectInto {
    fn name(&self) -> &'static str {
        "collect_into"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Terminal
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return Directive::Drop;
        }
        match self.sink.try_borrow_mut() {
            Ok(mut sink) => {
                sink.accept(&signal.key, &signal.value);
                self.written += 1;
                Directive::Drop
            }
            Err(_) => Directive::Fail(StreamError::failed("collector is borrowed elsewhere")),
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(CollectInto::new(Rc::clone(&self.sink))))
    }

    fn outcome(&self) -> Option<Value> {
        Some(Value::from(self.written))
    }
}

/// Folds signals with a [`Reducer`].
pub struct Reduce {
    name: &'static str,
    reducer: Box<dyn Reducer>,
}

impl Reduce {
    pub fn new(reducer: Box<dyn Reducer>) -> Self {
        Self::named("reduce", reducer)
    }

    pub(crate) fn named(name: &'static str, reducer: Box<dyn Reducer>) -> Self {
        Self { name, reducer }
    }
}

impl Operation for Reduce {
    fn name(&self) -> &'static str {
        self.name
    }

    fn class(&self) -> OperationClass {
        OperationClass::Terminal
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return Directive::Drop;
        }
        match self.reducer.consume(&signal.value, &signal.key) {
            Ok(()) => Directive::Drop,
            Err(err) => Directive::Fail(err),
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Reduce::named(self.name, self.reducer.fresh())))
    }

    fn outcome(&self) -> Option<Value> {
        Some(self.reducer.result())
    }
}

/// First value accepted by a filter (`Null` when none). Stops the upstream once found.
#[derive(Debug, Clone)]
pub struct Find {
    filter: Filter,
    found: Option<Value>,
}

impl Find {
    pub fn new(filter: Filter) -> Self {
        Self { filter, found: None }
    }
}

impl Operation for Find {
    fn name(&self) -> &'static str {
        "find"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Terminal
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal || self.found.is_some() {
            return Directive::Drop;
        }
        match self.filter.evaluate(&signal.value, &signal.key) {
            Ok(true) => {
                self.found = Some(signal.value);
                Directive::StopUpstream(Vec::new())
            }
            Ok(false) => Directive::Drop,
            Err(err) => Directive::Fail(err),
        }
    }

    fn accepts_input(&self) -> bool {
        self.found.is_none()
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Find::new(self.filter.clone())))
    }

    fn outcome(&self) -> Option<Value> {
        Some(self.found.clone().unwrap_or(Value::Null))
    }
}

/// Last value seen (`Null` on empty input).
#[derive(Debug, Clone, Default)]
pub struct Last {
    last: Option<Value>,
}

impl Operation for Last {
    fn name(&self) -> &'static str {
        "last"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Terminal
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if !signal.terminal {
            self.last = Some(signal.value);
        }
        Directive::Drop
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Last::default()))
    }

    fn outcome(&self) -> Option<Value> {
        Some(self.last.clone().unwrap_or(Value::Null))
    }
}

/// Consumes everything for side effects only; the outcome is the number of signals drained.
#[derive(Debug, Clone, Default)]
pub struct Drain {
    seen: usize,
}

impl Operation for Drain {
    fn name(&self) -> &'static str {
        "drain"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Terminal
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if !signal.terminal {
            self.seen += 1;
        }
        Directive::Drop
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Drain::default()))
    }

    fn outcome(&self) -> Option<Value> {
        Some(Value::from(self.seen))
    }
}
