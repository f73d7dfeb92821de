//! The stream façade: one producer, one pipe, a fluent builder and the execution driver.
//!
//! A [`Stream`] is a cheap handle (`Rc`) to shared state. Builder calls consume the handle and
//! hand it back, so a caller that needs the stream later (as a feed target, or to read its
//! result) keeps a clone.
//!
//! ```rust
//! use rust_data_stream::processing::Filter;
//! use rust_data_stream::{Stream, Value};
//!
//! # fn main() -> Result<(), rust_data_stream::StreamError> {
//! let out = Stream::from_values(vec![5, 2, 7, 9, 2, 3])
//!     .filter(Filter::value(|v| v.as_i64().is_some_and(|x| x > 2)))?
//!     .sort(Default::default())?
//!     .to_list()?;
//! assert_eq!(out, vec![Value::Int64(3), Value::Int64(5), Value::Int64(7), Value::Int64(9)]);
//! # Ok(())
//! # }
//! ```

mod driver;
mod outcome;

use std::cell::{Cell, RefCell, RefMut};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{StreamError, StreamResult};
use crate::execution::{
    ErrorPolicy, ExecutionMetrics, Instrumentation, StreamObserver, StreamOptions,
};
use crate::operation::grouping::{Accumulate, Chunk, ChunkBy, Gather, Segregate, Window};
use crate::operation::ordering::{Reverse, Shuffle, Sort, SortLimited, Tail};
use crate::operation::read_ahead::{ReadAhead, ReadCount, ReadMode};
use crate::operation::stateless::{
    Assert, Every, FilterOp, Flip, Limit, MapKeyOp, MapOp, Reindex, Scan, Skip, TakeWhile, Tap,
};
use crate::operation::terminal::{
    CollectInto, CollectPairs, CollectValues, Drain, Find, Last, Reduce,
};
use crate::operation::Operation;
use crate::pipe::Pipe;
use crate::processing::{reduce, Collector, Comparator, Filter, Mapper, Reducer};
use crate::producer::Producer;
use crate::signal::Item;
use crate::types::Value;

pub use outcome::Outcome;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Done,
}

pub(crate) struct StreamCore {
    pub(crate) producer: Producer,
    pub(crate) pipe: Pipe,
    pub(crate) state: RunState,
    pub(crate) failure: Option<String>,
    pub(crate) next_position: u64,
    pub(crate) started_at: Option<Instant>,
    pub(crate) on_success: Vec<Box<dyn FnOnce()>>,
    pub(crate) on_finish: Vec<Box<dyn FnOnce()>>,
}

impl StreamCore {
    pub(crate) fn take_position(&mut self) -> u64 {
        let position = self.next_position;
        self.next_position += 1;
        position
    }
}

pub(crate) struct StreamShared {
    pub(crate) id: u64,
    pub(crate) core: RefCell<StreamCore>,
    /// Items pushed into this stream while it is being driven (self-feeding).
    pub(crate) inbox: RefCell<VecDeque<Item>>,
    pub(crate) driving: Cell<bool>,
    pub(crate) feeders: Cell<usize>,
}

/// A lazily evaluated pipeline over a producer.
#[derive(Clone)]
pub struct Stream {
    pub(crate) shared: Rc<StreamShared>,
}

impl Stream {
    /// A stream over `producer` with default options.
    pub fn new(producer: Producer) -> Self {
        Self::with_options(producer, StreamOptions::default())
    }

    pub fn with_options(producer: Producer, options: StreamOptions) -> Self {
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        let instr = Instrumentation::new(id, options.observer);
        let pipe = Pipe::new(options.optimize, options.error_policy, instr);
        Self::from_parts(id, producer, pipe)
    }

    fn from_parts(id: u64, producer: Producer, pipe: Pipe) -> Self {
        let core = StreamCore {
            producer,
            pipe,
            state: RunState::NotStarted,
            failure: None,
            next_position: 0,
            started_at: None,
            on_success: Vec::new(),
            on_finish: Vec::new(),
        };
        Self {
            shared: Rc::new(StreamShared {
                id,
                core: RefCell::new(core),
                inbox: RefCell::new(VecDeque::new()),
                driving: Cell::new(false),
                feeders: Cell::new(0),
            }),
        }
    }

    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        I::IntoIter: 'static,
        V: Into<Value>,
    {
        Self::new(Producer::from_values(values))
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        I::IntoIter: 'static,
        K: Into<Value>,
        V: Into<Value>,
    {
        Self::new(Producer::from_pairs(pairs))
    }

    /// A stream without a producer; it only receives what feeders and forks push into it.
    pub fn empty() -> Self {
        Self::new(Producer::empty())
    }

    pub fn generate<F>(f: F) -> Self
    where
        F: FnMut(u64) -> Value + 'static,
    {
        Self::new(Producer::generate(f))
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn state(&self) -> StreamResult<RunState> {
        Ok(self.core()?.state)
    }

    pub fn is_done(&self) -> bool {
        self.shared
            .core
            .try_borrow()
            .is_ok_and(|core| core.state == RunState::Done)
    }

    /// `true` once a run of this stream ended in an error.
    pub fn has_failed(&self) -> bool {
        self.shared
            .core
            .try_borrow()
            .is_ok_and(|core| core.failure.is_some())
    }

    /// Stage names after fusion, head first.
    pub fn describe(&self) -> StreamResult<Vec<&'static str>> {
        Ok(self.core()?.pipe.describe())
    }

    pub fn metrics(&self) -> StreamResult<Arc<ExecutionMetrics>> {
        Ok(Arc::clone(self.core()?.pipe.metrics()))
    }

    pub(crate) fn same(&self, other: &Stream) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn core(&self) -> StreamResult<std::cell::Ref<'_, StreamCore>> {
        self.shared
            .core
            .try_borrow()
            .map_err(|_| StreamError::AlreadyRunning { stream_id: self.id() })
    }

    pub(crate) fn core_mut(&self) -> StreamResult<RefMut<'_, StreamCore>> {
        self.shared
            .core
            .try_borrow_mut()
            .map_err(|_| StreamError::AlreadyRunning { stream_id: self.id() })
    }

    /// Append a stage (after fusion).
    pub fn then(self, op: impl Operation + 'static) -> StreamResult<Self> {
        self.append_boxed(Box::new(op))
    }

    pub(crate) fn append_boxed(self, op: Box<dyn Operation>) -> StreamResult<Self> {
        self.core_mut()?.pipe.append(op)?;
        Ok(self)
    }

    fn terminate(self, op: Box<dyn Operation>) -> StreamResult<Outcome> {
        Ok(Outcome::new(self.append_boxed(op)?))
    }

    /// A fresh stream with a copy of this pipe, no producer and no buffered state. A pipe
    /// without a terminal collects its values into a `List`.
    pub(crate) fn instantiate(&self) -> StreamResult<Stream> {
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        let core = self.core()?;
        let observer = core.pipe.instrumentation().observer.clone();
        let pipe = core.pipe.duplicate(Instrumentation::new(id, observer))?;
        drop(core);
        let child = Self::from_parts(id, Producer::empty(), pipe);
        if !child.core()?.pipe.is_terminal() {
            child.core_mut()?.pipe.append(Box::new(CollectValues::default()))?;
        }
        Ok(child)
    }

    // ---- stateless ----

    pub fn filter(self, filter: Filter) -> StreamResult<Self> {
        self.then(FilterOp::new(filter))
    }

    /// Drops signals accepted by `filter`.
    pub fn omit(self, filter: Filter) -> StreamResult<Self> {
        self.then(FilterOp::new(filter.negate()))
    }

    pub fn map(self, mapper: Mapper) -> StreamResult<Self> {
        self.then(MapOp::new(mapper))
    }

    pub fn map_key(self, mapper: Mapper) -> StreamResult<Self> {
        self.then(MapKeyOp::new(mapper))
    }

    pub fn flip(self) -> StreamResult<Self> {
        self.then(Flip)
    }

    pub fn reindex(self, start: i64, step: i64) -> StreamResult<Self> {
        self.then(Reindex::new(start, step))
    }

    pub fn limit(self, n: usize) -> StreamResult<Self> {
        self.then(Limit::new(n))
    }

    pub fn skip(self, n: usize) -> StreamResult<Self> {
        self.then(Skip::new(n))
    }

    pub fn every(self, nth: usize) -> StreamResult<Self> {
        self.then(Every::new(nth)?)
    }

    pub fn take_while(self, filter: Filter) -> StreamResult<Self> {
        self.then(TakeWhile::new(filter))
    }

    pub fn take_until(self, filter: Filter) -> StreamResult<Self> {
        self.then(TakeWhile::new(filter.negate()))
    }

    pub fn tap<F>(self, consumer: F) -> StreamResult<Self>
    where
        F: Fn(&Value, &Value) -> StreamResult<()> + 'static,
    {
        self.then(Tap::new(consumer))
    }

    pub fn assert(self, filter: Filter, message: impl Into<String>) -> StreamResult<Self> {
        self.then(Assert::new(filter, message))
    }

    pub fn scan<F>(self, initial: impl Into<Value>, step: F) -> StreamResult<Self>
    where
        F: Fn(Value, &Value, &Value) -> StreamResult<Value> + 'static,
    {
        self.then(Scan::new(initial.into(), step))
    }

    // ---- ordering ----

    pub fn reverse(self) -> StreamResult<Self> {
        self.then(Reverse::default())
    }

    pub fn shuffle(self) -> StreamResult<Self> {
        self.then(Shuffle::default())
    }

    pub fn shuffle_seeded(self, seed: u64) -> StreamResult<Self> {
        self.then(Shuffle::seeded(seed))
    }

    pub fn sort(self, comparator: Comparator) -> StreamResult<Self> {
        self.then(Sort::new(comparator))
    }

    /// The `n` first signals of `sort(comparator)`, without sorting the whole input.
    pub fn sort_limited(self, n: usize, comparator: Comparator) -> StreamResult<Self> {
        self.then(SortLimited::new(n, comparator))
    }

    /// The `n` largest values, largest first.
    pub fn best(self, n: usize) -> StreamResult<Self> {
        self.sort_limited(n, Comparator::by_value().reversed())
    }

    /// The `n` smallest values, smallest first.
    pub fn worst(self, n: usize) -> StreamResult<Self> {
        self.sort_limited(n, Comparator::by_value())
    }

    pub fn tail(self, n: usize) -> StreamResult<Self> {
        self.then(Tail::new(n))
    }

    // ---- grouping ----

    pub fn window(self, size: usize, step: usize, preserve_keys: bool) -> StreamResult<Self> {
        self.then(Window::new(size, step, preserve_keys)?)
    }

    pub fn chunk(self, size: usize, preserve_keys: bool) -> StreamResult<Self> {
        self.then(Chunk::new(size, preserve_keys)?)
    }

    pub fn accumulate(self, filter: Filter, preserve_keys: bool) -> StreamResult<Self> {
        self.then(Accumulate::new(filter, preserve_keys))
    }

    pub fn chunk_by(self, discriminator: Mapper, preserve_keys: bool) -> StreamResult<Self> {
        self.then(ChunkBy::new(discriminator, preserve_keys))
    }

    /// Groups equal values into at most `buckets` buckets (unbounded when `None`).
    pub fn segregate(self, buckets: Option<usize>) -> StreamResult<Self> {
        self.segregate_by(buckets, Comparator::by_value())
    }

    pub fn segregate_by(
        self,
        buckets: Option<usize>,
        comparator: Comparator,
    ) -> StreamResult<Self> {
        self.then(Segregate::new(buckets, comparator)?)
    }

    pub fn gather(self, preserve_keys: bool) -> StreamResult<Self> {
        self.then(Gather::new(preserve_keys))
    }

    // ---- read-ahead ----

    pub fn read_next(
        self,
        trigger: Option<Filter>,
        count: impl Into<ReadCount>,
    ) -> StreamResult<Self> {
        self.then(ReadAhead::new(trigger, ReadMode::Next(count.into())))
    }

    pub fn read_many(
        self,
        trigger: Option<Filter>,
        count: impl Into<ReadCount>,
    ) -> StreamResult<Self> {
        self.then(ReadAhead::new(trigger, ReadMode::Many(count.into())))
    }

    pub fn read_while(self, trigger: Option<Filter>, filter: Filter) -> StreamResult<Self> {
        self.then(ReadAhead::new(trigger, ReadMode::While(filter)))
    }

    pub fn read_until(self, trigger: Option<Filter>, filter: Filter) -> StreamResult<Self> {
        self.then(ReadAhead::new(trigger, ReadMode::Until(filter)))
    }

    // ---- lifecycle ----

    pub fn on_error(self, policy: ErrorPolicy) -> StreamResult<Self> {
        self.core_mut()?.pipe.set_policy(policy)?;
        Ok(self)
    }

    pub fn observe(self, observer: Arc<dyn StreamObserver>) -> StreamResult<Self> {
        self.core_mut()?.pipe.set_observer(observer)?;
        Ok(self)
    }

    /// Called once the stream completes without error.
    pub fn on_success<F>(self, handler: F) -> StreamResult<Self>
    where
        F: FnOnce() + 'static,
    {
        self.core_mut()?.on_success.push(Box::new(handler));
        Ok(self)
    }

    /// Called once the stream completes, successfully or not.
    pub fn on_finish<F>(self, handler: F) -> StreamResult<Self>
    where
        F: FnOnce() + 'static,
    {
        self.core_mut()?.on_finish.push(Box::new(handler));
        Ok(self)
    }

    // ---- terminals ----

    /// Collects values into a `List`.
    pub fn collect(self) -> StreamResult<Outcome> {
        self.terminate(Box::new(CollectValues::default()))
    }

    /// Collects `(key, value)` entries into a `Map`.
    pub fn collect_pairs(self) -> StreamResult<Outcome> {
        self.terminate(Box::new(CollectPairs::default()))
    }

    /// Writes every signal into `sink`; the outcome is the number of signals written.
    pub fn collect_into<C>(self, sink: Rc<RefCell<C>>) -> StreamResult<Outcome>
    where
        C: Collector + 'static,
    {
        self.terminate(Box::new(CollectInto::new(sink)))
    }

    pub fn reduce(self, reducer: impl Reducer + 'static) -> StreamResult<Outcome> {
        self.terminate(Box::new(Reduce::new(Box::new(reducer))))
    }

    pub fn count(self) -> StreamResult<Outcome> {
        self.terminate(Box::new(Reduce::named("count", Box::new(reduce::count()))))
    }

    /// First value accepted by `filter`, `Null` when none.
    pub fn find(self, filter: Filter) -> StreamResult<Outcome> {
        self.terminate(Box::new(Find::new(filter)))
    }

    pub fn first(self) -> StreamResult<Outcome> {
        self.find(Filter::always())
    }

    pub fn last(self) -> StreamResult<Outcome> {
        self.terminate(Box::new(Last::default()))
    }

    /// Runs for side effects only; the outcome is the number of signals consumed.
    pub fn drain(self) -> StreamResult<Outcome> {
        self.terminate(Box::new(Drain::default()))
    }

    /// Runs the stream and returns its values.
    pub fn to_list(self) -> StreamResult<Vec<Value>> {
        match self.collect()?.get()? {
            Value::List(values) => Ok(values),
            other => Ok(vec![other]),
        }
    }

    /// Runs the stream and returns its `(key, value)` entries.
    pub fn to_pairs(self) -> StreamResult<Vec<(Value, Value)>> {
        match self.collect_pairs()?.get()? {
            Value::Map(entries) => Ok(entries),
            other => Ok(vec![(Value::Null, other)]),
        }
    }

    /// The result held by the terminal stage (`Null` without one).
    pub(crate) fn result(&self) -> StreamResult<Value> {
        let core = self.core()?;
        if let Some(message) = &core.failure {
            return Err(StreamError::PreviousFailure {
                stream_id: self.id(),
                message: message.clone(),
            });
        }
        Ok(core.pipe.outcome().unwrap_or(Value::Null))
    }
}

impl From<Outcome> for Stream {
    fn from(outcome: Outcome) -> Self {
        outcome.into_stream()
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Stream");
        s.field("id", &self.id());
        if let Ok(core) = self.shared.core.try_borrow() {
            s.field("state", &core.state).field("stages", &core.pipe.describe());
        }
        s.finish()
    }
}
