//! Pipeline stages.
//!
//! Every stage implements [`Operation::handle`], answering each [`Signal`] with a [`Directive`].
//! Buffering stages answer `Drop` while they collect and emit on the terminal signal (or when a
//! capacity threshold is reached). The [`crate::Pipe`] forwards the terminal signal to the next
//! stage itself, after the stage's flush.
//!
//! Stages come in three classes ([`OperationClass`]):
//!
//! - [`stateless`]: filter, map, flip, reindex, limit, skip, ...
//! - [`ordering`] and [`grouping`] (buffering): reverse, shuffle, sort, top-k, tail, window,
//!   chunk, segregate, gather, ...; [`read_ahead`] consumes upstream signals on a trigger
//! - [`terminal`]: collect, reduce, find, last; a terminal freezes the pipe

pub mod grouping;
pub mod ordering;
pub mod read_ahead;
pub mod stateless;
pub mod terminal;

use crate::error::StreamResult;
use crate::processing::{Comparator, Filter, Mapper};
use crate::signal::{Directive, Signal};
use crate::stream::Stream;
use crate::types::Value;

/// Taxonomy of stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    /// Pure function of one signal to zero or one signal.
    Stateless,
    /// Holds buffered state and emits on a trigger.
    Buffering,
    /// Consumes everything and holds the stream's result.
    Terminal,
}

/// The parameters of a stage as seen by the fusion optimizer.
///
/// Stages the optimizer has no rule for report [`Shape::Opaque`].
#[derive(Debug)]
pub enum Shape<'a> {
    Opaque,
    Filter(&'a Filter),
    Map(&'a Mapper),
    MapKey(&'a Mapper),
    Flip,
    Reindex {
        start: i64,
        step: i64,
    },
    Limit(usize),
    Skip(usize),
    Tail(usize),
    Reverse,
    Shuffle,
    Sort {
        comparator: &'a Comparator,
        reverse_ties: bool,
        reverse_output: bool,
    },
    SortLimited {
        limit: usize,
        comparator: &'a Comparator,
        reverse_ties: bool,
        reverse_output: bool,
    },
}

/// One pipeline stage.
pub trait Operation {
    /// Short stable name, used in errors and by [`crate::Stream::describe`].
    fn name(&self) -> &'static str;

    fn class(&self) -> OperationClass;

    fn shape(&self) -> Shape<'_> {
        Shape::Opaque
    }

    /// Handle one signal. On the terminal signal, return the flush (if any); never forward the
    /// terminal signal itself.
    fn handle(&mut self, signal: Signal) -> Directive;

    /// `false` once the stage will never emit anything for further input.
    fn accepts_input(&self) -> bool {
        true
    }

    /// A copy with the same configuration and no buffered state.
    fn duplicate(&self) -> StreamResult<Box<dyn Operation>>;

    /// The result held by a terminal stage.
    fn outcome(&self) -> Option<Value> {
        None
    }

    /// Streams this stage pushes signals into (feed, fork, dispatch).
    fn targets(&self) -> Vec<Stream> {
        Vec::new()
    }
}

/// Emission payload shared by grouping stages: a `Map` of entries when keys are preserved, a
/// `List` of values otherwise.
pub(crate) fn bundle(signals: &[Signal], preserve_keys: bool) -> Value {
    if preserve_keys {
        Value::Map(
            signals
                .iter()
                .map(|s| (s.key.clone(), s.value.clone()))
                .collect(),
        )
    } else {
        Value::List(signals.iter().map(|s| s.value.clone()).collect())
    }
}
