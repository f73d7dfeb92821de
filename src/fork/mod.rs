//! Fork / feed multiplexer: routing one stream's signals into other streams.
//!
//! - [`Stream::fork`]: one child per discriminator bucket, instantiated lazily from a prototype
//! - [`Stream::fork_match`]: caller-provided children per bucket; unknown buckets are dropped
//! - [`Stream::dispatch`]: like `fork_match`, but signals also continue downstream unchanged
//! - [`Stream::feed`]: push every signal into other streams (or this one)
//!
//! Children run inline on the caller's stack; cycles other than a direct self-feed are
//! rejected with [`crate::StreamError::Loop`] when the edge is built.

mod feed;
mod graph;

use crate::error::StreamResult;
use crate::execution::Instrumentation;
use crate::operation::{Operation, OperationClass};
use crate::processing::Mapper;
use crate::signal::{Directive, Signal};
use crate::stream::Stream;
use crate::types::Value;

pub use feed::Feed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForkKind {
    /// Children cloned from a prototype; results emitted at end.
    Prototype,
    /// Caller-provided children; results emitted at end.
    Match,
    /// Caller-provided handlers; signals pass through, nothing is emitted at end.
    Dispatch,
}

/// Routes each signal to the child stream of its discriminator bucket.
///
/// At end of input every child is finished in first-seen bucket order. `fork` and `fork_match`
/// then emit one signal per child: key = bucket, value = the child's result.
pub struct Fork {
    kind: ForkKind,
    discriminator: Mapper,
    prototype: Option<Stream>,
    children: Vec<(Value, Stream)>,
}

impl Fork {
    fn child_for(&mut self, bucket: &Value) -> StreamResult<Option<Stream>> {
        let existing = self.children.iter().find(|(key, _)| key.compare(bucket).is_eq());
        if let Some((_, child)) = existing {
            return Ok(Some(child.clone()));
        }
        match &self.prototype {
            Some(prototype) => {
                let child = prototype.instantiate()?;
                self.children.push((bucket.clone(), child.clone()));
                Ok(Some(child))
            }
            None => Ok(None),
        }
    }

    /// Children that already failed are not fed again; their error went through the policy
    /// when it was raised.
    fn route(&mut self, signal: &Signal) -> StreamResult<()> {
        let bucket = self.discriminator.apply(&signal.value, &signal.key)?;
        if let Some(child) = self.child_for(&bucket)? {
            if !child.has_failed() {
                child.accept((signal.key.clone(), signal.value.clone()))?;
            }
        }
        Ok(())
    }

    /// Finish every child. Healthy children are emitted; a child failing now contributes its
    /// error, and one that failed earlier is left out.
    fn flush(&mut self, position: u64) -> Directive {
        let mut out = Vec::new();
        let mut errors = Vec::new();
        for (bucket, child) in &self.children {
            if child.has_failed() {
                continue;
            }
            match child.finish().and_then(|()| child.result()) {
                Ok(result) => {
                    if self.kind != ForkKind::Dispatch {
                        out.push(Signal::new(bucket.clone(), result, position));
                    }
                }
                Err(err) => errors.push(err),
            }
        }
        if self.kind == ForkKind::Prototype {
            self.children.clear();
        }
        if errors.is_empty() {
            Directive::many(out)
        } else {
            Directive::Partial(out, errors)
        }
    }
}

impl Operation for Fork {
    fn name(&self) -> &'static str {
        match self.kind {
            ForkKind::Prototype => "fork",
            ForkKind::Match => "fork_match",
            ForkKind::Dispatch => "dispatch",
        }
    }

    fn class(&self) -> OperationClass {
        OperationClass::Buffering
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return self.flush(signal.position);
        }
        match self.route(&signal) {
            Ok(()) if self.kind == ForkKind::Dispatch => Directive::Forward(signal),
            Ok(()) => Directive::Drop,
            Err(err) => Directive::Fail(err),
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        match &self.prototype {
            Some(prototype) if self.kind == ForkKind::Prototype => Ok(Box::new(Fork {
                kind: ForkKind::Prototype,
                discriminator: self.discriminator.clone(),
                prototype: Some(prototype.clone()),
                children: Vec::new(),
            })),
            _ => Err(crate::StreamError::NotClonable { operation: self.name() }),
        }
    }

    fn targets(&self) -> Vec<Stream> {
        self.prototype
            .iter()
            .cloned()
            .chain(self.children.iter().map(|(_, child)| child.clone()))
            .collect()
    }
}

impl Stream {
    /// Push every signal into `targets` and forward it unchanged.
    ///
    /// `targets` may include this stream itself; the re-entry is queued and processed by the
    /// driver. A target finishes once every stream feeding it has finished.
    pub fn feed(self, targets: &[Stream]) -> StreamResult<Self> {
        self.core()?.pipe.check_open("feed")?;
        graph::check_edges(&self, targets, true, "feed")?;
        graph::check_live(targets)?;
        let op = Feed::new(&self, targets);
        self.append_boxed(Box::new(op))
    }

    /// One child per discriminator bucket, each a fresh copy of `prototype`.
    ///
    /// A prototype without a terminal stage collects its values into a `List`.
    pub fn fork(self, discriminator: Mapper, prototype: impl Into<Stream>) -> StreamResult<Self> {
        let prototype = prototype.into();
        self.core()?.pipe.check_open("fork")?;
        graph::check_edges(&self, std::slice::from_ref(&prototype), false, "fork")?;
        // Fail now rather than on the first signal if a stage cannot be copied.
        prototype
            .core()?
            .pipe
            .duplicate(Instrumentation::new(prototype.id(), None))?;
        self.append_boxed(Box::new(Fork {
            kind: ForkKind::Prototype,
            discriminator,
            prototype: Some(prototype),
            children: Vec::new(),
        }))
    }

    /// Route signals to caller-provided children; signals of other buckets are dropped.
    pub fn fork_match(
        self,
        discriminator: Mapper,
        children: Vec<(Value, Stream)>,
    ) -> StreamResult<Self> {
        self.fixed(ForkKind::Match, discriminator, children)
    }

    /// Route signals to the handler of their bucket and also forward them downstream.
    pub fn dispatch(
        self,
        discriminator: Mapper,
        handlers: Vec<(Value, Stream)>,
    ) -> StreamResult<Self> {
        self.fixed(ForkKind::Dispatch, discriminator, handlers)
    }

    fn fixed(
        self,
        kind: ForkKind,
        discriminator: Mapper,
        children: Vec<(Value, Stream)>,
    ) -> StreamResult<Self> {
        let operation = if kind == ForkKind::Dispatch { "dispatch" } else { "fork_match" };
        self.core()?.pipe.check_open(operation)?;
        let streams: Vec<Stream> = children.iter().map(|(_, child)| child.clone()).collect();
        graph::check_edges(&self, &streams, false, operation)?;
        graph::check_live(&streams)?;
        self.append_boxed(Box::new(Fork {
            kind,
            discriminator,
            prototype: None,
            children,
        }))
    }
}
