//! Buffering stages that bundle several signals into one.
//!
//! A bundle is a `List` of values, or a `Map` of `(key, value)` entries when keys are
//! preserved (see [`super::bundle`]).

use std::collections::VecDeque;

use crate::error::{StreamError, StreamResult};
use crate::processing::{Comparator, Filter, Mapper};
use crate::signal::{Directive, Signal};
use crate::types::Value;

use super::{bundle, Operation, OperationClass};

fn emit(key: Value, group: &[Signal], preserve_keys: bool) -> Option<Signal> {
    let position = group.last()?.position;
    Some(Signal::new(key, bundle(group, preserve_keys), position))
}

/// Sliding window of `size` signals, emitted every `step` intake signals once full.
///
/// Keys of emitted windows are the window index. At end of input, a last window is emitted if
/// signals arrived since the previous emission (this is also how a short input yields one
/// partial window).
#[derive(Debug, Clone)]
pub struct Window {
    size: usize,
    step: usize,
    preserve_keys: bool,
    ring: VecDeque<Signal>,
    pending: usize,
    filled: bool,
    index: i64,
}

impl Window {
    pub fn new(size: usize, step: usize, preserve_keys: bool) -> StreamResult<Self> {
        if size == 0 {
            return Err(StreamError::invalid("window", "size must be > 0"));
        }
        if step == 0 {
            return Err(StreamError::invalid("window", "step must be > 0"));
        }
        Ok(Self {
            size,
            step,
            preserve_keys,
            ring: VecDeque::with_capacity(size),
            pending: 0,
            filled: false,
            index: 0,
        })
    }

    fn snapshot(&mut self) -> Option<Signal> {
        self.pending = 0;
        let group: Vec<Signal> = self.ring.iter().cloned().collect();
        let out = emit(Value::Int64(self.index), &group, self.preserve_keys);
        self.index += 1;
        out
    }
}

impl Operation for Window {
    fn name(&self) -> &'static str {
        "window"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Buffering
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            if self.pending == 0 {
                return Directive::Drop;
            }
            return Directive::from_result(Ok(self.snapshot()));
        }
        if self.ring.len() == self.size {
            self.ring.pop_front();
        }
        self.ring.push_back(signal);
        self.pending += 1;
        let due = if self.filled {
            self.pending >= self.step
        } else {
            self.ring.len() == self.size
        };
        if !due {
            return Directive::Drop;
        }
        self.filled = true;
        Directive::from_result(Ok(self.snapshot()))
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Window::new(self.size, self.step, self.preserve_keys)?))
    }
}

/// Consecutive, non-overlapping groups of `size` signals; the remainder is flushed at the end.
#[derive(Debug, Clone)]
pub struct Chunk {
    size: usize,
    preserve_keys: bool,
    current: Vec<Signal>,
    index: i64,
}

impl Chunk {
    pub fn new(size: usize, preserve_keys: bool) -> StreamResult<Self> {
        if size == 0 {
            return Err(StreamError::invalid("chunk", "size must be > 0"));
        }
        Ok(Self {
            size,
            preserve_keys,
            current: Vec::with_capacity(size),
            index: 0,
        })
    }

    fn flush(&mut self) -> Directive {
        let group = std::mem::take(&mut self.current);
        let out = emit(Value::Int64(self.index), &group, self.preserve_keys);
        if out.is_some() {
            self.index += 1;
        }
        Directive::from_result(Ok(out))
    }
}

impl Operation for Chunk {
    fn name(&self) -> &'static str {
        "chunk"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Buffering
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return self.flush();
        }
        self.current.push(signal);
        if self.current.len() == self.size {
            self.flush()
        } else {
            Directive::Drop
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Chunk::new(self.size, self.preserve_keys)?))
    }
}

/// Runs of consecutive signals accepted by a filter; rejected signals are dropped and close
/// the current run.
#[derive(Debug, Clone)]
pub struct Accumulate {
    filter: Filter,
    preserve_keys: bool,
    current: Vec<Signal>,
    index: i64,
}

impl Accumulate {
    pub fn new(filter: Filter, preserve_keys: bool) -> Self {
        Self {
            filter,
            preserve_keys,
            current: Vec::new(),
            index: 0,
        }
    }

    fn flush(&mut self) -> Directive {
        let group = std::mem::take(&mut self.current);
        let out = emit(Value::Int64(self.index), &group, self.preserve_keys);
        if out.is_some() {
            self.index += 1;
        }
        Directive::from_result(Ok(out))
    }
}

impl Operation for Accumulate {
    fn name(&self) -> &'static str {
        "accumulate"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Buffering
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return self.flush();
        }
        match self.filter.evaluate(&signal.value, &signal.key) {
            Ok(true) => {
                self.current.push(signal);
                Directive::Drop
            }
            Ok(false) => self.flush(),
            Err(err) => Directive::Fail(err),
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Accumulate::new(self.filter.clone(), self.preserve_keys)))
    }
}

/// Runs of consecutive signals with an equal discriminator; each run is keyed by its
/// discriminator value.
#[derive(Debug, Clone)]
pub struct ChunkBy {
    discriminator: Mapper,
    preserve_keys: bool,
    current: Option<(Value, Vec<Signal>)>,
}

impl ChunkBy {
    pub fn new(discriminator: Mapper, preserve_keys: bool) -> Self {
        Self {
            discriminator,
            preserve_keys,
            current: None,
        }
    }

    fn flush(&mut self) -> Option<Signal> {
        let (key, group) = self.current.take()?;
        emit(key, &group, self.preserve_keys)
    }
}

impl Operation for ChunkBy {
    fn name(&self) -> &'static str {
        "chunk_by"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Buffering
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return Directive::from_result(Ok(self.flush()));
        }
        let bucket = match self.discriminator.apply(&signal.value, &signal.key) {
            Ok(bucket) => bucket,
            Err(err) => return Directive::Fail(err),
        };
        if let Some((current, group)) = self.current.as_mut() {
            if current.compare(&bucket).is_eq() {
                group.push(signal);
                return Directive::Drop;
            }
        }
        let done = self.flush();
        self.current = Some((bucket, vec![signal]));
        Directive::from_result(Ok(done))
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(ChunkBy::new(self.discriminator.clone(), self.preserve_keys)))
    }
}

/// Groups signals by comparator equality into at most `limit` buckets in first-seen order.
///
/// Signals that would open a bucket past the limit are discarded. Each bucket is emitted at
/// end of input as a `Map` of the original `(key, value)` entries, keyed by bucket index.
#[derive(Debug, Clone)]
pub struct Segregate {
    limit: Option<usize>,
    comparator: Comparator,
    buckets: Vec<Vec<Signal>>,
}

impl Segregate {
    pub fn new(limit: Option<usize>, comparator: Comparator) -> StreamResult<Self> {
        if limit == Some(0) {
            return Err(StreamError::invalid("segregate", "bucket limit must be > 0"));
        }
        Ok(Self {
            limit,
            comparator,
            buckets: Vec::new(),
        })
    }

    fn bucket_of(&self, signal: &Signal) -> Option<usize> {
        self.buckets.iter().position(|bucket| {
            bucket.first().is_some_and(|head| {
                self.comparator
                    .compare((&head.value, &head.key), (&signal.value, &signal.key))
                    .is_eq()
            })
        })
    }
}

impl Operation for Segregate {
    fn name(&self) -> &'static str {
        "segregate"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Buffering
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            let out = std::mem::take(&mut self.buckets)
                .into_iter()
                .enumerate()
                .filter_map(|(i, group)| emit(Value::from(i), &group, true))
                .collect();
            return Directive::many(out);
        }
        match self.bucket_of(&signal) {
            Some(i) => self.buckets[i].push(signal),
            None if self.limit.is_none_or(|max| self.buckets.len() < max) => {
                self.buckets.push(vec![signal]);
            }
            None => {}
        }
        Directive::Drop
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Segregate::new(self.limit, self.comparator.clone())?))
    }
}

/// The whole input as one signal; nothing is emitted for an empty input.
#[derive(Debug, Clone, Default)]
pub struct Gather {
    preserve_keys: bool,
    buffer: Vec<Signal>,
}

impl Gather {
    pub fn new(preserve_keys: bool) -> Self {
        Self {
            preserve_keys,
            buffer: Vec::new(),
        }
    }
}

impl Operation for Gather {
    fn name(&self) -> &'static str {
        "gather"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Buffering
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if !signal.terminal {
            self.buffer.push(signal);
            return Directive::Drop;
        }
        let group = std::mem::take(&mut self.buffer);
        Directive::from_result(Ok(emit(Value::Int64(0), &group, self.preserve_keys)))
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Gather::new(self.preserve_keys)))
    }
}
