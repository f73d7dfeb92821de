//! Buffering stages that reorder or select from the whole input.

use std::cmp::Ordering;
use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::StreamResult;
use crate::processing::Comparator;
use crate::signal::{Directive, Signal};

use super::{Operation, OperationClass, Shape};

/// Emits the buffered input in reverse order.
#[derive(Debug, Clone, Default)]
pub struct Reverse {
    buffer: Vec<Signal>,
}

impl Operation for Reverse {
    fn name(&self) -> &'static str {
        "reverse"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Buffering
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Reverse
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if !signal.terminal {
            self.buffer.push(signal);
            return Directive::Drop;
        }
        let mut out = std::mem::take(&mut self.buffer);
        out.reverse();
        Directive::many(out)
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Reverse::default()))
    }
}

/// Emits the buffered input in random order.
#[derive(Debug, Clone, Default)]
pub struct Shuffle {
    seed: Option<u64>,
    buffer: Vec<Signal>,
}

impl Shuffle {
    /// Deterministic permutation for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            buffer: Vec::new(),
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }
}

impl Operation for Shuffle {
    fn name(&self) -> &'static str {
        "shuffle"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Buffering
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Shuffle
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if !signal.terminal {
            self.buffer.push(signal);
            return Directive::Drop;
        }
        let mut out = std::mem::take(&mut self.buffer);
        out.shuffle(&mut self.rng());
        Directive::many(out)
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Shuffle {
            seed: self.seed,
            buffer: Vec::new(),
        }))
    }
}

/// Stable sort of the whole input.
///
/// `reverse_ties` resolves equal elements in reversed intake order; `reverse_output` emits the
/// sorted sequence back to front. Both exist so that neighbouring `reverse` stages can be fused
/// away.
#[derive(Debug, Clone)]
pub struct Sort {
    comparator: Comparator,
    reverse_ties: bool,
    reverse_output: bool,
    buffer: Vec<Signal>,
}

impl Sort {
    pub fn new(comparator: Comparator) -> Self {
        Self::with_flags(comparator, false, false)
    }

    pub(crate) fn with_flags(
        comparator: Comparator,
        reverse_ties: bool,
        reverse_output: bool,
    ) -> Self {
        Self {
            comparator,
            reverse_ties,
            reverse_output,
            buffer: Vec::new(),
        }
    }
}

impl Operation for Sort {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Buffering
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Sort {
            comparator: &self.comparator,
            reverse_ties: self.reverse_ties,
            reverse_output: self.reverse_output,
        }
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if !signal.terminal {
            self.buffer.push(signal);
            return Directive::Drop;
        }
        let mut out = std::mem::take(&mut self.buffer);
        if self.reverse_ties {
            out.reverse();
        }
        let cmp = &self.comparator;
        out.sort_by(|a, b| cmp.compare((&a.value, &a.key), (&b.value, &b.key)));
        if self.reverse_output {
            out.reverse();
        }
        Directive::many(out)
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Sort::with_flags(
            self.comparator.clone(),
            self.reverse_ties,
            self.reverse_output,
        )))
    }
}

/// Bounded top-k: the `limit` smallest signals under the comparator, emitted in sorted order.
///
/// Keeps a binary max-heap of at most `limit` entries ordered by `(comparator, intake
/// sequence)`, so each admission costs O(log limit) comparisons and the output is exactly the
/// prefix of a stable sort.
#[derive(Debug, Clone)]
pub struct SortLimited {
    limit: usize,
    comparator: Comparator,
    reverse_ties: bool,
    reverse_output: bool,
    seq: u64,
    heap: Vec<(u64, Signal)>,
}

impl SortLimited {
    pub fn new(limit: usize, comparator: Comparator) -> Self {
        Self::with_flags(limit, comparator, false, false)
    }

    pub(crate) fn with_flags(
        limit: usize,
        comparator: Comparator,
        reverse_ties: bool,
        reverse_output: bool,
    ) -> Self {
        Self {
            limit,
            comparator,
            reverse_ties,
            reverse_output,
            seq: 0,
            heap: Vec::with_capacity(limit.min(1024)),
        }
    }

    fn order(&self, a: &(u64, Signal), b: &(u64, Signal)) -> Ordering {
        self.comparator
            .compare((&a.1.value, &a.1.key), (&b.1.value, &b.1.key))
            .then_with(|| {
                if self.reverse_ties {
                    b.0.cmp(&a.0)
                } else {
                    a.0.cmp(&b.0)
                }
            })
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.order(&self.heap[idx], &self.heap[parent]) != Ordering::Greater {
                break;
            }
            self.heap.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * idx + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut largest = left;
            if right < len && self.order(&self.heap[right], &self.heap[left]) == Ordering::Greater {
                largest = right;
            }
            if self.order(&self.heap[largest], &self.heap[idx]) != Ordering::Greater {
                break;
            }
            self.heap.swap(idx, largest);
            idx = largest;
        }
    }

    fn admit(&mut self, signal: Signal) {
        let entry = (self.seq, signal);
        self.seq += 1;
        if self.heap.len() < self.limit {
            self.heap.push(entry);
            let last = self.heap.len() - 1;
            self.sift_up(last);
        } else if self.order(&entry, &self.heap[0]) == Ordering::Less {
            self.heap[0] = entry;
            self.sift_down(0);
        }
    }
}

impl Operation for SortLimited {
    fn name(&self) -> &'static str {
        "sort_limited"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Buffering
    }

    fn shape(&self) -> Shape<'_> {
        Shape::SortLimited {
            limit: self.limit,
            comparator: &self.comparator,
            reverse_ties: self.reverse_ties,
            reverse_output: self.reverse_output,
        }
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if !signal.terminal {
            if self.limit > 0 {
                self.admit(signal);
            }
            return Directive::Drop;
        }
        let mut kept = std::mem::take(&mut self.heap);
        kept.sort_by(|a, b| self.order(a, b));
        let mut out: Vec<Signal> = kept.into_iter().map(|(_, s)| s).collect();
        if self.reverse_output {
            out.reverse();
        }
        self.seq = 0;
        Directive::many(out)
    }

    fn accepts_input(&self) -> bool {
        self.limit > 0
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(SortLimited::with_flags(
            self.limit,
            self.comparator.clone(),
            self.reverse_ties,
            self.reverse_output,
        )))
    }
}

/// Emits the last `count` signals.
#[derive(Debug, Clone)]
pub struct Tail {
    count: usize,
    buffer: VecDeque<Signal>,
}

impl Tail {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            buffer: VecDeque::new(),
        }
    }
}

impl Operation for Tail {
    fn name(&self) -> &'static str {
        "tail"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Buffering
    }

    fn shape(&self) -> Shape<'_> {
        Shape::Tail(self.count)
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        if signal.terminal {
            return Directive::many(self.buffer.drain(..).collect());
        }
        if self.count == 0 {
            return Directive::Drop;
        }
        if self.buffer.len() == self.count {
            self.buffer.pop_front();
        }
        self.buffer.push_back(signal);
        Directive::Drop
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        Ok(Box::new(Tail::new(self.count)))
    }
}
