//! One-shot lazy sources of `(key, value)` items.

use std::fmt;
use std::iter::Fuse;

use crate::error::StreamResult;
use crate::signal::Item;
use crate::types::Value;

type ItemIter = Box<dyn Iterator<Item = StreamResult<Item>>>;

/// A fused iterator of fallible items. Once exhausted it keeps returning `None`.
pub struct Producer {
    inner: Fuse<ItemIter>,
}

impl Producer {
    pub fn new<I>(items: I) -> Self
    where
        I: Iterator<Item = StreamResult<Item>> + 'static,
    {
        let boxed: ItemIter = Box::new(items);
        Self { inner: boxed.fuse() }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// Values keyed by their 0-based index.
    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        I::IntoIter: 'static,
        V: Into<Value>,
    {
        Self::new(
            values
                .into_iter()
                .enumerate()
                .map(|(i, v)| Ok((Value::from(i), v.into()))),
        )
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        I::IntoIter: 'static,
        K: Into<Value>,
        V: Into<Value>,
    {
        Self::new(pairs.into_iter().map(|(k, v)| Ok((k.into(), v.into()))))
    }

    /// Items that may individually fail; failures go through the stream's error policy.
    pub fn from_results<I>(items: I) -> Self
    where
        I: IntoIterator<Item = StreamResult<Item>>,
        I::IntoIter: 'static,
    {
        Self::new(items.into_iter())
    }

    /// Unbounded generator: the `i`-th item is `(i, f(i))`. Pair it with `limit` or
    /// `take_while`.
    pub fn generate<F>(mut f: F) -> Self
    where
        F: FnMut(u64) -> Value + 'static,
    {
        Self::new((0u64..).map(move |i| Ok((Value::Int64(i as i64), f(i)))))
    }

    /// Items produced by a closure until it returns `None`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut() -> Option<StreamResult<Item>> + 'static,
    {
        Self::new(std::iter::from_fn(f))
    }
}

impl Default for Producer {
    fn default() -> Self {
        Self::empty()
    }
}

impl Iterator for Producer {
    type Item = StreamResult<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer").finish_non_exhaustive()
    }
}
