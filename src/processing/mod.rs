//! Leaf functions plugged into stream operations.
//!
//! The engine never looks inside these; each satisfies a narrow contract:
//!
//! - [`Filter`]: `(value, key) -> bool`, with a [`CheckMode`] algebra (NOT/AND/OR/XOR)
//! - [`Mapper`]: `(value, key) -> Value`, with an explicit argument role
//! - [`Comparator`]: ordering of `(value, key)` pairs
//! - [`Reducer`]: folds signals into one value (count/sum/min/max/average/concat/fold)
//! - [`Collector`]: external sink accepting `(key, value)`
//!
//! ## Example: filter → map → reduce
//!
//! ```rust
//! use rust_data_stream::processing::{reduce, Filter, Mapper};
//! use rust_data_stream::types::Value;
//! use rust_data_stream::Stream;
//!
//! # fn main() -> Result<(), rust_data_stream::StreamError> {
//! let total = Stream::from_values(vec![1, 2, 3, 4])
//!     .filter(Filter::value(|v| v.as_i64().is_some_and(|x| x % 2 == 0)))?
//!     .map(Mapper::value(|v| Value::Int64(v.as_i64().unwrap_or(0) * 10)))?
//!     .reduce(reduce::sum())?
//!     .get()?;
//! assert_eq!(total, Value::Int64(60));
//! # Ok(())
//! # }
//! ```

pub mod collect;
pub mod compare;
pub mod filter;
pub mod map;
pub mod reduce;

pub use collect::Collector;
pub use compare::{Comparator, SortBy};
pub use filter::{CheckMode, Filter};
pub use map::Mapper;
pub use reduce::{ReduceOp, Reducer};
