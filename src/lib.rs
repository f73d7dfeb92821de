//! `rust-data-stream` is a single-threaded, pull-driven stream processing engine over
//! dynamically typed `(key, value)` signals.
//!
//! A [`Stream`] owns one [`Producer`] (a lazy source of items) and one [`Pipe`] (an ordered
//! chain of [`Operation`]s). Builder calls append stages; a terminal call (`collect`, `reduce`,
//! `count`, ...) freezes the pipe and returns an [`Outcome`] that runs the stream on first
//! access.
//!
//! ## What the engine does
//!
//! - **Fusion:** adjacent stages are rewritten into cheaper equivalents as they are appended
//!   (`limit(5).limit(3)` becomes `limit(3)`, `sort().limit(n)` becomes a bounded top-n
//!   selection, `reverse().reverse()` disappears). Results are identical with fusion disabled
//!   ([`StreamOptions::optimize`]).
//! - **Early stop:** stages such as `limit`, `find` and `take_while` stop upstream pulling as
//!   soon as nothing more can reach the output.
//! - **Fork / feed:** one stream can route its signals into child streams by discriminator
//!   ([`Stream::fork`], [`Stream::fork_match`], [`Stream::dispatch`]) or push them into other
//!   streams, including itself ([`Stream::feed`]). Cycles are rejected when the edge is built.
//! - **Error policy:** execution errors are aborted on, skipped, or turned into a graceful stop
//!   per [`ErrorPolicy`]; builder misuse always fails immediately.
//!
//! ## Quick example
//!
//! ```rust
//! use rust_data_stream::processing::{reduce, Comparator, Filter};
//! use rust_data_stream::{Stream, Value};
//!
//! # fn main() -> Result<(), rust_data_stream::StreamError> {
//! let top = Stream::from_values(vec![4, 8, 15, 16, 23, 42])
//!     .filter(Filter::value(|v| v.as_i64().is_some_and(|x| x % 2 == 0)))?
//!     .sort(Comparator::by_value().reversed())?
//!     .limit(2)?
//!     .to_list()?;
//! assert_eq!(top, vec![Value::Int64(42), Value::Int64(16)]);
//!
//! let total = Stream::from_values(vec![1, 2, 3]).reduce(reduce::sum())?;
//! assert_eq!(total.get()?, Value::Int64(6));
//! # Ok(())
//! # }
//! ```
//!
//! ## Reading files
//!
//! [`ingestion::producer_from_path`] streams CSV and JSON/NDJSON records lazily against a
//! [`types::Schema`]; each record arrives as a [`Value::Map`] keyed by field name.
//!
//! ## Modules
//!
//! - [`stream`]: the fluent façade and the execution driver
//! - [`operation`]: every pipeline stage
//! - [`pipe`]: stage chaining and the fusion optimizer
//! - [`processing`]: filters, mappers, comparators, reducers and collectors
//! - [`fork`]: fork / dispatch / feed multiplexing
//! - [`execution`]: error policies, options, observers and metrics
//! - [`ingestion`]: CSV and JSON producers
//! - [`error`]: the crate error type

pub mod error;
pub mod execution;
pub mod fork;
pub mod ingestion;
pub mod operation;
pub mod pipe;
pub mod processing;
pub mod producer;
pub mod signal;
pub mod stream;
pub mod types;

pub use error::{ErrorClass, StreamError, StreamResult};
pub use execution::{ErrorAction, ErrorPolicy, StreamOptions};
pub use operation::{Operation, OperationClass};
pub use pipe::Pipe;
pub use producer::Producer;
pub use signal::{Directive, Item, Signal};
pub use stream::{Outcome, RunState, Stream};
pub use types::Value;
