//! Loop detection over the feed/fork graph.
//!
//! Edges run from a stream to every stream one of its stages pushes into
//! ([`crate::operation::Operation::targets`]). Only a stream feeding itself directly is
//! allowed; any other cycle is rejected when the edge would be created.

use std::collections::HashSet;

use crate::error::{StreamError, StreamResult};
use crate::stream::Stream;

/// Whether `goal` is reachable from `from` (or is `from`).
pub(crate) fn reaches(from: &Stream, goal: u64) -> StreamResult<bool> {
    let mut seen = HashSet::new();
    let mut stack = vec![from.clone()];
    while let Some(stream) = stack.pop() {
        if stream.id() == goal {
            return Ok(true);
        }
        if !seen.insert(stream.id()) {
            continue;
        }
        stack.extend(stream.core()?.pipe.targets());
    }
    Ok(false)
}

/// Reject `owner -> target` edges that would close a cycle through `owner`.
///
/// `allow_self` permits the direct self edge (a stream feeding itself).
pub(crate) fn check_edges(
    owner: &Stream,
    targets: &[Stream],
    allow_self: bool,
    operation: &str,
) -> StreamResult<()> {
    for target in targets {
        if target.same(owner) {
            if allow_self {
                continue;
            }
            return Err(StreamError::Loop {
                message: format!("{operation}: stream {} cannot be its own child", owner.id()),
            });
        }
        if reaches(target, owner.id())? {
            return Err(StreamError::Loop {
                message: format!(
                    "{operation}: stream {} already pushes into stream {}",
                    target.id(),
                    owner.id()
                ),
            });
        }
    }
    Ok(())
}

/// Reject targets that already finished.
pub(crate) fn check_live(targets: &[Stream]) -> StreamResult<()> {
    match targets.iter().find(|target| target.is_done()) {
        Some(done) => Err(StreamError::FeedAfterTermination { stream_id: done.id() }),
        None => Ok(()),
    }
}
