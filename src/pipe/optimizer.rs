//! Peephole rewrites applied when a stage is appended after the current tail.
//!
//! Only the `(tail, new)` pair is ever inspected. A rewrite that produces a replacement stage
//! hands it back to [`super::Pipe`], which pops the tail and appends the replacement again, so
//! chains such as `limit(5).limit(3).limit(2)` collapse one step at a time.

use tracing::trace;

use crate::operation::ordering::{Sort, SortLimited, Tail};
use crate::operation::stateless::{FilterOp, Limit, Skip};
use crate::operation::{Operation, Shape};

/// The result of looking at one `(tail, new)` pair.
pub(crate) enum Fusion {
    /// No rule applies: append `new`.
    Keep,
    /// `new` is redundant after `tail`.
    DropNew,
    /// The pair cancels out.
    DropBoth,
    /// `tail` is redundant before `new`: pop it and append `new` again.
    DropTail,
    /// Pop `tail` and append this stage instead of `new`.
    Replace(Box<dyn Operation>),
}

impl Fusion {
    fn label(&self) -> &'static str {
        match self {
            Fusion::Keep => "keep",
            Fusion::DropNew => "drop_new",
            Fusion::DropBoth => "drop_both",
            Fusion::DropTail => "drop_tail",
            Fusion::Replace(_) => "replace",
        }
    }
}

/// Decide how `new` combines with the current `tail`.
pub(crate) fn fuse(tail: &dyn Operation, new: &dyn Operation) -> Fusion {
    let fusion = rule(tail.shape(), new.shape());
    if !matches!(fusion, Fusion::Keep) {
        trace!(tail = tail.name(), new = new.name(), rewrite = fusion.label(), "fused stages");
    }
    fusion
}

fn rule(tail: Shape<'_>, new: Shape<'_>) -> Fusion {
    if let Shape::Filter(f) = &new {
        if f.as_constant() == Some(true) {
            return Fusion::DropNew;
        }
    }
    match (tail, new) {
        (Shape::Limit(a), Shape::Limit(b)) => Fusion::Replace(Box::new(Limit::new(a.min(b)))),
        (Shape::Skip(a), Shape::Skip(b)) => {
            Fusion::Replace(Box::new(Skip::new(a.saturating_add(b))))
        }
        (Shape::Tail(a), Shape::Tail(b)) => Fusion::Replace(Box::new(Tail::new(a.min(b)))),
        (Shape::Reverse, Shape::Reverse) | (Shape::Flip, Shape::Flip) => Fusion::DropBoth,
        (Shape::Reindex { .. }, Shape::Reindex { .. }) => Fusion::DropTail,
        (Shape::Shuffle, Shape::Sort { .. }) => Fusion::DropTail,
        (
            Shape::Reverse,
            Shape::Sort {
                comparator,
                reverse_ties,
                reverse_output,
            },
        ) => Fusion::Replace(Box::new(Sort::with_flags(
            comparator.clone(),
            !reverse_ties,
            reverse_output,
        ))),
        (
            Shape::Sort {
                comparator,
                reverse_ties,
                reverse_output,
            },
            Shape::Reverse,
        ) => Fusion::Replace(Box::new(Sort::with_flags(
            comparator.clone(),
            reverse_ties,
            !reverse_output,
        ))),
        (
            Shape::Sort {
                comparator,
                reverse_ties,
                reverse_output,
            },
            Shape::Limit(n),
        ) => {
            // A reversed emission is the prefix of the inverse total order.
            let selected = if reverse_output {
                SortLimited::with_flags(n, comparator.clone().reversed(), !reverse_ties, false)
            } else {
                SortLimited::with_flags(n, comparator.clone(), reverse_ties, false)
            };
            Fusion::Replace(Box::new(selected))
        }
        (
            Shape::SortLimited {
                limit,
                comparator,
                reverse_ties,
                reverse_output,
            },
            Shape::Reverse,
        ) => Fusion::Replace(Box::new(SortLimited::with_flags(
            limit,
            comparator.clone(),
            reverse_ties,
            !reverse_output,
        ))),
        (
            Shape::SortLimited {
                limit,
                comparator,
                reverse_ties,
                reverse_output: false,
            },
            Shape::Limit(n),
        ) => Fusion::Replace(Box::new(SortLimited::with_flags(
            limit.min(n),
            comparator.clone(),
            reverse_ties,
            false,
        ))),
        (Shape::MapKey(k), Shape::Map(v)) if k.is_use_value() && v.is_use_key() => Fusion::DropNew,
        (Shape::Map(v), Shape::MapKey(k)) if v.is_use_key() && k.is_use_value() => Fusion::DropNew,
        (Shape::Filter(f), Shape::Filter(g)) => {
            Fusion::Replace(Box::new(FilterOp::new(f.and_then(g))))
        }
        _ => Fusion::Keep,
    }
}

#[cfg(test)]
mod tests {
    use super::{fuse, Fusion};
    use crate::operation::ordering::{Reverse, Shuffle, Sort, SortLimited};
    use crate::operation::stateless::{FilterOp, Flip, Limit, MapKeyOp, MapOp, Reindex, Skip};
    use crate::operation::{Operation, Shape};
    use crate::error::StreamError;
    use crate::processing::{Comparator, Filter, Mapper};
    use crate::types::Value;

    fn replaced(f: Fusion) -> Box<dyn Operation> {
        match f {
            Fusion::Replace(op) => op,
            other => panic!("expected a replacement, got {}", other.label()),
        }
    }

    #[test]
    fn limits_take_the_minimum() {
        let op = replaced(fuse(&Limit::new(5), &Limit::new(3)));
        assert!(matches!(op.shape(), Shape::Limit(3)));
        let op = replaced(fuse(&Skip::new(2), &Skip::new(3)));
        assert!(matches!(op.shape(), Shape::Skip(5)));
    }

    #[test]
    fn involutions_cancel() {
        assert!(matches!(fuse(&Reverse::default(), &Reverse::default()), Fusion::DropBoth));
        assert!(matches!(fuse(&Flip, &Flip), Fusion::DropBoth));
        assert!(matches!(fuse(&Reindex::new(0, 1), &Reindex::new(5, 2)), Fusion::DropTail));
    }

    #[test]
    fn sort_absorbs_neighbours() {
        let sort = Sort::new(Comparator::by_value());
        assert!(matches!(fuse(&Shuffle::default(), &sort), Fusion::DropTail));
        let op = replaced(fuse(&Reverse::default(), &sort));
        assert!(matches!(
            op.shape(),
            Shape::Sort { reverse_ties: true, reverse_output: false, .. }
        ));
        let op = replaced(fuse(&sort, &Limit::new(4)));
        assert!(matches!(op.shape(), Shape::SortLimited { limit: 4, reverse_output: false, .. }));
        let top = SortLimited::new(4, Comparator::by_value());
        let op = replaced(fuse(&top, &Reverse::default()));
        assert!(matches!(op.shape(), Shape::SortLimited { limit: 4, reverse_output: true, .. }));
        assert!(matches!(fuse(op.as_ref(), &Limit::new(2)), Fusion::Keep));
    }

    #[test]
    fn key_value_round_trip_drops_second_stage() {
        let to_key = MapKeyOp::new(Mapper::UseValue);
        let to_value = MapOp::new(Mapper::UseKey);
        assert!(matches!(fuse(&to_key, &to_value), Fusion::DropNew));
        assert!(matches!(fuse(&to_value, &to_key), Fusion::DropNew));
    }

    #[test]
    fn filters_combine_and_always_vanishes() {
        let even = FilterOp::new(Filter::value(|v| v.as_i64().is_some_and(|x| x % 2 == 0)));
        assert!(matches!(fuse(&Limit::new(1), &FilterOp::new(Filter::always())), Fusion::DropNew));
        let op = replaced(fuse(&FilterOp::new(Filter::never()), &even));
        match op.shape() {
            Shape::Filter(f) => assert_eq!(f.as_constant(), Some(false)),
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn trailing_never_keeps_the_first_filter_evaluated() {
        let fallible = FilterOp::new(Filter::try_value(|v| match v.as_i64() {
            Some(3) => Err(StreamError::failed("three")),
            _ => Ok(true),
        }));
        let op = replaced(fuse(&fallible, &FilterOp::new(Filter::never())));
        let Shape::Filter(f) = op.shape() else {
            panic!("expected a filter");
        };
        assert_eq!(f.as_constant(), None);
        assert!(!f.evaluate(&Value::Int64(1), &Value::Null).unwrap());
        assert!(matches!(
            f.evaluate(&Value::Int64(3), &Value::Null),
            Err(StreamError::Failed { .. })
        ));
    }
}
