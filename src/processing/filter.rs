//! Predicates over signals and their boolean algebra.
//!
//! A [`Filter`] evaluates a `(value, key)` pair. Leaf predicates either look at a single
//! [`Value`] under a [`CheckMode`] or at the pair directly. Negation is pushed down to the
//! leaves with exact De Morgan rewrites, so `negate()` never grows the tree:
//!
//! | mode | predicate holds when | negation |
//! |---|---|---|
//! | `Value` | `p(value)` | `Value`, `!p` |
//! | `Key` | `p(key)` | `Key`, `!p` |
//! | `Both` | `p(value) && p(key)` | `Any`, `!p` |
//! | `Any` | `p(value) \|\| p(key)` | `Both`, `!p` |

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::StreamResult;
use crate::types::Value;

/// Fallible predicate over one value.
pub type PredicateFn = Rc<dyn Fn(&Value) -> StreamResult<bool>>;
/// Fallible predicate over `(value, key)`.
pub type PairPredicateFn = Rc<dyn Fn(&Value, &Value) -> StreamResult<bool>>;

/// Which part of a signal a value predicate is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckMode {
    /// Only the value.
    Value,
    /// Only the key.
    Key,
    /// Value and key must both satisfy the predicate.
    Both,
    /// Value or key must satisfy the predicate.
    Any,
}

impl CheckMode {
    /// The mode a negated predicate moves to.
    pub fn negated(self) -> Self {
        match self {
            CheckMode::Both => CheckMode::Any,
            CheckMode::Any => CheckMode::Both,
            other => other,
        }
    }
}

impl Default for CheckMode {
    fn default() -> Self {
        CheckMode::Value
    }
}

/// A composable, cheaply clonable predicate over signals.
#[derive(Clone)]
pub struct Filter(Rc<FilterNode>);

enum FilterNode {
    Const(bool),
    Predicate {
        test: PredicateFn,
        mode: CheckMode,
        negated: bool,
    },
    Pair(PairPredicateFn),
    Not(Filter),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Xor(Filter, Filter),
}

thread_local! {
    static ALWAYS: Filter = Filter(Rc::new(FilterNode::Const(true)));
    static NEVER: Filter = Filter(Rc::new(FilterNode::Const(false)));
}

impl Filter {
    fn node(node: FilterNode) -> Self {
        Filter(Rc::new(node))
    }

    /// The filter accepting everything. Always the same shared instance.
    pub fn always() -> Self {
        ALWAYS.with(Filter::clone)
    }

    /// The filter rejecting everything. Always the same shared instance.
    pub fn never() -> Self {
        NEVER.with(Filter::clone)
    }

    pub fn constant(accept: bool) -> Self {
        if accept {
            Self::always()
        } else {
            Self::never()
        }
    }

    /// Fallible value predicate applied according to `mode`.
    pub fn try_predicate<F>(mode: CheckMode, test: F) -> Self
    where
        F: Fn(&Value) -> StreamResult<bool> + 'static,
    {
        Self::node(FilterNode::Predicate {
            test: Rc::new(test),
            mode,
            negated: false,
        })
    }

    pub fn predicate<F>(mode: CheckMode, test: F) -> Self
    where
        F: Fn(&Value) -> bool + 'static,
    {
        Self::try_predicate(mode, move |v| Ok(test(v)))
    }

    pub fn value<F>(test: F) -> Self
    where
        F: Fn(&Value) -> bool + 'static,
    {
        Self::predicate(CheckMode::Value, test)
    }

    pub fn try_value<F>(test: F) -> Self
    where
        F: Fn(&Value) -> StreamResult<bool> + 'static,
    {
        Self::try_predicate(CheckMode::Value, test)
    }

    pub fn key<F>(test: F) -> Self
    where
        F: Fn(&Value) -> bool + 'static,
    {
        Self::predicate(CheckMode::Key, test)
    }

    pub fn both<F>(test: F) -> Self
    where
        F: Fn(&Value) -> bool + 'static,
    {
        Self::predicate(CheckMode::Both, test)
    }

    pub fn any<F>(test: F) -> Self
    where
        F: Fn(&Value) -> bool + 'static,
    {
        Self::predicate(CheckMode::Any, test)
    }

    /// Predicate receiving `(value, key)`.
    pub fn pair<F>(test: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + 'static,
    {
        Self::node(FilterNode::Pair(Rc::new(move |v, k| Ok(test(v, k)))))
    }

    pub fn try_pair<F>(test: F) -> Self
    where
        F: Fn(&Value, &Value) -> StreamResult<bool> + 'static,
    {
        Self::node(FilterNode::Pair(Rc::new(test)))
    }

    /// Accepts values equal to `expected`.
    pub fn equals(expected: impl Into<Value>) -> Self {
        let expected = expected.into();
        Self::value(move |v| *v == expected)
    }

    /// Evaluate the filter against a `(value, key)` pair.
    pub fn evaluate(&self, value: &Value, key: &Value) -> StreamResult<bool> {
        match self.0.as_ref() {
            FilterNode::Const(accept) => Ok(*accept),
            FilterNode::Predicate {
                test,
                mode,
                negated,
            } => {
                let check = |x: &Value| -> StreamResult<bool> { Ok(test(x)? != *negated) };
                match mode {
                    CheckMode::Value => check(value),
                    CheckMode::Key => check(key),
                    CheckMode::Both => Ok(check(value)? && check(key)?),
                    CheckMode::Any => Ok(check(value)? || check(key)?),
                }
            }
            FilterNode::Pair(test) => test(value, key),
            FilterNode::Not(inner) => Ok(!inner.evaluate(value, key)?),
            FilterNode::And(parts) => {
                for part in parts {
                    if !part.evaluate(value, key)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            FilterNode::Or(parts) => {
                for part in parts {
                    if part.evaluate(value, key)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            FilterNode::Xor(a, b) => Ok(a.evaluate(value, key)? != b.evaluate(value, key)?),
        }
    }

    /// The logical negation, with negation pushed to the leaves.
    pub fn negate(&self) -> Self {
        match self.0.as_ref() {
            FilterNode::Const(accept) => Self::constant(!accept),
            FilterNode::Predicate {
                test,
                mode,
                negated,
            } => Self::node(FilterNode::Predicate {
                test: Rc::clone(test),
                mode: mode.negated(),
                negated: !negated,
            }),
            FilterNode::Pair(_) => Self::node(FilterNode::Not(self.clone())),
            FilterNode::Not(inner) => inner.clone(),
            FilterNode::And(parts) => {
                Self::node(FilterNode::Or(parts.iter().map(Filter::negate).collect()))
            }
            FilterNode::Or(parts) => {
                Self::node(FilterNode::And(parts.iter().map(Filter::negate).collect()))
            }
            FilterNode::Xor(a, b) => Self::node(FilterNode::Xor(a.negate(), b.clone())),
        }
    }

    pub fn and(&self, other: &Filter) -> Self {
        match (self.as_constant(), other.as_constant()) {
            (Some(false), _) | (_, Some(false)) => return Self::never(),
            (Some(true), _) => return other.clone(),
            (_, Some(true)) => return self.clone(),
            _ => {}
        }
        self.conjunction(other)
    }

    /// Conjunction that evaluates `self` first and `other` only on acceptance, exactly like two
    /// filters applied one after the other. Unlike [`Filter::and`], a constant `other` never
    /// short-circuits `self`, so errors raised by `self` still surface.
    pub(crate) fn and_then(&self, other: &Filter) -> Self {
        match (self.as_constant(), other.as_constant()) {
            (Some(false), _) => return Self::never(),
            (Some(true), _) => return other.clone(),
            (_, Some(true)) => return self.clone(),
            _ => {}
        }
        self.conjunction(other)
    }

    fn conjunction(&self, other: &Filter) -> Self {
        let mut parts = Vec::new();
        for f in [self, other] {
            match f.0.as_ref() {
                FilterNode::And(inner) => parts.extend(inner.iter().cloned()),
                _ => parts.push(f.clone()),
            }
        }
        Self::node(FilterNode::And(parts))
    }

    pub fn or(&self, other: &Filter) -> Self {
        match (self.as_constant(), other.as_constant()) {
            (Some(true), _) | (_, Some(true)) => return Self::always(),
            (Some(false), _) => return other.clone(),
            (_, Some(false)) => return self.clone(),
            _ => {}
        }
        let mut parts = Vec::new();
        for f in [self, other] {
            match f.0.as_ref() {
                FilterNode::Or(inner) => parts.extend(inner.iter().cloned()),
                _ => parts.push(f.clone()),
            }
        }
        Self::node(FilterNode::Or(parts))
    }

    pub fn xor(&self, other: &Filter) -> Self {
        match (self.as_constant(), other.as_constant()) {
            (Some(false), _) => other.clone(),
            (_, Some(false)) => self.clone(),
            (Some(true), _) => other.negate(),
            (_, Some(true)) => self.negate(),
            _ => Self::node(FilterNode::Xor(self.clone(), other.clone())),
        }
    }

    /// Re-target every value predicate of this filter to `mode`.
    ///
    /// Constant and pair filters do not depend on a mode; for those (and for predicates already
    /// in `mode`) the very same instance is returned.
    pub fn with_mode(&self, mode: CheckMode) -> Self {
        match self.0.as_ref() {
            FilterNode::Const(_) | FilterNode::Pair(_) => self.clone(),
            FilterNode::Predicate {
                test,
                mode: current,
                negated,
            } => {
                if *current == mode {
                    self.clone()
                } else {
                    Self::node(FilterNode::Predicate {
                        test: Rc::clone(test),
                        mode,
                        negated: *negated,
                    })
                }
            }
            FilterNode::Not(inner) => Self::node(FilterNode::Not(inner.with_mode(mode))),
            FilterNode::And(parts) => {
                Self::node(FilterNode::And(parts.iter().map(|p| p.with_mode(mode)).collect()))
            }
            FilterNode::Or(parts) => {
                Self::node(FilterNode::Or(parts.iter().map(|p| p.with_mode(mode)).collect()))
            }
            FilterNode::Xor(a, b) => {
                Self::node(FilterNode::Xor(a.with_mode(mode), b.with_mode(mode)))
            }
        }
    }

    /// `Some(accept)` when this filter ignores its input.
    pub fn as_constant(&self) -> Option<bool> {
        match self.0.as_ref() {
            FilterNode::Const(accept) => Some(*accept),
            _ => None,
        }
    }

    /// The check mode of a leaf value predicate.
    pub fn mode(&self) -> Option<CheckMode> {
        match self.0.as_ref() {
            FilterNode::Predicate { mode, .. } => Some(*mode),
            _ => None,
        }
    }

    /// Whether both handles point at the same filter instance.
    pub fn ptr_eq(&self, other: &Filter) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_ref() {
            FilterNode::Const(accept) => write!(f, "Const({accept})"),
            FilterNode::Predicate { mode, negated, .. } => {
                if *negated {
                    write!(f, "Not(Predicate({mode:?}))")
                } else {
                    write!(f, "Predicate({mode:?})")
                }
            }
            FilterNode::Pair(_) => write!(f, "Pair"),
            FilterNode::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            FilterNode::And(parts) => f.debug_tuple("And").field(parts).finish(),
            FilterNode::Or(parts) => f.debug_tuple("Or").field(parts).finish(),
            FilterNode::Xor(a, b) => f.debug_tuple("Xor").field(a).field(b).finish(),
        }
    }
}
