//! Orderings used by sort, top-k and segregate.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::types::Value;

/// What a [`Comparator`] looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Value,
    Key,
    /// Value first, key as tie-break.
    ValueThenKey,
}

/// Orders `(value, key)` pairs.
#[derive(Clone)]
pub struct Comparator {
    by: SortBy,
    custom: Option<Rc<dyn Fn(&Value, &Value) -> Ordering>>,
    descending: bool,
}

impl Comparator {
    /// Natural [`Value::compare`] order of values.
    pub fn by_value() -> Self {
        Self {
            by: SortBy::Value,
            custom: None,
            descending: false,
        }
    }

    pub fn by_key() -> Self {
        Self {
            by: SortBy::Key,
            ..Self::by_value()
        }
    }

    pub fn by_value_then_key() -> Self {
        Self {
            by: SortBy::ValueThenKey,
            ..Self::by_value()
        }
    }

    /// Custom ordering applied to whatever `by` selects.
    pub fn custom<F>(by: SortBy, f: F) -> Self
    where
        F: Fn(&Value, &Value) -> Ordering + 'static,
    {
        Self {
            by,
            custom: Some(Rc::new(f)),
            descending: false,
        }
    }

    /// The inverse ordering.
    pub fn reversed(mut self) -> Self {
        self.descending = !self.descending;
        self
    }

    pub fn sort_by(&self) -> SortBy {
        self.by
    }

    /// Whether ordering depends on keys.
    pub fn orders_by_key(&self) -> bool {
        matches!(self.by, SortBy::Key | SortBy::ValueThenKey)
    }

    fn cmp_values(&self, a: &Value, b: &Value) -> Ordering {
        match &self.custom {
            Some(f) => f(a, b),
            None => a.compare(b),
        }
    }

    /// Compare two `(value, key)` pairs.
    pub fn compare(&self, a: (&Value, &Value), b: (&Value, &Value)) -> Ordering {
        let ord = match self.by {
            SortBy::Value => self.cmp_values(a.0, b.0),
            SortBy::Key => self.cmp_values(a.1, b.1),
            SortBy::ValueThenKey => {
                self.cmp_values(a.0, b.0).then_with(|| self.cmp_values(a.1, b.1))
            }
        };
        if self.descending {
            ord.reverse()
        } else {
            ord
        }
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Self::by_value()
    }
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparator")
            .field("by", &self.by)
            .field("custom", &self.custom.is_some())
            .field("descending", &self.descending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{Comparator, SortBy};
    use crate::types::Value;

    #[test]
    fn value_then_key_breaks_ties_by_key() {
        let c = Comparator::by_value_then_key();
        let a = (&Value::Int64(1), &Value::Int64(9));
        let b = (&Value::Int64(1), &Value::Int64(2));
        assert_eq!(c.compare(a, b), Ordering::Greater);
        assert_eq!(c.clone().reversed().compare(a, b), Ordering::Less);
    }

    #[test]
    fn custom_applies_to_selected_part() {
        let by_len = Comparator::custom(SortBy::Key, |a, b| {
            a.as_str().map(str::len).cmp(&b.as_str().map(str::len))
        });
        let short = (&Value::Null, &Value::from("ab"));
        let long = (&Value::Null, &Value::from("abcd"));
        assert_eq!(by_len.compare(short, long), Ordering::Less);
        assert!(by_len.orders_by_key());
    }
}
