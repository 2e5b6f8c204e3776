//! Key ranges and queries.

use crate::error::{CodecError, CodecResult};
use crate::key::Key;
use std::cmp::Ordering;

/// An interval over the key order with independently open endpoints.
///
/// A missing bound is unbounded on that side. Ranges are immutable once
/// built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    lower: Option<Key>,
    upper: Option<Key>,
    lower_open: bool,
    upper_open: bool,
}

impl KeyRange {
    /// A range matching every key.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            lower: None,
            upper: None,
            lower_open: false,
            upper_open: false,
        }
    }

    /// A range matching exactly `key`.
    #[must_use]
    pub fn only(key: Key) -> Self {
        Self {
            lower: Some(key.clone()),
            upper: Some(key),
            lower_open: false,
            upper_open: false,
        }
    }

    /// Keys above `lower` (or equal to it, unless `open`).
    #[must_use]
    pub fn lower_bound(lower: Key, open: bool) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
            lower_open: open,
            upper_open: false,
        }
    }

    /// Keys below `upper` (or equal to it, unless `open`).
    #[must_use]
    pub fn upper_bound(upper: Key, open: bool) -> Self {
        Self {
            lower: None,
            upper: Some(upper),
            lower_open: false,
            upper_open: open,
        }
    }

    /// Keys between `lower` and `upper`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKey`] if either end is not a valid
    /// key, if `lower > upper`, or if they are equal and either end is
    /// open.
    pub fn bound(lower: Key, upper: Key, lower_open: bool, upper_open: bool) -> CodecResult<Self> {
        lower.validate()?;
        upper.validate()?;
        match lower.cmp(&upper) {
            Ordering::Greater => {
                return Err(CodecError::invalid_key(format!(
                    "lower bound {lower} is above upper bound {upper}"
                )))
            }
            Ordering::Equal if lower_open || upper_open => {
                return Err(CodecError::invalid_key(format!(
                    "range around {lower} with an open end is empty"
                )))
            }
            _ => {}
        }
        Ok(Self {
            lower: Some(lower),
            upper: Some(upper),
            lower_open,
            upper_open,
        })
    }

    /// The lower bound, if any.
    #[must_use]
    pub fn lower(&self) -> Option<&Key> {
        self.lower.as_ref()
    }

    /// The upper bound, if any.
    #[must_use]
    pub fn upper(&self) -> Option<&Key> {
        self.upper.as_ref()
    }

    /// Whether the lower bound excludes itself.
    #[must_use]
    pub fn lower_open(&self) -> bool {
        self.lower_open
    }

    /// Whether the upper bound excludes itself.
    #[must_use]
    pub fn upper_open(&self) -> bool {
        self.upper_open
    }

    /// Checks that both bounds are valid keys.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKey`] for a `NaN` bound.
    pub fn validate(&self) -> CodecResult<()> {
        self.lower.iter().chain(&self.upper).try_for_each(Key::validate)
    }

    /// Returns true if `key` is above the lower bound.
    #[must_use]
    pub fn above_lower(&self, key: &Key) -> bool {
        match &self.lower {
            None => true,
            Some(lower) => match key.cmp(lower) {
                Ordering::Greater => true,
                Ordering::Equal => !self.lower_open,
                Ordering::Less => false,
            },
        }
    }

    /// Returns true if `key` is below the upper bound.
    #[must_use]
    pub fn below_upper(&self, key: &Key) -> bool {
        match &self.upper {
            None => true,
            Some(upper) => match key.cmp(upper) {
                Ordering::Less => true,
                Ordering::Equal => !self.upper_open,
                Ordering::Greater => false,
            },
        }
    }

    /// Returns true if `key` lies inside the range.
    #[must_use]
    pub fn includes(&self, key: &Key) -> bool {
        self.above_lower(key) && self.below_upper(key)
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Either a single key or a range, as accepted by lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyQuery {
    /// Exactly one key.
    Key(Key),
    /// Every key inside a range.
    Range(KeyRange),
}

impl KeyQuery {
    /// Returns true if `key` matches the query.
    #[must_use]
    pub fn includes(&self, key: &Key) -> bool {
        match self {
            KeyQuery::Key(k) => k == key,
            KeyQuery::Range(range) => range.includes(key),
        }
    }

    /// Checks that the key or both range bounds are valid keys.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKey`] for a `NaN` key or bound.
    pub fn validate(&self) -> CodecResult<()> {
        match self {
            KeyQuery::Key(key) => key.validate(),
            KeyQuery::Range(range) => range.validate(),
        }
    }

    /// Returns the query as a range.
    #[must_use]
    pub fn to_range(&self) -> KeyRange {
        match self {
            KeyQuery::Key(k) => KeyRange::only(k.clone()),
            KeyQuery::Range(range) => range.clone(),
        }
    }
}

impl From<Key> for KeyQuery {
    fn from(key: Key) -> Self {
        KeyQuery::Key(key)
    }
}

impl From<KeyRange> for KeyQuery {
    fn from(range: KeyRange) -> Self {
        KeyQuery::Range(range)
    }
}
