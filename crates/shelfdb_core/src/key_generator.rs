//! Auto-increment key generator.

use crate::error::{CoreError, CoreResult};

/// Largest key a generator will issue (2^53).
pub const MAX_GENERATED_KEY: u64 = 1 << 53;

/// Per-object-store monotonic counter for auto-increment keys.
///
/// `current` is the last key issued, so a fresh generator hands out `1`
/// first. Explicitly stored numeric keys raise the counter through
/// [`KeyGenerator::set_if_larger`] so generated keys never collide with
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyGenerator {
    current: u64,
}

impl KeyGenerator {
    /// Creates a generator that will issue `1` next.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: 0 }
    }

    /// Creates a generator whose last issued key was `current`.
    #[must_use]
    pub const fn with_current(current: u64) -> Self {
        Self { current }
    }

    /// Returns the last issued key, or `0` if none.
    #[must_use]
    pub const fn current(&self) -> u64 {
        self.current
    }

    /// Issues the next key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Constraint`] once the counter reaches 2^53.
    pub fn next(&mut self) -> CoreResult<u64> {
        if self.current >= MAX_GENERATED_KEY {
            return Err(CoreError::constraint("key generator exhausted"));
        }
        self.current += 1;
        Ok(self.current)
    }

    /// Raises the counter to `floor(n)` if that is larger.
    ///
    /// Returns true if the counter changed.
    pub fn set_if_larger(&mut self, n: f64) -> bool {
        if n.is_nan() {
            return false;
        }
        let floored = n.floor();
        if floored <= self.current as f64 {
            return false;
        }
        self.current = if floored >= MAX_GENERATED_KEY as f64 {
            MAX_GENERATED_KEY
        } else {
            floored as u64
        };
        true
    }

    /// Restores a previously observed counter.
    pub fn restore(&mut self, current: u64) {
        self.current = current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_key_is_one() {
        let mut generator = KeyGenerator::new();
        assert_eq!(generator.next().unwrap(), 1);
        assert_eq!(generator.next().unwrap(), 2);
        assert_eq!(generator.current(), 2);
    }

    #[test]
    fn set_if_larger_floors_and_raises() {
        let mut generator = KeyGenerator::new();
        assert!(generator.set_if_larger(10.7));
        assert_eq!(generator.next().unwrap(), 11);

        assert!(!generator.set_if_larger(5.0));
        assert!(!generator.set_if_larger(-3.0));
        assert!(!generator.set_if_larger(f64::NAN));
        assert_eq!(generator.next().unwrap(), 12);
    }

    #[test]
    fn exhaustion_is_constraint_error() {
        let mut generator = KeyGenerator::with_current(MAX_GENERATED_KEY - 1);
        assert_eq!(generator.next().unwrap(), MAX_GENERATED_KEY);
        let err = generator.next().unwrap_err();
        assert_eq!(err.name(), "ConstraintError");
    }

    #[test]
    fn huge_explicit_key_exhausts_generator() {
        let mut generator = KeyGenerator::new();
        assert!(generator.set_if_larger(f64::INFINITY));
        assert!(generator.next().is_err());
    }

    #[test]
    fn restore_rewinds() {
        let mut generator = KeyGenerator::new();
        generator.next().unwrap();
        generator.next().unwrap();
        generator.restore(1);
        assert_eq!(generator.next().unwrap(), 2);
    }
}
