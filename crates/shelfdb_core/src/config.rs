//! Engine configuration.

/// Configuration for a [`crate::Factory`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to buffer host writes in memory until [`crate::Factory::flush`].
    pub write_cache: bool,

    /// Whether to check the ascending-key invariant after every record
    /// store mutation.
    pub verify_ordering: bool,

    /// Upper bound on the ticks run by [`crate::Factory::run_until_idle`].
    ///
    /// `None` runs until the task queue drains.
    pub max_ticks: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            write_cache: false,
            verify_ordering: cfg!(debug_assertions),
            max_ticks: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether host writes are buffered.
    #[must_use]
    pub const fn write_cache(mut self, value: bool) -> Self {
        self.write_cache = value;
        self
    }

    /// Sets whether record store ordering is verified on every mutation.
    #[must_use]
    pub const fn verify_ordering(mut self, value: bool) -> Self {
        self.verify_ordering = value;
        self
    }

    /// Sets the tick limit for [`crate::Factory::run_until_idle`].
    #[must_use]
    pub const fn max_ticks(mut self, value: Option<usize>) -> Self {
        self.max_ticks = value;
        self
    }
}
