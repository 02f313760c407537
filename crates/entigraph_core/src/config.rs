//! Store configuration.

use std::time::Duration;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether every copied object is checked against its type's constraints.
    pub validate_copies: bool,

    /// How long an operation waits for the store lock (`None` = forever).
    pub lock_timeout: Option<Duration>,

    /// Number of idle copy buffers kept for reuse.
    pub buffer_pool_capacity: usize,

    /// Collection size above which id lookups without an index scan in parallel.
    pub parallel_scan_threshold: usize,

    /// Whether the persister syncs to disk after every batch.
    pub sync_on_persist: bool,

    /// Whether a missing log file is created on open.
    pub create_if_missing: bool,

    /// Whether unreachable objects are swept after every delete.
    pub collect_garbage_on_delete: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            validate_copies: true,
            lock_timeout: None,
            buffer_pool_capacity: 16,
            parallel_scan_threshold: 4096,
            sync_on_persist: true,
            create_if_missing: true,
            collect_garbage_on_delete: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether copies are validated.
    #[must_use]
    pub const fn validate_copies(mut self, value: bool) -> Self {
        self.validate_copies = value;
        self
    }

    /// Sets the lock wait limit.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets how many idle copy buffers are kept.
    #[must_use]
    pub const fn buffer_pool_capacity(mut self, capacity: usize) -> Self {
        self.buffer_pool_capacity = capacity;
        self
    }

    /// Sets the parallel scan threshold.
    #[must_use]
    pub const fn parallel_scan_threshold(mut self, threshold: usize) -> Self {
        self.parallel_scan_threshold = threshold;
        self
    }

    /// Sets whether the persister syncs after every batch.
    #[must_use]
    pub const fn sync_on_persist(mut self, value: bool) -> Self {
        self.sync_on_persist = value;
        self
    }

    /// Sets whether a missing log file is created.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether deletes sweep unreachable objects.
    #[must_use]
    pub const fn collect_garbage_on_delete(mut self, value: bool) -> Self {
        self.collect_garbage_on_delete = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.validate_copies);
        assert!(config.lock_timeout.is_none());
        assert!(config.sync_on_persist);
        assert!(!config.collect_garbage_on_delete);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .validate_copies(false)
            .lock_timeout(Some(Duration::from_millis(50)))
            .parallel_scan_threshold(8);

        assert!(!config.validate_copies);
        assert_eq!(config.lock_timeout, Some(Duration::from_millis(50)));
        assert_eq!(config.parallel_scan_threshold, 8);
    }
}
