//! Store configuration.

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Entries fetched per round trip when enumerating a prefix.
    pub batch_size: usize,

    /// Whether to sync the commit log on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Upper bound on slots the monotonic keyer probes per append.
    pub max_probes: usize,

    /// Whether commits drop row versions no open snapshot can see.
    pub prune_versions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 256,
            sync_on_commit: true,
            max_probes: 10_000,
            prune_versions: true,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the enumeration batch size.
    #[must_use]
    pub const fn batch_size(mut self, value: usize) -> Self {
        self.batch_size = value;
        self
    }

    /// Sets whether to sync the commit log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the monotonic keyer's probe budget.
    #[must_use]
    pub const fn max_probes(mut self, value: usize) -> Self {
        self.max_probes = value;
        self
    }

    /// Sets whether commits prune invisible versions.
    #[must_use]
    pub const fn prune_versions(mut self, value: bool) -> Self {
        self.prune_versions = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.batch_size, 256);
        assert!(config.sync_on_commit);
        assert_eq!(config.max_probes, 10_000);
        assert!(config.prune_versions);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .batch_size(8)
            .sync_on_commit(false)
            .max_probes(3);

        assert_eq!(config.batch_size, 8);
        assert!(!config.sync_on_commit);
        assert_eq!(config.max_probes, 3);
    }
}
