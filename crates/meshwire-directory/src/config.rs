use std::time::Duration;

/// Tunables for directory freshness.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// How old a descriptor may be and still count as online.
    ///
    /// A node that misses heartbeats for longer than this drops out of
    /// `online()` queries even though its entry is still cached.
    pub staleness_window: Duration,

    /// How old a descriptor may be before it is removed entirely by
    /// [`prune`](crate::ServerDirectory::prune).
    pub remove_after: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            // Three missed 5s heartbeats.
            staleness_window: Duration::from_secs(15),
            remove_after: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_keep_staleness_below_removal() {
        let config = DirectoryConfig::default();
        assert!(config.staleness_window < config.remove_after);
    }
}
