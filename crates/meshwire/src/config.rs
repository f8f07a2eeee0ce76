use std::time::Duration;

use meshwire_directory::DirectoryConfig;

/// Tunables for a [`MessagingService`](crate::MessagingService).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Cadence of descriptor announcements on the system channel.
    ///
    /// Each beat is jittered by up to ±20% so a fleet restarted at once
    /// doesn't heartbeat in lockstep.
    pub heartbeat_interval: Duration,

    /// Cadence of the pending-call reaper scan.
    ///
    /// Bounds how late after its deadline a request can time out; an
    /// idle registry costs nothing beyond the scan.
    pub reaper_interval: Duration,

    /// Directory freshness tunables.
    pub directory: DirectoryConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            reaper_interval: Duration::from_millis(250),
            directory: DirectoryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.reaper_interval, Duration::from_millis(250));
        // Three missed heartbeats before a peer drops out of the
        // online set.
        assert!(
            config.directory.staleness_window
                >= config.heartbeat_interval * 3
        );
    }
}
