//! Cluster directory for Meshwire.
//!
//! Maintains the cached view of every known server process and its live
//! attributes. The directory is **eventually consistent**: it is fed
//! opportunistically by heartbeat/announcement traffic on the reserved
//! system channel and can be forced fresh with
//! [`ServerDirectory::refresh`]. Consumers needing strong freshness call
//! `refresh` and await it before querying.
//!
//! The directory is explicitly owned and injected — it is created by the
//! messaging service at start, refreshed by its maintenance tasks, and
//! torn down with it. There is no global/singleton instance.

mod config;
mod descriptor;
mod directory;

pub use config::DirectoryConfig;
pub use descriptor::{HealthMetrics, ServerDescriptor};
pub use directory::ServerDirectory;
