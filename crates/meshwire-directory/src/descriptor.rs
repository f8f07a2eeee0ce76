//! Server descriptors: the per-node snapshot carried by heartbeats and
//! cached by the directory.

use std::collections::HashMap;

use meshwire_protocol::{ServerId, now_millis};
use serde::{Deserialize, Serialize};

/// Live health figures reported with each heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    /// Seconds since the reporting process started.
    pub uptime_secs: u64,
    /// Normalized load figure, 0.0 = idle.
    pub load: f32,
    /// Observed round-trip latency to the substrate, if measured.
    pub latency_ms: u32,
}

/// Everything the cluster knows about one server process.
///
/// Created and refreshed from heartbeat/announcement traffic or from an
/// explicit directory refresh; `last_updated` drives staleness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Cluster-unique id, e.g. `"lobby-2"`.
    pub id: ServerId,
    /// Human-readable name for dashboards and logs.
    pub display_name: String,
    /// Reachable address, when the deployment exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Whether this descriptor describes the local process.
    ///
    /// Never trusted from the wire — the receiving directory recomputes
    /// it against its own id.
    #[serde(default)]
    pub is_local: bool,
    /// Whether the node reports itself as serving traffic.
    pub online: bool,
    /// Sessions currently hosted.
    pub player_count: u32,
    /// Host capacity.
    pub max_players: u32,
    /// Deployment group, e.g. `"lobby"` or `"minigames"`.
    pub group: String,
    /// Free-form classification tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form operator metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Epoch millis of the last update to this entry.
    pub last_updated: u64,
    /// Live health figures.
    #[serde(default)]
    pub health: HealthMetrics,
}

impl ServerDescriptor {
    /// Creates a minimal online descriptor for `id`.
    pub fn new(id: ServerId) -> Self {
        Self {
            display_name: id.0.clone(),
            id,
            address: None,
            is_local: false,
            online: true,
            player_count: 0,
            max_players: 0,
            group: String::new(),
            tags: Vec::new(),
            metadata: HashMap::new(),
            last_updated: now_millis(),
            health: HealthMetrics::default(),
        }
    }

    /// Sets the deployment group.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Sets the host capacity.
    pub fn with_max_players(mut self, max: u32) -> Self {
        self.max_players = max;
        self
    }

    /// Adds a classification tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Whether `last_updated` is within `window_ms` of `now`.
    pub fn is_fresh(&self, now: u64, window_ms: u64) -> bool {
        now.saturating_sub(self.last_updated) <= window_ms
    }

    /// Whether the node can take more sessions (zero `max_players`
    /// means unbounded).
    pub fn has_capacity(&self) -> bool {
        self.max_players == 0 || self.player_count < self.max_players
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_descriptor_is_online_and_fresh() {
        let d = ServerDescriptor::new("lobby-1".into());
        assert!(d.online);
        assert_eq!(d.display_name, "lobby-1");
        assert!(d.is_fresh(now_millis(), 1_000));
    }

    #[test]
    fn test_staleness_boundary() {
        let mut d = ServerDescriptor::new("a".into());
        d.last_updated = 10_000;
        assert!(d.is_fresh(15_000, 5_000));
        assert!(!d.is_fresh(15_001, 5_000));
    }

    #[test]
    fn test_capacity() {
        let mut d = ServerDescriptor::new("a".into()).with_max_players(2);
        assert!(d.has_capacity());
        d.player_count = 2;
        assert!(!d.has_capacity());

        // Zero max means "no declared cap".
        let unbounded = ServerDescriptor::new("b".into());
        assert!(unbounded.has_capacity());
    }

    #[test]
    fn test_wire_round_trip() {
        let d = ServerDescriptor::new("game-3".into())
            .with_group("minigames")
            .with_max_players(64)
            .with_tag("pvp");
        let json = serde_json::to_string(&d).unwrap();
        let back: ServerDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }

    #[test]
    fn test_optional_fields_default_on_decode() {
        // Older nodes may omit tags/metadata/health entirely.
        let json = r#"{
            "id": "lobby-1",
            "display_name": "Lobby One",
            "online": true,
            "player_count": 3,
            "max_players": 100,
            "group": "lobby",
            "last_updated": 123
        }"#;
        let d: ServerDescriptor = serde_json::from_str(json).unwrap();
        assert!(d.tags.is_empty());
        assert!(d.metadata.is_empty());
        assert_eq!(d.health, HealthMetrics::default());
        assert!(!d.is_local);
    }
}
