//! The directory proper: a concurrent descriptor cache with staleness
//! and load-aware selection.

use dashmap::DashMap;
use meshwire_protocol::{ServerId, now_millis};
use meshwire_transport::{ChannelTransport, TransportError};

use crate::{DirectoryConfig, ServerDescriptor};

/// The cached view of cluster node descriptors and their live
/// attributes.
///
/// Backed by a `DashMap`, so heartbeat upserts, queries, and refreshes
/// never serialize against each other — updates are atomic per entry.
pub struct ServerDirectory {
    local_id: ServerId,
    entries: DashMap<ServerId, ServerDescriptor>,
    config: DirectoryConfig,
}

impl ServerDirectory {
    /// Creates an empty directory for the process running as `local_id`.
    pub fn new(local_id: ServerId, config: DirectoryConfig) -> Self {
        Self {
            local_id,
            entries: DashMap::new(),
            config,
        }
    }

    /// The id this directory considers local.
    pub fn local_id(&self) -> &ServerId {
        &self.local_id
    }

    // -----------------------------------------------------------------
    // Updates
    // -----------------------------------------------------------------

    /// Upserts a descriptor from heartbeat/announcement traffic.
    ///
    /// `is_local` is recomputed here rather than trusted from the wire —
    /// every node announces itself as local from its own point of view.
    pub fn apply_heartbeat(&self, mut descriptor: ServerDescriptor) {
        descriptor.is_local = descriptor.id == self.local_id;
        descriptor.last_updated = now_millis();
        tracing::trace!(server = %descriptor.id, "directory heartbeat");
        self.entries.insert(descriptor.id.clone(), descriptor);
    }

    /// Removes a server on an explicit departure announcement.
    pub fn mark_departed(&self, id: &ServerId) {
        if self.entries.remove(id).is_some() {
            tracing::debug!(server = %id, "server departed");
        }
    }

    /// Drops entries whose last update is older than
    /// [`DirectoryConfig::remove_after`]. The local entry is never
    /// pruned.
    pub fn prune(&self) -> usize {
        let now = now_millis();
        let cutoff = self.config.remove_after.as_millis() as u64;
        let before = self.entries.len();
        self.entries.retain(|id, d| {
            *id == self.local_id || d.is_fresh(now, cutoff)
        });
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, "pruned stale directory entries");
        }
        removed
    }

    /// Forces a transport round-trip to repopulate the cache.
    ///
    /// Every reachable server id is upserted with its live player count;
    /// cached servers the substrate no longer knows are marked offline
    /// (they stay cached until [`prune`](Self::prune) drops them).
    pub async fn refresh<T: ChannelTransport>(
        &self,
        transport: &T,
    ) -> Result<(), TransportError> {
        let reachable = transport.server_ids().await?;

        for id in &reachable {
            let count = transport.player_count(id).await? as u32;
            let mut entry = self
                .entries
                .entry(id.clone())
                .or_insert_with(|| ServerDescriptor::new(id.clone()));
            entry.player_count = count;
            entry.online = true;
            entry.is_local = *id == self.local_id;
            entry.last_updated = now_millis();
        }

        for mut entry in self.entries.iter_mut() {
            if !reachable.contains(entry.key()) {
                entry.value_mut().online = false;
            }
        }

        tracing::debug!(servers = reachable.len(), "directory refreshed");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Every cached descriptor, fresh or not.
    pub fn all(&self) -> Vec<ServerDescriptor> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    /// Descriptors that report online AND are within the staleness
    /// window.
    pub fn online(&self) -> Vec<ServerDescriptor> {
        let now = now_millis();
        let window = self.config.staleness_window.as_millis() as u64;
        self.entries
            .iter()
            .filter(|e| e.online && e.is_fresh(now, window))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Looks up one descriptor by id.
    pub fn by_id(&self, id: &ServerId) -> Option<ServerDescriptor> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    /// Whether `id` is in the online set.
    pub fn is_online(&self, id: &ServerId) -> bool {
        let now = now_millis();
        let window = self.config.staleness_window.as_millis() as u64;
        self.entries
            .get(id)
            .map(|e| e.online && e.is_fresh(now, window))
            .unwrap_or(false)
    }

    /// Online descriptors in the given deployment group.
    pub fn find_by_group(&self, group: &str) -> Vec<ServerDescriptor> {
        self.find(|d| d.group == group)
    }

    /// Online descriptors carrying the given tag.
    pub fn find_by_tag(&self, tag: &str) -> Vec<ServerDescriptor> {
        self.find(|d| d.tags.iter().any(|t| t == tag))
    }

    /// Online descriptors matching an arbitrary predicate.
    pub fn find(
        &self,
        predicate: impl Fn(&ServerDescriptor) -> bool,
    ) -> Vec<ServerDescriptor> {
        self.online().into_iter().filter(|d| predicate(d)).collect()
    }

    /// The online server with spare capacity and the fewest players,
    /// optionally restricted to a group.
    ///
    /// Deterministic: ties on `player_count` go to the
    /// lexicographically smallest id, so repeated calls over the same
    /// set always pick the same node.
    pub fn least_crowded(&self, group: Option<&str>) -> Option<ServerDescriptor> {
        self.online()
            .into_iter()
            .filter(|d| group.is_none_or(|g| d.group == g))
            .filter(|d| d.has_capacity())
            .min_by(|a, b| {
                a.player_count
                    .cmp(&b.player_count)
                    .then_with(|| a.id.cmp(&b.id))
            })
    }

    // -----------------------------------------------------------------
    // Aggregates
    // -----------------------------------------------------------------

    /// Number of cached servers.
    pub fn server_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of servers in the online set.
    pub fn online_count(&self) -> usize {
        self.online().len()
    }

    /// Total players across the online set.
    pub fn total_players(&self) -> u32 {
        self.online().iter().map(|d| d.player_count).sum()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> ServerDirectory {
        ServerDirectory::new("local".into(), DirectoryConfig::default())
    }

    fn descriptor(id: &str, group: &str, players: u32) -> ServerDescriptor {
        let mut d = ServerDescriptor::new(id.into()).with_group(group);
        d.player_count = players;
        d
    }

    #[test]
    fn test_heartbeat_upserts_and_recomputes_is_local() {
        let dir = directory();

        let mut remote = descriptor("lobby-1", "lobby", 3);
        // Every node announces itself as local; the receiver must not
        // believe it.
        remote.is_local = true;
        dir.apply_heartbeat(remote);

        let cached = dir.by_id(&"lobby-1".into()).unwrap();
        assert!(!cached.is_local);
        assert_eq!(cached.player_count, 3);

        dir.apply_heartbeat(descriptor("local", "lobby", 0));
        assert!(dir.by_id(&"local".into()).unwrap().is_local);
    }

    #[test]
    fn test_online_excludes_stale_entries() {
        let dir = directory();
        dir.apply_heartbeat(descriptor("fresh", "lobby", 0));
        dir.apply_heartbeat(descriptor("stale", "lobby", 0));

        // Age the second entry past the staleness window.
        dir.entries.get_mut(&"stale".into()).unwrap().last_updated = 0;

        let online: Vec<_> =
            dir.online().into_iter().map(|d| d.id.0).collect();
        assert_eq!(online, vec!["fresh".to_string()]);
        assert!(dir.is_online(&"fresh".into()));
        assert!(!dir.is_online(&"stale".into()));
        // Still cached, just not online.
        assert_eq!(dir.server_count(), 2);
    }

    #[test]
    fn test_mark_departed_removes_entry() {
        let dir = directory();
        dir.apply_heartbeat(descriptor("a", "lobby", 0));
        dir.mark_departed(&"a".into());
        assert!(dir.by_id(&"a".into()).is_none());
    }

    #[test]
    fn test_prune_drops_long_stale_but_never_local() {
        let dir = directory();
        dir.apply_heartbeat(descriptor("local", "lobby", 0));
        dir.apply_heartbeat(descriptor("dead", "lobby", 0));
        dir.entries.get_mut(&"local".into()).unwrap().last_updated = 0;
        dir.entries.get_mut(&"dead".into()).unwrap().last_updated = 0;

        assert_eq!(dir.prune(), 1);
        assert!(dir.by_id(&"local".into()).is_some());
        assert!(dir.by_id(&"dead".into()).is_none());
    }

    #[test]
    fn test_least_crowded_picks_fewest_players() {
        let dir = directory();
        dir.apply_heartbeat(descriptor("a", "lobby", 5));
        dir.apply_heartbeat(descriptor("b", "lobby", 2));
        dir.apply_heartbeat(descriptor("c", "minigames", 0));

        let pick = dir.least_crowded(Some("lobby")).unwrap();
        assert_eq!(pick.id, ServerId::from("b"));

        // No group restriction: the empty minigames node wins.
        let pick = dir.least_crowded(None).unwrap();
        assert_eq!(pick.id, ServerId::from("c"));
    }

    #[test]
    fn test_least_crowded_tie_breaks_on_smallest_id() {
        let dir = directory();
        dir.apply_heartbeat(descriptor("lobby-2", "lobby", 4));
        dir.apply_heartbeat(descriptor("lobby-1", "lobby", 4));
        dir.apply_heartbeat(descriptor("lobby-3", "lobby", 4));

        // Deterministic across repeated calls with the same input set.
        for _ in 0..10 {
            let pick = dir.least_crowded(Some("lobby")).unwrap();
            assert_eq!(pick.id, ServerId::from("lobby-1"));
        }
    }

    #[test]
    fn test_least_crowded_skips_full_servers() {
        let dir = directory();
        let mut full = descriptor("a", "lobby", 10);
        full.max_players = 10;
        dir.apply_heartbeat(full);
        let mut open = descriptor("b", "lobby", 50);
        open.max_players = 100;
        dir.apply_heartbeat(open);

        let pick = dir.least_crowded(Some("lobby")).unwrap();
        assert_eq!(pick.id, ServerId::from("b"));
    }

    #[test]
    fn test_least_crowded_empty_group_is_none() {
        let dir = directory();
        dir.apply_heartbeat(descriptor("a", "lobby", 0));
        assert!(dir.least_crowded(Some("nope")).is_none());
    }

    #[test]
    fn test_find_by_group_tag_and_predicate() {
        let dir = directory();
        dir.apply_heartbeat(
            descriptor("a", "lobby", 1).with_tag("eu"),
        );
        dir.apply_heartbeat(
            descriptor("b", "minigames", 9).with_tag("eu"),
        );

        assert_eq!(dir.find_by_group("lobby").len(), 1);
        assert_eq!(dir.find_by_tag("eu").len(), 2);
        assert_eq!(dir.find(|d| d.player_count > 5).len(), 1);
    }

    #[test]
    fn test_aggregates() {
        let dir = directory();
        dir.apply_heartbeat(descriptor("a", "lobby", 3));
        dir.apply_heartbeat(descriptor("b", "lobby", 7));

        assert_eq!(dir.server_count(), 2);
        assert_eq!(dir.online_count(), 2);
        assert_eq!(dir.total_players(), 10);
    }
}
