//! Directory refresh against a live (in-process) transport.

use std::sync::Arc;

use meshwire_directory::{DirectoryConfig, ServerDescriptor, ServerDirectory};
use meshwire_protocol::SessionId;
use meshwire_transport::{ChannelTransport, MemoryHub, MemoryTransport};

async fn connected(hub: &Arc<MemoryHub>, id: &str) -> MemoryTransport {
    let t = MemoryTransport::new(Arc::clone(hub), id.into());
    t.connect().await.expect("connect should succeed");
    t
}

#[tokio::test]
async fn test_refresh_discovers_reachable_servers() {
    let hub = MemoryHub::new();
    let local = connected(&hub, "lobby-1").await;
    let _peer = connected(&hub, "lobby-2").await;

    hub.place_player(SessionId::new(), "lobby-2".into());
    hub.place_player(SessionId::new(), "lobby-2".into());

    let dir = ServerDirectory::new("lobby-1".into(), DirectoryConfig::default());
    dir.refresh(&local).await.expect("refresh should succeed");

    assert_eq!(dir.server_count(), 2);
    let peer = dir.by_id(&"lobby-2".into()).unwrap();
    assert_eq!(peer.player_count, 2);
    assert!(peer.online);
    assert!(!peer.is_local);
    assert!(dir.by_id(&"lobby-1".into()).unwrap().is_local);
}

#[tokio::test]
async fn test_refresh_marks_departed_servers_offline() {
    let hub = MemoryHub::new();
    let local = connected(&hub, "lobby-1").await;
    let peer = connected(&hub, "lobby-2").await;

    let dir = ServerDirectory::new("lobby-1".into(), DirectoryConfig::default());
    dir.refresh(&local).await.unwrap();
    assert!(dir.is_online(&"lobby-2".into()));

    peer.disconnect().await.unwrap();
    dir.refresh(&local).await.unwrap();

    // Still cached, no longer online.
    assert!(dir.by_id(&"lobby-2".into()).is_some());
    assert!(!dir.is_online(&"lobby-2".into()));
}

#[tokio::test]
async fn test_refresh_preserves_heartbeat_metadata() {
    let hub = MemoryHub::new();
    let local = connected(&hub, "lobby-1").await;
    let _peer = connected(&hub, "game-1").await;

    let dir = ServerDirectory::new("lobby-1".into(), DirectoryConfig::default());
    dir.apply_heartbeat(
        ServerDescriptor::new("game-1".into())
            .with_group("minigames")
            .with_max_players(64),
    );

    dir.refresh(&local).await.unwrap();

    // Refresh updates liveness figures without wiping what the richer
    // heartbeat announced.
    let peer = dir.by_id(&"game-1".into()).unwrap();
    assert_eq!(peer.group, "minigames");
    assert_eq!(peer.max_players, 64);
}

#[tokio::test]
async fn test_refresh_fails_when_disconnected() {
    let hub = MemoryHub::new();
    let local = MemoryTransport::new(hub, "lobby-1".into());

    let dir = ServerDirectory::new("lobby-1".into(), DirectoryConfig::default());
    assert!(dir.refresh(&local).await.is_err());
    assert_eq!(dir.server_count(), 0);
}
