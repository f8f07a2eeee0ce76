//! Three-node demo over the in-process hub: targeted ping/pong, a
//! fan-out census, and picking the least crowded game server.
//!
//! Run with `cargo run -p cluster-ping`; set `RUST_LOG=debug` to watch
//! the heartbeat and dispatch internals.

use std::sync::Arc;
use std::time::Duration;

use meshwire::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct Ping {
    seq: u32,
}

impl Message for Ping {
    const TYPE_TAG: &'static str = "demo.ping";
}

#[derive(Debug, Serialize, Deserialize)]
struct Pong {
    seq: u32,
    from: String,
}

impl Message for Pong {
    const TYPE_TAG: &'static str = "demo.pong";
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusQuery;

impl Message for StatusQuery {
    const TYPE_TAG: &'static str = "demo.status-query";
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusReport {
    server: String,
    players: u32,
}

impl Message for StatusReport {
    const TYPE_TAG: &'static str = "demo.status-report";
}

async fn start_node(
    hub: &Arc<MemoryHub>,
    id: &str,
    group: &str,
) -> Result<MessagingService<MemoryTransport, JsonCodec>, MeshwireError> {
    let transport = Arc::new(MemoryTransport::new(Arc::clone(hub), id.into()));
    let descriptor = ServerDescriptor::new(id.into()).with_group(group);
    let config = ServiceConfig {
        heartbeat_interval: Duration::from_millis(200),
        ..ServiceConfig::default()
    };
    MessagingService::start(transport, JsonCodec, descriptor, config).await
}

#[tokio::main]
async fn main() -> Result<(), MeshwireError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let hub = MemoryHub::new();
    let lobby = start_node(&hub, "lobby-1", "lobby").await?;
    let game_1 = start_node(&hub, "game-1", "game").await?;
    let game_2 = start_node(&hub, "game-2", "game").await?;

    let rpc = ChannelName::from("demo.rpc");
    let census = ChannelName::from("demo.census");

    for node in [&game_1, &game_2] {
        let name = node.local_id().to_string();
        node.register_handler(&rpc, move |ping: Ping, meta: MessageMeta| {
            let name = name.clone();
            async move {
                info!(seq = ping.seq, from = %meta.source, "ping received");
                Ok(Some(Pong {
                    seq: ping.seq,
                    from: name,
                }))
            }
        })
        .await?;

        let name = node.local_id().to_string();
        node.register_handler(&census, move |_q: StatusQuery, _meta: MessageMeta| {
            let name = name.clone();
            async move {
                Ok(Some(StatusReport {
                    server: name,
                    players: 0,
                }))
            }
        })
        .await?;
    }

    // Let a couple of heartbeat rounds populate every directory.
    tokio::time::sleep(Duration::from_millis(600)).await;

    // Targeted request/response.
    let pong: Pong = lobby
        .request(&rpc, &"game-1".into(), &Ping { seq: 1 }, Duration::from_secs(2))
        .await?
        .response()
        .await?;
    info!(seq = pong.seq, from = %pong.from, "pong received");

    // Fan-out census across the cluster.
    let reports: Vec<StatusReport> = lobby
        .request_all(&census, &StatusQuery, Duration::from_millis(500))
        .await?
        .responses()
        .await?;
    for report in &reports {
        info!(server = %report.server, players = report.players, "census reply");
    }

    // Load-aware selection within the game group.
    if let Some(pick) = lobby.directory().least_crowded(Some("game")) {
        info!(server = %pick.id, players = pick.player_count, "least crowded game server");
    }

    game_1.shutdown().await?;
    game_2.shutdown().await?;
    lobby.shutdown().await?;
    Ok(())
}
