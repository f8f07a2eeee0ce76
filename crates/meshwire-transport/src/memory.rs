//! In-process transport backend: a shared hub routing frames between
//! `MemoryTransport` instances by server id.
//!
//! This is the reference adapter behind [`ChannelTransport`]: every
//! transport attached to the same [`MemoryHub`] behaves like a node on a
//! shared broker. Tests and demos run whole multi-node topologies in one
//! process with it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use meshwire_protocol::{ChannelName, ServerId, SessionId};
use tokio::sync::mpsc;

use crate::{ChannelTransport, InboundFrame, TransportError};

/// Frames buffered per subscription before the hub starts dropping.
const SUBSCRIPTION_BUFFER: usize = 256;

/// One attached server: its open subscriptions, keyed by channel.
#[derive(Default)]
struct Member {
    subscriptions: DashMap<ChannelName, mpsc::Sender<InboundFrame>>,
}

impl Member {
    /// Pushes a frame into this member's subscription on `channel`.
    ///
    /// Lossy on backpressure: a full or closed buffer drops the frame,
    /// matching pub/sub semantics — the substrate gives no delivery
    /// guarantee, the core's request timeouts cover the gap.
    fn deliver(&self, server: &ServerId, channel: &ChannelName, bytes: &[u8]) {
        let Some(tx) = self.subscriptions.get(channel) else {
            return;
        };
        let frame = InboundFrame {
            channel: channel.clone(),
            bytes: bytes.to_vec(),
        };
        if let Err(e) = tx.try_send(frame) {
            tracing::warn!(%server, %channel, error = %e, "dropping frame");
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryHub
// ---------------------------------------------------------------------------

/// The shared routing fabric for [`MemoryTransport`] instances.
///
/// Owns the member table and the session locator. Cheap to clone via
/// `Arc`; hand the same hub to every transport that should see the same
/// "cluster".
#[derive(Default)]
pub struct MemoryHub {
    members: DashMap<ServerId, Arc<Member>>,
    players: DashMap<SessionId, ServerId>,
}

impl MemoryHub {
    /// Creates an empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records `session` as hosted by `server`.
    ///
    /// In a real deployment the proxy layer maintains this table; tests
    /// and demos populate it directly.
    pub fn place_player(&self, session: SessionId, server: ServerId) {
        self.players.insert(session, server);
    }

    /// Drops a session from the locator (logout or migration away).
    pub fn remove_player(&self, session: SessionId) {
        self.players.remove(&session);
    }

    fn attach(&self, server: &ServerId) -> Result<(), TransportError> {
        use dashmap::mapref::entry::Entry;

        match self.members.entry(server.clone()) {
            Entry::Occupied(_) => {
                Err(TransportError::AlreadyConnected(server.clone()))
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Member::default()));
                Ok(())
            }
        }
    }

    fn detach(&self, server: &ServerId) {
        self.members.remove(server);
    }

    fn member(&self, server: &ServerId) -> Option<Arc<Member>> {
        self.members.get(server).map(|m| Arc::clone(&m))
    }
}

// ---------------------------------------------------------------------------
// MemoryTransport
// ---------------------------------------------------------------------------

/// An in-process [`ChannelTransport`] attached to a [`MemoryHub`].
pub struct MemoryTransport {
    hub: Arc<MemoryHub>,
    local: ServerId,
    connected: AtomicBool,
}

impl MemoryTransport {
    /// Creates a transport for `local` on the given hub.
    ///
    /// The transport starts disconnected; call
    /// [`connect`](ChannelTransport::connect) before sending.
    pub fn new(hub: Arc<MemoryHub>, local: ServerId) -> Self {
        Self {
            hub,
            local,
            connected: AtomicBool::new(false),
        }
    }

    /// The server id this transport attaches as.
    pub fn local_id(&self) -> &ServerId {
        &self.local
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

impl ChannelTransport for MemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        self.hub.attach(&self.local)?;
        self.connected.store(true, Ordering::Release);
        tracing::debug!(server = %self.local, "attached to memory hub");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.hub.detach(&self.local);
            tracing::debug!(server = %self.local, "detached from memory hub");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn register_channel(&self, _channel: &ChannelName) -> Result<(), TransportError> {
        // The hub routes purely on live subscriptions; registration is
        // meaningful for broker backends only.
        self.ensure_connected()
    }

    async fn unregister_channel(&self, channel: &ChannelName) -> Result<(), TransportError> {
        self.ensure_connected()?;
        if let Some(member) = self.hub.member(&self.local) {
            member.subscriptions.remove(channel);
        }
        Ok(())
    }

    async fn broadcast(&self, channel: &ChannelName, bytes: &[u8]) -> Result<(), TransportError> {
        self.ensure_connected()?;
        for entry in self.hub.members.iter() {
            entry.value().deliver(entry.key(), channel, bytes);
        }
        Ok(())
    }

    async fn send_to(
        &self,
        channel: &ChannelName,
        server: &ServerId,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        self.ensure_connected()?;
        if let Some(member) = self.hub.member(server) {
            member.deliver(server, channel, bytes);
        }
        Ok(())
    }

    async fn send_to_player(
        &self,
        channel: &ChannelName,
        session: SessionId,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        self.ensure_connected()?;
        let Some(server) = self.find_player_server(session).await? else {
            return Ok(());
        };
        self.send_to(channel, &server, bytes).await
    }

    async fn subscribe(
        &self,
        channel: &ChannelName,
    ) -> Result<mpsc::Receiver<InboundFrame>, TransportError> {
        self.ensure_connected()?;
        let member = self
            .hub
            .member(&self.local)
            .ok_or(TransportError::NotConnected)?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        member.subscriptions.insert(channel.clone(), tx);
        Ok(rx)
    }

    async fn server_ids(&self) -> Result<Vec<ServerId>, TransportError> {
        self.ensure_connected()?;
        Ok(self.hub.members.iter().map(|e| e.key().clone()).collect())
    }

    async fn find_player_server(
        &self,
        session: SessionId,
    ) -> Result<Option<ServerId>, TransportError> {
        self.ensure_connected()?;
        let located = self
            .hub
            .players
            .get(&session)
            .map(|entry| entry.value().clone())
            // A mapping to a departed server is as good as no mapping.
            .filter(|server| self.hub.members.contains_key(server));
        Ok(located)
    }

    async fn player_count(&self, server: &ServerId) -> Result<usize, TransportError> {
        self.ensure_connected()?;
        Ok(self
            .hub
            .players
            .iter()
            .filter(|entry| entry.value() == server)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> ChannelName {
        ChannelName::from("test")
    }

    #[tokio::test]
    async fn test_ops_fail_fast_when_disconnected() {
        let hub = MemoryHub::new();
        let t = MemoryTransport::new(hub, "a".into());

        assert!(!t.is_connected());
        assert!(matches!(
            t.broadcast(&channel(), b"x").await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            t.send_to(&channel(), &"b".into(), b"x").await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            t.subscribe(&channel()).await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            t.server_ids().await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_server_id_is_rejected() {
        let hub = MemoryHub::new();
        let a1 = MemoryTransport::new(Arc::clone(&hub), "a".into());
        let a2 = MemoryTransport::new(hub, "a".into());

        a1.connect().await.unwrap();
        assert!(matches!(
            a2.connect().await,
            Err(TransportError::AlreadyConnected(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_removes_from_server_ids() {
        let hub = MemoryHub::new();
        let a = MemoryTransport::new(Arc::clone(&hub), "a".into());
        let b = MemoryTransport::new(hub, "b".into());
        a.connect().await.unwrap();
        b.connect().await.unwrap();

        b.disconnect().await.unwrap();
        assert_eq!(a.server_ids().await.unwrap(), vec![ServerId::from("a")]);
    }
}
