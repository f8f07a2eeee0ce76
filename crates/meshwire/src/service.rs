//! `MessagingService`: the facade coordinating codec, transport,
//! directory, and the pending-call registry.
//!
//! The service is generic over its transport and codec — both are
//! picked at composition time and the core never branches on which
//! backend it got. No operation blocks the caller on network I/O: sends
//! return once the transport accepts them, and `request`/`request_all`
//! hand back a future-like handle the caller may await or cancel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use meshwire_directory::{ServerDescriptor, ServerDirectory};
use meshwire_protocol::{ChannelName, Codec, Envelope, Message, ServerId, SessionId};
use meshwire_transport::{ChannelTransport, InboundFrame};
use rand::Rng;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::config::ServiceConfig;
use crate::dispatch::{self, MessageMeta, StoredHandler};
use crate::error::MeshwireError;
use crate::handle::{BroadcastHandle, RequestHandle};
use crate::pending::PendingCallRegistry;
use crate::system::{SYSTEM_CHANNEL, SystemMessage, system_channel};

/// Shared service state, cloned into every background and dispatch
/// task.
pub(crate) struct ServiceInner<T: ChannelTransport, C: Codec + Clone> {
    pub(crate) local_id: ServerId,
    pub(crate) transport: Arc<T>,
    pub(crate) codec: C,
    pub(crate) directory: Arc<ServerDirectory>,
    pub(crate) pending: Arc<PendingCallRegistry>,
    /// One handler per channel; mutated rarely, so a plain lock —
    /// dispatch clones the `Arc` out and releases it immediately.
    pub(crate) handlers: Mutex<HashMap<ChannelName, StoredHandler>>,
    /// One dispatch loop per subscribed channel.
    dispatchers: Mutex<HashMap<ChannelName, JoinHandle<()>>>,
    /// Reaper, heartbeat, system listener, directory maintenance.
    background: Mutex<Vec<JoinHandle<()>>>,
    config: ServiceConfig,
    started_at: Instant,
}

impl<T: ChannelTransport, C: Codec + Clone> ServiceInner<T, C> {
    /// Publishes `message` on the reserved system channel.
    async fn send_system(&self, message: &SystemMessage) -> Result<(), MeshwireError> {
        let payload = self.codec.encode_payload(message)?;
        let envelope = Envelope::broadcast(
            self.local_id.clone(),
            SystemMessage::TYPE_TAG,
            payload,
        );
        let bytes = self.codec.encode(&envelope)?;
        self.transport.broadcast(&system_channel(), &bytes).await?;
        Ok(())
    }

    /// Refreshes the local descriptor and announces it to the cluster.
    async fn heartbeat_once(&self) {
        let mut descriptor = self
            .directory
            .by_id(&self.local_id)
            .unwrap_or_else(|| ServerDescriptor::new(self.local_id.clone()));
        descriptor.online = true;
        descriptor.health.uptime_secs = self.started_at.elapsed().as_secs();
        if let Ok(count) = self.transport.player_count(&self.local_id).await {
            descriptor.player_count = count as u32;
        }
        self.directory.apply_heartbeat(descriptor.clone());

        let message = SystemMessage::Announcement { descriptor };
        if let Err(e) = self.send_system(&message).await {
            tracing::warn!(server = %self.local_id, error = %e, "heartbeat failed");
        }
    }
}

/// Consumes system-channel traffic and feeds the directory.
async fn run_system_loop<T, C>(
    inner: Arc<ServiceInner<T, C>>,
    mut rx: mpsc::Receiver<InboundFrame>,
) where
    T: ChannelTransport,
    C: Codec + Clone,
{
    while let Some(frame) = rx.recv().await {
        let envelope = match inner.codec.decode(&frame.bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable system frame");
                continue;
            }
        };
        // Our own announcements loop back through the hub.
        if envelope.source == inner.local_id {
            continue;
        }
        let message: SystemMessage = match inner.codec.decode_payload(&envelope) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(
                    source = %envelope.source,
                    error = %e,
                    "dropping non-system payload on system channel"
                );
                continue;
            }
        };
        match message {
            SystemMessage::Announcement { descriptor } => {
                inner.directory.apply_heartbeat(descriptor);
            }
            SystemMessage::Departure { server_id } => {
                inner.directory.mark_departed(&server_id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MessagingService
// ---------------------------------------------------------------------------

/// The cross-server messaging facade.
///
/// Cheap to clone; all clones share the same transport, directory, and
/// pending-call registry.
pub struct MessagingService<T: ChannelTransport, C: Codec + Clone> {
    inner: Arc<ServiceInner<T, C>>,
}

impl<T: ChannelTransport, C: Codec + Clone> Clone for MessagingService<T, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ChannelTransport, C: Codec + Clone> MessagingService<T, C> {
    /// Connects the transport and starts the service: system-channel
    /// listener, heartbeat publisher, pending-call reaper, and
    /// directory maintenance.
    ///
    /// `descriptor` seeds the local directory entry and is announced to
    /// peers immediately, then on every heartbeat.
    pub async fn start(
        transport: Arc<T>,
        codec: C,
        descriptor: ServerDescriptor,
        config: ServiceConfig,
    ) -> Result<Self, MeshwireError> {
        transport.connect().await?;

        let local_id = descriptor.id.clone();
        let directory = Arc::new(ServerDirectory::new(
            local_id.clone(),
            config.directory.clone(),
        ));
        directory.apply_heartbeat(descriptor);

        let inner = Arc::new(ServiceInner {
            local_id: local_id.clone(),
            transport: Arc::clone(&transport),
            codec,
            directory,
            pending: Arc::new(PendingCallRegistry::new()),
            handlers: Mutex::new(HashMap::new()),
            dispatchers: Mutex::new(HashMap::new()),
            background: Mutex::new(Vec::new()),
            config,
            started_at: Instant::now(),
        });

        // System channel: subscribe before the first announcement so we
        // never miss a peer answering our arrival with its own beat.
        transport.register_channel(&system_channel()).await?;
        let system_rx = transport.subscribe(&system_channel()).await?;

        let mut background = Vec::with_capacity(4);
        background.push(tokio::spawn(run_system_loop(
            Arc::clone(&inner),
            system_rx,
        )));

        inner.heartbeat_once().await;

        background.push(tokio::spawn({
            let inner = Arc::clone(&inner);
            async move {
                let base = inner.config.heartbeat_interval;
                loop {
                    let jitter_ms = {
                        let span = (base.as_millis() as u64 / 5).max(1);
                        rand::rng().random_range(0..span)
                    };
                    tokio::time::sleep(
                        base.mul_f64(0.9) + Duration::from_millis(jitter_ms),
                    )
                    .await;
                    inner.heartbeat_once().await;
                }
            }
        }));

        background.push(tokio::spawn({
            let inner = Arc::clone(&inner);
            async move {
                let mut ticker =
                    tokio::time::interval(inner.config.reaper_interval);
                loop {
                    ticker.tick().await;
                    let reaped = inner.pending.reap_expired(Instant::now());
                    if reaped > 0 {
                        tracing::debug!(reaped, "expired pending calls");
                    }
                }
            }
        }));

        background.push(tokio::spawn({
            let inner = Arc::clone(&inner);
            async move {
                let cadence = inner.config.directory.staleness_window / 2;
                let mut ticker = tokio::time::interval(cadence.max(
                    Duration::from_millis(100),
                ));
                loop {
                    ticker.tick().await;
                    inner.directory.prune();
                }
            }
        }));

        *inner.background.lock().await = background;

        tracing::info!(server = %local_id, "messaging service started");
        Ok(Self { inner })
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    /// The id this service sends as.
    pub fn local_id(&self) -> &ServerId {
        &self.inner.local_id
    }

    /// The cluster directory owned by this service.
    pub fn directory(&self) -> Arc<ServerDirectory> {
        Arc::clone(&self.inner.directory)
    }

    /// Whether the underlying transport is attached.
    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    /// Number of in-flight request calls (observability/testing).
    pub fn in_flight(&self) -> usize {
        self.inner.pending.len()
    }

    /// Forces a transport round-trip to repopulate the directory.
    pub async fn refresh_directory(&self) -> Result<(), MeshwireError> {
        self.inner
            .directory
            .refresh(self.inner.transport.as_ref())
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------

    /// Publishes `message` to every peer subscribed to `channel`,
    /// including this node. Fire-and-forget: returns once the transport
    /// accepts the send, not once peers process it.
    pub async fn broadcast<M: Message>(
        &self,
        channel: &ChannelName,
        message: &M,
    ) -> Result<(), MeshwireError> {
        self.check_channel(channel)?;
        let payload = self.inner.codec.encode_payload(message)?;
        let envelope = Envelope::broadcast(
            self.inner.local_id.clone(),
            M::TYPE_TAG,
            payload,
        );
        let bytes = self.inner.codec.encode(&envelope)?;
        self.inner.transport.broadcast(channel, &bytes).await?;
        Ok(())
    }

    /// Like [`broadcast`](Self::broadcast) but skips the local node:
    /// one targeted send per online peer.
    pub async fn broadcast_excluding_self<M: Message>(
        &self,
        channel: &ChannelName,
        message: &M,
    ) -> Result<(), MeshwireError> {
        self.check_channel(channel)?;
        let payload = self.inner.codec.encode_payload(message)?;
        for peer in self.inner.directory.online() {
            if peer.id == self.inner.local_id {
                continue;
            }
            let envelope = Envelope::one_way(
                self.inner.local_id.clone(),
                peer.id.clone(),
                M::TYPE_TAG,
                payload.clone(),
            );
            let bytes = self.inner.codec.encode(&envelope)?;
            self.inner
                .transport
                .send_to(channel, &peer.id, &bytes)
                .await?;
        }
        Ok(())
    }

    /// One-way targeted send.
    ///
    /// # Errors
    ///
    /// [`MeshwireError::UnknownServer`] when `server` is not in the
    /// directory's online set. Callers wanting best-effort delivery to
    /// possibly-offline nodes catch and ignore it.
    pub async fn send_to<M: Message>(
        &self,
        channel: &ChannelName,
        server: &ServerId,
        message: &M,
    ) -> Result<(), MeshwireError> {
        self.check_channel(channel)?;
        if !self.inner.directory.is_online(server) {
            return Err(MeshwireError::UnknownServer(server.clone()));
        }
        let payload = self.inner.codec.encode_payload(message)?;
        let envelope = Envelope::one_way(
            self.inner.local_id.clone(),
            server.clone(),
            M::TYPE_TAG,
            payload,
        );
        let bytes = self.inner.codec.encode(&envelope)?;
        self.inner.transport.send_to(channel, server, &bytes).await?;
        Ok(())
    }

    /// One-way send to whichever server currently hosts `session`.
    ///
    /// Inherently racy: the session may migrate between resolution and
    /// delivery. The contract is "delivered to the server that was
    /// authoritative at resolution time", nothing stronger — which is
    /// why the resolved location is never cached.
    ///
    /// # Errors
    ///
    /// [`MeshwireError::SessionNotFound`] when resolution comes back
    /// empty; no transport send is attempted in that case.
    pub async fn send_to_player<M: Message>(
        &self,
        channel: &ChannelName,
        session: SessionId,
        message: &M,
    ) -> Result<(), MeshwireError> {
        self.check_channel(channel)?;
        let host = self
            .inner
            .transport
            .find_player_server(session)
            .await?
            .ok_or(MeshwireError::SessionNotFound(session))?;

        let payload = self.inner.codec.encode_payload(message)?;
        let envelope = Envelope::one_way(
            self.inner.local_id.clone(),
            host.clone(),
            M::TYPE_TAG,
            payload,
        );
        let bytes = self.inner.codec.encode(&envelope)?;
        self.inner.transport.send_to(channel, &host, &bytes).await?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Request/response
    // -----------------------------------------------------------------

    /// Sends a request to `server` and returns a handle resolving with
    /// the typed response, or [`MeshwireError::Timeout`] once `timeout`
    /// elapses (enforced by the reaper, ± its cadence).
    pub async fn request<M: Message, R: Message>(
        &self,
        channel: &ChannelName,
        server: &ServerId,
        message: &M,
        timeout: Duration,
    ) -> Result<RequestHandle<R, C>, MeshwireError> {
        self.check_channel(channel)?;
        if !self.inner.directory.is_online(server) {
            return Err(MeshwireError::UnknownServer(server.clone()));
        }
        // Responses come back on the same channel; make sure we listen.
        self.ensure_dispatch(channel).await?;

        let payload = self.inner.codec.encode_payload(message)?;
        let envelope = Envelope::request(
            self.inner.local_id.clone(),
            Some(server.clone()),
            M::TYPE_TAG,
            payload,
        );
        let bytes = self.inner.codec.encode(&envelope)?;
        let id = envelope.correlation_id;
        let rx = self.inner.pending.register_single(
            id,
            Instant::now() + timeout,
            R::TYPE_TAG,
        );

        if let Err(e) = self.inner.transport.send_to(channel, server, &bytes).await {
            // Send never left the building; the caller gets the send
            // error, not a delayed timeout.
            self.inner.pending.discard(id);
            return Err(e.into());
        }

        tracing::trace!(correlation_id = %id, target = %server, "request sent");
        Ok(RequestHandle::new(
            id,
            rx,
            Arc::clone(&self.inner.pending),
            self.inner.codec.clone(),
        ))
    }

    /// Broadcasts a request to every peer on `channel` and accumulates
    /// matching responses until `timeout`.
    ///
    /// Partial results are returned rather than treated as failure; an
    /// empty list is a valid outcome when no peer replies in time.
    pub async fn request_all<M: Message, R: Message>(
        &self,
        channel: &ChannelName,
        message: &M,
        timeout: Duration,
    ) -> Result<BroadcastHandle<R, C>, MeshwireError> {
        self.check_channel(channel)?;
        self.ensure_dispatch(channel).await?;

        let payload = self.inner.codec.encode_payload(message)?;
        let envelope = Envelope::request(
            self.inner.local_id.clone(),
            None,
            M::TYPE_TAG,
            payload,
        );
        let bytes = self.inner.codec.encode(&envelope)?;
        let id = envelope.correlation_id;
        let rx = self.inner.pending.register_multi(
            id,
            Instant::now() + timeout,
            R::TYPE_TAG,
        );

        if let Err(e) = self.inner.transport.broadcast(channel, &bytes).await {
            self.inner.pending.discard(id);
            return Err(e.into());
        }

        tracing::trace!(correlation_id = %id, "fan-out request sent");
        Ok(BroadcastHandle::new(
            id,
            rx,
            Arc::clone(&self.inner.pending),
            self.inner.codec.clone(),
        ))
    }

    // -----------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------

    /// Registers the handler for inbound messages on `channel`,
    /// replacing any previous one.
    ///
    /// For inbound requests the handler's `Ok(Some(reply))` is wrapped
    /// into a response envelope carrying the original correlation id
    /// and sent back to the source; `Err` travels back as a failure
    /// reply; `Ok(None)` sends nothing (the requester times out). For
    /// one-way and broadcast messages the returned value is ignored.
    pub async fn register_handler<M, R, F, Fut>(
        &self,
        channel: &ChannelName,
        handler: F,
    ) -> Result<(), MeshwireError>
    where
        M: Message,
        R: Message,
        F: Fn(M, MessageMeta) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<R>, MeshwireError>> + Send + 'static,
    {
        self.check_channel(channel)?;

        let codec = self.inner.codec.clone();
        let handler_channel = channel.clone();
        let handler = Arc::new(handler);
        let stored: StoredHandler = Arc::new(move |envelope| {
            let codec = codec.clone();
            let channel = handler_channel.clone();
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let meta = MessageMeta::from_envelope(&channel, &envelope);
                let message: M = codec.decode_payload(&envelope)?;
                match handler(message, meta).await? {
                    Some(reply) => Ok(Some((
                        R::TYPE_TAG.to_string(),
                        codec.encode_payload(&reply)?,
                    ))),
                    None => Ok(None),
                }
            })
        });

        self.ensure_dispatch(channel).await?;
        self.inner
            .handlers
            .lock()
            .await
            .insert(channel.clone(), stored);
        tracing::debug!(%channel, "handler registered");
        Ok(())
    }

    /// Removes the handler for `channel`. The subscription stays open
    /// so responses to our own outstanding requests keep flowing.
    pub async fn unregister_handler(&self, channel: &ChannelName) -> bool {
        self.inner.handlers.lock().await.remove(channel).is_some()
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Announces departure, stops all tasks, fails outstanding calls
    /// with `Cancelled`, and disconnects the transport.
    pub async fn shutdown(&self) -> Result<(), MeshwireError> {
        let goodbye = SystemMessage::Departure {
            server_id: self.inner.local_id.clone(),
        };
        if let Err(e) = self.inner.send_system(&goodbye).await {
            tracing::debug!(error = %e, "departure announcement failed");
        }

        for task in self.inner.background.lock().await.drain(..) {
            task.abort();
        }
        for (_, task) in self.inner.dispatchers.lock().await.drain() {
            task.abort();
        }
        self.inner.pending.drain_cancel();
        self.inner.transport.disconnect().await?;

        tracing::info!(server = %self.inner.local_id, "messaging service stopped");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn check_channel(&self, channel: &ChannelName) -> Result<(), MeshwireError> {
        if channel.as_str() == SYSTEM_CHANNEL {
            Err(MeshwireError::ReservedChannel(channel.clone()))
        } else {
            Ok(())
        }
    }

    /// Starts the dispatch loop for `channel` if it isn't running yet.
    async fn ensure_dispatch(&self, channel: &ChannelName) -> Result<(), MeshwireError> {
        let mut dispatchers = self.inner.dispatchers.lock().await;
        if dispatchers.contains_key(channel) {
            return Ok(());
        }
        self.inner.transport.register_channel(channel).await?;
        let rx = self.inner.transport.subscribe(channel).await?;
        let task = tokio::spawn(dispatch::run_channel_loop(
            Arc::clone(&self.inner),
            channel.clone(),
            rx,
        ));
        dispatchers.insert(channel.clone(), task);
        tracing::debug!(%channel, "dispatch loop started");
        Ok(())
    }
}
