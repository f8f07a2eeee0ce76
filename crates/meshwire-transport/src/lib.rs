//! Transport abstraction layer for Meshwire.
//!
//! Provides the [`ChannelTransport`] trait that abstracts over the
//! underlying publish/subscribe substrate (an in-process hub, a proxy
//! plugin channel, a dedicated broker). The messaging core is written
//! against this trait only; a backend is picked at composition time and
//! never inspected afterwards.
//!
//! # Feature Flags
//!
//! - `memory` (default) — in-process [`MemoryTransport`] backed by a
//!   shared [`MemoryHub`]; used by tests, demos, and single-host
//!   deployments.

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "memory")]
mod memory;

pub use error::TransportError;
#[cfg(feature = "memory")]
pub use memory::{MemoryHub, MemoryTransport};

use std::future::Future;

use meshwire_protocol::{ChannelName, ServerId, SessionId};
use tokio::sync::mpsc;

/// A raw frame delivered by the transport on some channel.
///
/// The transport moves opaque bytes; decoding into an envelope is the
/// subscriber's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// The channel the frame arrived on.
    pub channel: ChannelName,
    /// The encoded envelope.
    pub bytes: Vec<u8>,
}

/// The publish/subscribe substrate the messaging core runs on.
///
/// All operations are asynchronous and must not assume an established
/// connection: any send, subscribe, or directory query on a disconnected
/// transport fails fast with [`TransportError::NotConnected`] instead of
/// silently queuing.
///
/// Within a single channel and single sender, implementations are
/// expected to preserve send order to a given target; no cross-channel
/// or cross-sender ordering is assumed anywhere in the core.
pub trait ChannelTransport: Send + Sync + 'static {
    /// Attaches this process to the substrate under its server id.
    fn connect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Detaches from the substrate. Subscriptions are dropped.
    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Whether the transport is currently attached.
    fn is_connected(&self) -> bool;

    /// Declares interest in a channel.
    ///
    /// Broker-style backends need this to set up routing before the
    /// first [`subscribe`](ChannelTransport::subscribe); in-process
    /// backends may treat it as a no-op.
    fn register_channel(
        &self,
        channel: &ChannelName,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Withdraws interest in a channel and tears down its subscription.
    fn unregister_channel(
        &self,
        channel: &ChannelName,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Publishes a frame to every connected server subscribed to
    /// `channel`, including the sender.
    fn broadcast(
        &self,
        channel: &ChannelName,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Delivers a frame to one server's subscription on `channel`.
    ///
    /// Delivery to a server that is absent or not subscribed is silently
    /// dropped — addressing policy belongs to the caller, which should
    /// consult the directory first.
    fn send_to(
        &self,
        channel: &ChannelName,
        server: &ServerId,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Delivers a frame to whichever server currently hosts `session`.
    fn send_to_player(
        &self,
        channel: &ChannelName,
        session: SessionId,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Opens a subscription to `channel`.
    ///
    /// Frames arrive on the returned receiver; dropping it closes the
    /// subscription. This is the callback primitive in channel form —
    /// the caller owns the dispatch loop.
    fn subscribe(
        &self,
        channel: &ChannelName,
    ) -> impl Future<Output = Result<mpsc::Receiver<InboundFrame>, TransportError>> + Send;

    /// The ids of every server currently attached to the substrate.
    fn server_ids(&self) -> impl Future<Output = Result<Vec<ServerId>, TransportError>> + Send;

    /// Which server currently hosts `session`, if any.
    ///
    /// The answer is authoritative only at the moment it is produced;
    /// sessions migrate, so callers must not cache it beyond a single
    /// routing decision.
    fn find_player_server(
        &self,
        session: SessionId,
    ) -> impl Future<Output = Result<Option<ServerId>, TransportError>> + Send;

    /// The number of sessions hosted by `server`.
    fn player_count(
        &self,
        server: &ServerId,
    ) -> impl Future<Output = Result<usize, TransportError>> + Send;
}
