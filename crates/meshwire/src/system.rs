//! Reserved system channel traffic: heartbeats, departures, and the
//! handler-failure reply payload.

use meshwire_directory::ServerDescriptor;
use meshwire_protocol::{ChannelName, Message, ServerId};
use serde::{Deserialize, Serialize};

/// Name of the reserved channel carrying cluster bookkeeping traffic.
///
/// Application handlers cannot register on it; the service attaches its
/// own listener at start.
pub const SYSTEM_CHANNEL: &str = "meshwire.system";

/// The reserved channel as a [`ChannelName`].
pub fn system_channel() -> ChannelName {
    ChannelName::from(SYSTEM_CHANNEL)
}

/// Cluster bookkeeping messages exchanged on the system channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
    /// Periodic descriptor snapshot; feeds every peer's directory.
    Announcement { descriptor: ServerDescriptor },
    /// Explicit goodbye; peers drop the entry immediately instead of
    /// waiting for staleness.
    Departure { server_id: ServerId },
}

impl Message for SystemMessage {
    const TYPE_TAG: &'static str = "meshwire.system-message";
}

/// Reply payload for a request whose handler failed (or was missing).
///
/// Sent in place of the normal response so the requester's pending call
/// resolves with [`MeshwireError::Handler`](crate::MeshwireError::Handler)
/// instead of hanging until timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerFailure {
    /// Human-readable description of the remote failure.
    pub message: String,
}

impl Message for HandlerFailure {
    const TYPE_TAG: &'static str = "meshwire.handler-failure";
}
