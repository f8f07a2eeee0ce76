//! Cross-server messaging for horizontally scaled clusters.
//!
//! `meshwire` lets typed messages flow between server processes over
//! named channels, with four patterns on top of one wire envelope:
//! broadcast, targeted one-way send, correlated request/response with
//! timeouts, and session-addressed delivery ("send to whichever server
//! hosts this player"). A cached, eventually-consistent directory of
//! peers — fed by heartbeats on a reserved channel — backs discovery
//! and load-aware server selection.
//!
//! The service is generic over a [`ChannelTransport`] (the pub/sub
//! substrate) and a [`Codec`] (the payload encoding); the in-process
//! [`MemoryHub`] backend ships for testing and single-host clusters.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use meshwire::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Ping {
//!     seq: u32,
//! }
//!
//! impl Message for Ping {
//!     const TYPE_TAG: &'static str = "demo.ping";
//! }
//!
//! #[derive(Serialize, Deserialize)]
//! struct Pong {
//!     seq: u32,
//! }
//!
//! impl Message for Pong {
//!     const TYPE_TAG: &'static str = "demo.pong";
//! }
//!
//! # async fn demo() -> Result<(), MeshwireError> {
//! let hub = MemoryHub::new();
//! let service = MessagingService::start(
//!     Arc::new(MemoryTransport::new(Arc::clone(&hub), "lobby-1".into())),
//!     JsonCodec,
//!     ServerDescriptor::new("lobby-1".into()),
//!     ServiceConfig::default(),
//! )
//! .await?;
//!
//! let channel = ChannelName::from("demo");
//! service
//!     .register_handler(&channel, |ping: Ping, _meta| async move {
//!         Ok(Some(Pong { seq: ping.seq }))
//!     })
//!     .await?;
//!
//! let pong: Pong = service
//!     .request(&channel, &"game-2".into(), &Ping { seq: 1 }, Duration::from_secs(2))
//!     .await?
//!     .response()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod dispatch;
mod error;
mod handle;
mod pending;
mod service;
mod system;

pub use config::ServiceConfig;
pub use dispatch::MessageMeta;
pub use error::MeshwireError;
pub use handle::{BroadcastHandle, RequestHandle};
pub use service::MessagingService;
pub use system::{HandlerFailure, SYSTEM_CHANNEL, SystemMessage, system_channel};

pub use meshwire_directory::{
    DirectoryConfig, HealthMetrics, ServerDescriptor, ServerDirectory,
};
pub use meshwire_protocol::{
    ChannelName, Codec, CodecError, CorrelationId, Envelope, Message,
    MessageKind, ServerId, SessionId,
};
#[cfg(feature = "json")]
pub use meshwire_protocol::JsonCodec;
pub use meshwire_transport::{ChannelTransport, InboundFrame, TransportError};
#[cfg(feature = "memory")]
pub use meshwire_transport::{MemoryHub, MemoryTransport};

/// One-line import for the common surface.
pub mod prelude {
    pub use crate::{
        ChannelName, ChannelTransport, Codec, Envelope, Message, MessageKind,
        MessageMeta, MeshwireError, MessagingService, ServerDescriptor,
        ServerDirectory, ServerId, ServiceConfig, SessionId,
    };
    #[cfg(feature = "json")]
    pub use crate::JsonCodec;
    #[cfg(feature = "memory")]
    pub use crate::{MemoryHub, MemoryTransport};
}
