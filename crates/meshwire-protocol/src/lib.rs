//! Wire protocol for Meshwire.
//!
//! This crate defines the "language" that cluster nodes speak to each
//! other:
//!
//! - **Types** ([`Envelope`], [`MessageKind`], [`ServerId`], etc.) — the
//!   structures that travel on the wire between server processes.
//! - **Message** ([`Message`] trait) — how domain payloads declare their
//!   wire-stable type tag.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how envelopes and
//!   payloads are converted to/from bytes.
//! - **Errors** ([`CodecError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw frames on named
//! channels) and the messaging service (routing, correlation, handlers).
//! It knows nothing about peers or pending calls — only how an envelope
//! and its payload are represented.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Service (routing + correlation)
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::CodecError;
pub use message::Message;
pub use types::{
    ChannelName, CorrelationId, Envelope, MessageKind, ServerId, SessionId,
    now_millis,
};
