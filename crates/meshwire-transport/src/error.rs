use meshwire_protocol::ServerId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport is not attached to the substrate.
    ///
    /// Sends and subscriptions fail fast with this instead of queuing;
    /// the core never retries on the caller's behalf.
    #[error("transport not connected")]
    NotConnected,

    /// A server with this id is already attached to the substrate.
    #[error("server `{0}` already connected")]
    AlreadyConnected(ServerId),

    /// A backend-specific failure (broker refused the publish, the
    /// plugin channel closed, ...).
    #[error("transport backend error: {0}")]
    Backend(String),
}
