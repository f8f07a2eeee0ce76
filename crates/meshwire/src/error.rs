//! Unified error type for the messaging core.

use meshwire_protocol::{ChannelName, CodecError, CorrelationId, ServerId, SessionId};
use meshwire_transport::TransportError;

/// Everything that can go wrong when sending, requesting, or handling.
///
/// Routing failures (`UnknownServer`, `SessionNotFound`) are always
/// surfaced to the caller, never silently swallowed — callers wanting
/// best-effort delivery to possibly-offline nodes catch and ignore.
/// `Timeout` is the only variant the core produces asynchronously (via
/// the reaper); everything else is raised on the calling path.
#[derive(Debug, thiserror::Error)]
pub enum MeshwireError {
    /// A transport-level failure. Carries
    /// [`TransportError::NotConnected`] when the substrate is
    /// unavailable; the core never retries on the caller's behalf.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encoding or decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The addressed server is not in the directory's online set.
    #[error("unknown server `{0}`")]
    UnknownServer(ServerId),

    /// No server currently hosts the addressed session.
    #[error("no server hosts session {0}")]
    SessionNotFound(SessionId),

    /// The request's deadline passed before a matching response arrived.
    #[error("request {0} timed out")]
    Timeout(CorrelationId),

    /// The caller cancelled the request before resolution.
    #[error("request {0} was cancelled")]
    Cancelled(CorrelationId),

    /// A remote handler raised while processing the request. The error
    /// text travels back in the response envelope so the caller fails
    /// fast instead of hanging until timeout.
    #[error("remote handler failed: {0}")]
    Handler(String),

    /// The channel is reserved for internal traffic (heartbeats,
    /// departures) and cannot carry application messages.
    #[error("channel `{0}` is reserved for system traffic")]
    ReservedChannel(ChannelName),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: MeshwireError = TransportError::NotConnected.into();
        assert!(matches!(
            err,
            MeshwireError::Transport(TransportError::NotConnected)
        ));
        assert_eq!(err.to_string(), "transport not connected");
    }

    #[test]
    fn test_from_codec_error() {
        let err: MeshwireError = CodecError::TypeMismatch {
            expected: "a".into(),
            actual: "b".into(),
        }
        .into();
        assert!(matches!(err, MeshwireError::Codec(_)));
        assert!(err.to_string().contains("expected `a`"));
    }

    #[test]
    fn test_routing_errors_name_the_target() {
        let err = MeshwireError::UnknownServer("lobby-9".into());
        assert!(err.to_string().contains("lobby-9"));
    }
}
