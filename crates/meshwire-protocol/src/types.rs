//! Core wire types: identifiers, message kinds, and the envelope.
//!
//! Every structure here is serialized and sent between server processes,
//! so the serde representations are part of the wire contract. The unit
//! tests pin the exact JSON shapes — a mismatch means a peer running an
//! older build can't parse our frames.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a server process in the cluster.
///
/// Server ids are operator-assigned names like `"lobby-2"` or
/// `"game-7"`. They must be unique cluster-wide; the transport and the
/// directory both key on them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub String);

impl ServerId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A unique identifier for an end-user session.
///
/// The session is hosted by exactly one server at any moment; the
/// transport's session locator answers which one. Sessions can migrate
/// between servers, so this id is never a stable routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generates a fresh random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named logical topic over which envelopes are published and
/// subscribed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(pub String);

impl ChannelName {
    /// Returns the channel name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The token linking a request envelope to its eventual response.
///
/// Random v4 UUIDs are unique across the process lifetime and
/// practically unique across the cluster without any coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    /// Generates a fresh random correlation id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// How an envelope participates in the messaging patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    /// Fire-and-forget to a single target.
    OneWay,
    /// Expects a response carrying the same correlation id.
    Request,
    /// Answers a request; `correlation_id` equals the request's.
    Response,
    /// Fire-and-forget to every peer; `target` is absent.
    Broadcast,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::OneWay => write!(f, "one-way"),
            MessageKind::Request => write!(f, "request"),
            MessageKind::Response => write!(f, "response"),
            MessageKind::Broadcast => write!(f, "broadcast"),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The wire-level wrapper around a domain payload.
///
/// Routing and correlation metadata live on the outside; the payload is
/// an opaque byte sequence interpreted only by the codec via
/// `payload_type`.
///
/// Invariants (upheld by the constructors):
/// - `correlation_id` is a freshly generated v4 UUID, never nil;
/// - a response built with [`Envelope::response_to`] carries the same
///   `correlation_id` as the request it answers;
/// - `target` is `None` exactly for broadcast envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique token linking requests to responses.
    pub correlation_id: CorrelationId,
    /// The messaging pattern this envelope belongs to.
    pub kind: MessageKind,
    /// The server that produced this envelope.
    pub source: ServerId,
    /// The addressed server, absent for broadcasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ServerId>,
    /// The wire-stable tag the codec uses to resolve the payload type.
    pub payload_type: String,
    /// Milliseconds since the Unix epoch at send time.
    pub sent_at: u64,
    /// The encoded domain payload.
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Builds a broadcast envelope (no target).
    pub fn broadcast(
        source: ServerId,
        payload_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            kind: MessageKind::Broadcast,
            source,
            target: None,
            payload_type: payload_type.into(),
            sent_at: now_millis(),
            payload,
        }
    }

    /// Builds a one-way targeted envelope.
    pub fn one_way(
        source: ServerId,
        target: ServerId,
        payload_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            kind: MessageKind::OneWay,
            source,
            target: Some(target),
            payload_type: payload_type.into(),
            sent_at: now_millis(),
            payload,
        }
    }

    /// Builds a request envelope with a fresh correlation id.
    ///
    /// `target` is `None` for fan-out requests sent via broadcast.
    pub fn request(
        source: ServerId,
        target: Option<ServerId>,
        payload_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            kind: MessageKind::Request,
            source,
            target,
            payload_type: payload_type.into(),
            sent_at: now_millis(),
            payload,
        }
    }

    /// Builds the response to `request`, preserving its correlation id
    /// and addressing the request's source.
    pub fn response_to(
        request: &Envelope,
        source: ServerId,
        payload_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            correlation_id: request.correlation_id,
            kind: MessageKind::Response,
            source,
            target: Some(request.source.clone()),
            payload_type: payload_type.into(),
            sent_at: now_millis(),
            payload,
        }
    }
}

/// Milliseconds since the Unix epoch.
///
/// Wall-clock time is only used for wire timestamps and staleness
/// bookkeeping, never for deadlines — those use monotonic `Instant`s.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_server_id_serializes_as_plain_string() {
        // `#[serde(transparent)]` means ServerId("lobby-2") → "lobby-2",
        // not {"0":"lobby-2"}. Peers key their routing tables on this.
        let json = serde_json::to_string(&ServerId::from("lobby-2")).unwrap();
        assert_eq!(json, "\"lobby-2\"");
    }

    #[test]
    fn test_server_id_display_and_ordering() {
        assert_eq!(ServerId::from("game-1").to_string(), "game-1");
        // Ord is relied on by the directory's deterministic tie-break.
        assert!(ServerId::from("lobby-1") < ServerId::from("lobby-2"));
    }

    #[test]
    fn test_session_id_round_trip() {
        let id = SessionId::new();
        let json = serde_json::to_string(&id).unwrap();
        let decoded: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, decoded);
    }

    #[test]
    fn test_correlation_ids_are_unique_and_non_nil() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b);
        assert_ne!(a.0, Uuid::nil());
    }

    #[test]
    fn test_channel_name_serializes_as_plain_string() {
        let json = serde_json::to_string(&ChannelName::from("economy")).unwrap();
        assert_eq!(json, "\"economy\"");
    }

    // =====================================================================
    // MessageKind
    // =====================================================================

    #[test]
    fn test_message_kind_serializes_as_kebab_case() {
        let json = serde_json::to_string(&MessageKind::OneWay).unwrap();
        assert_eq!(json, "\"one-way\"");
        let json = serde_json::to_string(&MessageKind::Broadcast).unwrap();
        assert_eq!(json, "\"broadcast\"");
    }

    #[test]
    fn test_message_kind_display() {
        assert_eq!(MessageKind::Request.to_string(), "request");
        assert_eq!(MessageKind::OneWay.to_string(), "one-way");
    }

    // =====================================================================
    // Envelope constructors
    // =====================================================================

    #[test]
    fn test_broadcast_envelope_has_no_target() {
        let env = Envelope::broadcast("lobby-1".into(), "ping", vec![1]);
        assert_eq!(env.kind, MessageKind::Broadcast);
        assert!(env.target.is_none());
        assert_ne!(env.correlation_id.0, Uuid::nil());
    }

    #[test]
    fn test_one_way_envelope_is_addressed() {
        let env = Envelope::one_way(
            "lobby-1".into(),
            "game-3".into(),
            "ping",
            vec![],
        );
        assert_eq!(env.kind, MessageKind::OneWay);
        assert_eq!(env.target, Some(ServerId::from("game-3")));
    }

    #[test]
    fn test_response_preserves_correlation_id_and_targets_source() {
        let req = Envelope::request(
            "lobby-1".into(),
            Some("lobby-2".into()),
            "ping",
            vec![],
        );
        let resp =
            Envelope::response_to(&req, "lobby-2".into(), "pong", vec![2]);

        assert_eq!(resp.correlation_id, req.correlation_id);
        assert_eq!(resp.kind, MessageKind::Response);
        assert_eq!(resp.target, Some(ServerId::from("lobby-1")));
        assert_eq!(resp.source, ServerId::from("lobby-2"));
    }

    #[test]
    fn test_fan_out_request_has_no_target() {
        let env = Envelope::request("lobby-1".into(), None, "poll", vec![]);
        assert_eq!(env.kind, MessageKind::Request);
        assert!(env.target.is_none());
    }

    #[test]
    fn test_envelope_json_omits_absent_target() {
        // `skip_serializing_if` keeps broadcast frames free of a
        // "target": null field older decoders may choke on.
        let env = Envelope::broadcast("lobby-1".into(), "ping", vec![]);
        let json: serde_json::Value = serde_json::to_value(&env).unwrap();
        assert!(json.get("target").is_none());
        assert_eq!(json["kind"], "broadcast");
        assert_eq!(json["source"], "lobby-1");
    }

    #[test]
    fn test_envelope_round_trip() {
        let env = Envelope::one_way(
            "lobby-1".into(),
            "game-2".into(),
            "economy.transfer",
            vec![10, 20, 30],
        );
        let bytes = serde_json::to_vec(&env).unwrap();
        let decoded: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn test_envelope_sent_at_is_populated() {
        let env = Envelope::broadcast("a".into(), "t", vec![]);
        assert!(env.sent_at > 0);
    }
}
