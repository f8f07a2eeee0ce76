//! Codec trait and the JSON reference implementation.
//!
//! A codec converts envelopes and typed payloads to/from bytes. The rest
//! of the core never touches a serialization crate directly — it goes
//! through the [`Codec`] trait, so a binary codec can be swapped in at
//! composition time without changing any other code.

use crate::{CodecError, Envelope, Message};

/// Converts envelopes and typed payloads to/from byte sequences.
///
/// Implementations must be cheap to clone (the service hands copies to
/// dispatch tasks) and must raise [`CodecError`] — never panic — on
/// malformed or type-mismatched input.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a whole envelope (metadata + payload bytes) for the
    /// wire.
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, CodecError>;

    /// Parses wire bytes back into an envelope.
    ///
    /// This is the untyped decode path: the payload type is whatever
    /// `payload_type` declares; the payload bytes stay opaque until a
    /// caller resolves them with [`decode_payload`](Codec::decode_payload).
    fn decode(&self, bytes: &[u8]) -> Result<Envelope, CodecError>;

    /// Serializes a typed payload into the bytes carried by an envelope.
    fn encode_payload<M: Message>(&self, message: &M) -> Result<Vec<u8>, CodecError>;

    /// Recovers the typed payload from an envelope.
    ///
    /// # Errors
    ///
    /// [`CodecError::TypeMismatch`] when the envelope's tag is not
    /// `M::TYPE_TAG`; [`CodecError::DecodePayload`] when the bytes don't
    /// parse as `M`.
    fn decode_payload<M: Message>(&self, envelope: &Envelope) -> Result<M, CodecError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// The reference [`Codec`] over `serde_json`.
///
/// Human-readable frames make cluster debugging trivial (any frame can be
/// read straight out of a broker dump). Deployments that need compact
/// frames plug in a binary codec behind the same trait.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(envelope).map_err(|source| CodecError::Encode {
            type_tag: envelope.payload_type.clone(),
            source,
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<Envelope, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Envelope)
    }

    fn encode_payload<M: Message>(&self, message: &M) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(message).map_err(|source| CodecError::Encode {
            type_tag: M::TYPE_TAG.to_string(),
            source,
        })
    }

    fn decode_payload<M: Message>(&self, envelope: &Envelope) -> Result<M, CodecError> {
        if envelope.payload_type != M::TYPE_TAG {
            return Err(CodecError::TypeMismatch {
                expected: M::TYPE_TAG.to_string(),
                actual: envelope.payload_type.clone(),
            });
        }
        serde_json::from_slice(&envelope.payload).map_err(|source| {
            CodecError::DecodePayload {
                type_tag: envelope.payload_type.clone(),
                source,
            }
        })
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(all(test, feature = "json"))]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        token: String,
    }

    impl Message for Ping {
        const TYPE_TAG: &'static str = "test.ping";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pong {
        ok: bool,
    }

    impl Message for Pong {
        const TYPE_TAG: &'static str = "test.pong";
    }

    fn ping_envelope(codec: &JsonCodec) -> Envelope {
        let payload = codec
            .encode_payload(&Ping {
                token: "abc".into(),
            })
            .unwrap();
        Envelope::request(
            "lobby-1".into(),
            Some("lobby-2".into()),
            Ping::TYPE_TAG,
            payload,
        )
    }

    #[test]
    fn test_envelope_round_trip_is_identity() {
        let codec = JsonCodec;
        let env = ping_envelope(&codec);

        let bytes = codec.encode(&env).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn test_typed_payload_round_trip() {
        let codec = JsonCodec;
        let env = ping_envelope(&codec);

        let ping: Ping = codec.decode_payload(&env).unwrap();
        assert_eq!(ping.token, "abc");
    }

    #[test]
    fn test_decode_payload_rejects_wrong_tag() {
        let codec = JsonCodec;
        let env = ping_envelope(&codec);

        // Asking for a Pong out of a ping envelope must fail up front on
        // the tag, not on the payload bytes.
        let err = codec.decode_payload::<Pong>(&env).unwrap_err();
        match err {
            CodecError::TypeMismatch { expected, actual } => {
                assert_eq!(expected, "test.pong");
                assert_eq!(actual, "test.ping");
            }
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_payload_reports_offending_tag_on_bad_bytes() {
        let codec = JsonCodec;
        let mut env = ping_envelope(&codec);
        env.payload = b"not json".to_vec();

        let err = codec.decode_payload::<Ping>(&env).unwrap_err();
        // The error message must name the tag so a version-skew problem
        // between nodes can be diagnosed from logs alone.
        assert!(err.to_string().contains("test.ping"));
    }

    #[test]
    fn test_decode_garbage_is_a_codec_error() {
        let codec = JsonCodec;
        let err = codec.decode(b"\x00\x01\x02").unwrap_err();
        assert!(matches!(err, CodecError::Envelope(_)));
    }

    #[test]
    fn test_decode_wrong_shape_is_a_codec_error() {
        let codec = JsonCodec;
        // Valid JSON, but not an envelope.
        let err = codec.decode(br#"{"name": "hello"}"#).unwrap_err();
        assert!(matches!(err, CodecError::Envelope(_)));
    }
}
