//! Error types for the protocol layer.
//!
//! Each Meshwire crate defines its own error enum. A `CodecError` always
//! means encode/decode trouble, never networking or routing — and it
//! always names the payload type tag involved, because the most common
//! cause in a live cluster is version skew between nodes.

/// Errors raised by codec implementations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serializing a payload or envelope failed.
    #[cfg(feature = "json")]
    #[error("encode failed for payload type `{type_tag}`: {source}")]
    Encode {
        /// The tag of the payload being encoded.
        type_tag: String,
        #[source]
        source: serde_json::Error,
    },

    /// The envelope bytes themselves are malformed.
    #[cfg(feature = "json")]
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The payload bytes don't parse as the type named by the tag.
    ///
    /// Usually a version-skew problem: the sending node serialized a
    /// newer/older shape under the same tag.
    #[cfg(feature = "json")]
    #[error("decode failed for payload type `{type_tag}`: {source}")]
    DecodePayload {
        /// The tag declared in the envelope.
        type_tag: String,
        #[source]
        source: serde_json::Error,
    },

    /// The envelope declares a different payload type than the caller
    /// expected.
    #[error("payload type mismatch: expected `{expected}`, got `{actual}`")]
    TypeMismatch {
        /// The tag the caller asked to decode.
        expected: String,
        /// The tag the envelope actually carries.
        actual: String,
    },
}
