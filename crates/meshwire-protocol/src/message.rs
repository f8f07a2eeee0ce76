//! The [`Message`] trait: what a domain payload must provide to travel
//! through Meshwire.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A typed, immutable application payload.
///
/// The core treats messages as opaque — it only needs to serialize them
/// and to recover the concrete type on the receiving side. The latter is
/// driven by [`TYPE_TAG`](Message::TYPE_TAG), which is embedded in the
/// envelope and matched by the codec on decode.
///
/// `TYPE_TAG` is an explicit constant rather than
/// `std::any::type_name::<Self>()` on purpose: the tag is part of the
/// wire contract between cluster nodes, and renaming a Rust type on one
/// node must not silently break decoding on a node running the previous
/// build. Pick a stable, namespaced tag and never change it:
///
/// ```
/// use meshwire_protocol::Message;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct TransferFunds {
///     from: String,
///     to: String,
///     amount: u64,
/// }
///
/// impl Message for TransferFunds {
///     const TYPE_TAG: &'static str = "economy.transfer-funds";
/// }
/// ```
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Wire-stable tag identifying this payload type across the cluster.
    const TYPE_TAG: &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    impl Message for Ping {
        const TYPE_TAG: &'static str = "test.ping";
    }

    #[test]
    fn test_type_tag_is_accessible_via_trait() {
        fn tag_of<M: Message>() -> &'static str {
            M::TYPE_TAG
        }
        assert_eq!(tag_of::<Ping>(), "test.ping");
    }
}
