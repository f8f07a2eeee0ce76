//! Caller-side handles for in-flight requests.
//!
//! A handle is the only suspension point the core exposes: the send
//! itself never blocks, and awaiting the handle is entirely the
//! caller's choice.

use std::marker::PhantomData;
use std::sync::Arc;

use meshwire_protocol::{Codec, CorrelationId, Message};

use crate::MeshwireError;
use crate::pending::{MultiReceiver, PendingCallRegistry, SingleReceiver};
use crate::system::HandlerFailure;

/// An in-flight single-target request.
///
/// Resolves with the typed response, [`MeshwireError::Timeout`] at the
/// deadline, or [`MeshwireError::Cancelled`] after
/// [`cancel`](RequestHandle::cancel) — whichever happens first, exactly
/// once.
pub struct RequestHandle<R: Message, C: Codec> {
    correlation_id: CorrelationId,
    rx: SingleReceiver,
    registry: Arc<PendingCallRegistry>,
    codec: C,
    _response: PhantomData<fn() -> R>,
}

impl<R: Message, C: Codec> RequestHandle<R, C> {
    pub(crate) fn new(
        correlation_id: CorrelationId,
        rx: SingleReceiver,
        registry: Arc<PendingCallRegistry>,
        codec: C,
    ) -> Self {
        Self {
            correlation_id,
            rx,
            registry,
            codec,
            _response: PhantomData,
        }
    }

    /// The correlation id of the underlying call.
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Cancels the call. Returns `false` when it already resolved,
    /// timed out, or was cancelled — cancellation after the fact is a
    /// no-op.
    pub fn cancel(&self) -> bool {
        self.registry.cancel(self.correlation_id)
    }

    /// Awaits the typed response.
    ///
    /// A [`HandlerFailure`] reply from the remote side surfaces as
    /// [`MeshwireError::Handler`]; a reply carrying an unexpected
    /// payload type fails with a [`CodecError`](MeshwireError::Codec)
    /// naming both tags.
    pub async fn response(self) -> Result<R, MeshwireError> {
        let envelope = self
            .rx
            .await
            // The registry dropped the slot without firing (shutdown).
            .map_err(|_| MeshwireError::Cancelled(self.correlation_id))??;

        if envelope.payload_type == HandlerFailure::TYPE_TAG {
            let failure: HandlerFailure = self.codec.decode_payload(&envelope)?;
            return Err(MeshwireError::Handler(failure.message));
        }
        Ok(self.codec.decode_payload::<R>(&envelope)?)
    }
}

/// An in-flight fan-out request.
///
/// Resolves at the deadline with every matching response accumulated so
/// far, in arrival order. Partial results are a success; an empty list
/// is a valid outcome when no peer replied in time.
pub struct BroadcastHandle<R: Message, C: Codec> {
    correlation_id: CorrelationId,
    rx: MultiReceiver,
    registry: Arc<PendingCallRegistry>,
    codec: C,
    _response: PhantomData<fn() -> R>,
}

impl<R: Message, C: Codec> BroadcastHandle<R, C> {
    pub(crate) fn new(
        correlation_id: CorrelationId,
        rx: MultiReceiver,
        registry: Arc<PendingCallRegistry>,
        codec: C,
    ) -> Self {
        Self {
            correlation_id,
            rx,
            registry,
            codec,
            _response: PhantomData,
        }
    }

    /// The correlation id of the underlying call.
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Cancels the call before its deadline.
    pub fn cancel(&self) -> bool {
        self.registry.cancel(self.correlation_id)
    }

    /// Awaits the accumulated responses (resolves at the deadline).
    ///
    /// Replies that fail to decode, and [`HandlerFailure`] replies from
    /// peers whose handler raised, are logged and skipped — one broken
    /// peer doesn't poison the fan-out.
    pub async fn responses(self) -> Result<Vec<R>, MeshwireError> {
        let envelopes = self
            .rx
            .await
            .map_err(|_| MeshwireError::Cancelled(self.correlation_id))??;

        let mut out = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            if envelope.payload_type == HandlerFailure::TYPE_TAG {
                tracing::debug!(
                    source = %envelope.source,
                    correlation_id = %self.correlation_id,
                    "skipping failure reply in fan-out"
                );
                continue;
            }
            match self.codec.decode_payload::<R>(&envelope) {
                Ok(response) => out.push(response),
                Err(e) => tracing::warn!(
                    source = %envelope.source,
                    error = %e,
                    "skipping undecodable reply in fan-out"
                ),
            }
        }
        Ok(out)
    }
}
