//! Inbound dispatch: one loop task per subscribed channel, one spawned
//! task per received frame.
//!
//! The split keeps a slow or faulty handler from stalling other inbound
//! traffic or the transport's read side. A frame that fails to decode is
//! logged and dropped; the loop never dies over one bad message.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use meshwire_protocol::{
    ChannelName, Codec, CorrelationId, Envelope, Message, MessageKind,
    ServerId,
};
use meshwire_transport::{ChannelTransport, InboundFrame};
use tokio::sync::mpsc;

use crate::MeshwireError;
use crate::service::ServiceInner;
use crate::system::HandlerFailure;

/// Envelope metadata handed to handlers alongside the decoded payload.
#[derive(Debug, Clone)]
pub struct MessageMeta {
    /// The channel the message arrived on.
    pub channel: ChannelName,
    /// The sending server.
    pub source: ServerId,
    /// The messaging pattern of the envelope.
    pub kind: MessageKind,
    /// Correlation id (meaningful for requests).
    pub correlation_id: CorrelationId,
    /// Sender-side epoch millis.
    pub sent_at: u64,
}

impl MessageMeta {
    pub(crate) fn from_envelope(channel: &ChannelName, envelope: &Envelope) -> Self {
        Self {
            channel: channel.clone(),
            source: envelope.source.clone(),
            kind: envelope.kind,
            correlation_id: envelope.correlation_id,
            sent_at: envelope.sent_at,
        }
    }
}

/// A registered handler, type-erased: decodes its payload, runs the
/// user's callback, and hands back an encoded reply (tag + bytes) when
/// there is one.
pub(crate) type StoredHandler = Arc<
    dyn Fn(Envelope) -> BoxFuture<'static, Result<Option<(String, Vec<u8>)>, MeshwireError>>
        + Send
        + Sync,
>;

/// Drives one channel subscription until the transport closes it.
pub(crate) async fn run_channel_loop<T, C>(
    inner: Arc<ServiceInner<T, C>>,
    channel: ChannelName,
    mut rx: mpsc::Receiver<InboundFrame>,
) where
    T: ChannelTransport,
    C: Codec + Clone,
{
    while let Some(frame) = rx.recv().await {
        let inner = Arc::clone(&inner);
        let channel = channel.clone();
        tokio::spawn(async move {
            handle_frame(inner, channel, frame).await;
        });
    }
    tracing::debug!(%channel, "channel dispatch loop ended");
}

async fn handle_frame<T, C>(
    inner: Arc<ServiceInner<T, C>>,
    channel: ChannelName,
    frame: InboundFrame,
) where
    T: ChannelTransport,
    C: Codec + Clone,
{
    let envelope = match inner.codec.decode(&frame.bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(%channel, error = %e, "dropping undecodable frame");
            return;
        }
    };

    match envelope.kind {
        MessageKind::Response => {
            let id = envelope.correlation_id;
            if !inner.pending.resolve(id, envelope) {
                // Late, duplicate, or post-cancellation reply.
                tracing::trace!(correlation_id = %id, "dropping unmatched response");
            }
        }
        MessageKind::Request => handle_request(inner, channel, envelope).await,
        MessageKind::OneWay | MessageKind::Broadcast => {
            let handler = inner.handlers.lock().await.get(&channel).cloned();
            let Some(handler) = handler else {
                tracing::trace!(%channel, "no handler for inbound message");
                return;
            };
            if let Err(e) = handler(envelope).await {
                tracing::warn!(%channel, error = %e, "handler failed on one-way message");
            }
        }
    }
}

/// Runs the channel's handler on an inbound request and sends the reply
/// envelope back to the requester.
///
/// A handler error — or a missing handler — is wrapped into a
/// [`HandlerFailure`] reply so the requester fails fast instead of
/// waiting out its timeout. A handler returning `None` sends nothing.
async fn handle_request<T, C>(
    inner: Arc<ServiceInner<T, C>>,
    channel: ChannelName,
    envelope: Envelope,
) where
    T: ChannelTransport,
    C: Codec + Clone,
{
    let handler = inner.handlers.lock().await.get(&channel).cloned();
    let outcome = match handler {
        Some(handler) => handler(envelope.clone()).await,
        None => Err(MeshwireError::Handler(format!(
            "no handler registered on channel `{channel}`"
        ))),
    };

    let (payload_type, payload) = match outcome {
        Ok(Some(reply)) => reply,
        Ok(None) => return,
        Err(e) => {
            tracing::debug!(
                %channel,
                source = %envelope.source,
                error = %e,
                "handler failed, replying with failure"
            );
            let failure = HandlerFailure {
                message: e.to_string(),
            };
            match inner.codec.encode_payload(&failure) {
                Ok(payload) => (HandlerFailure::TYPE_TAG.to_string(), payload),
                Err(encode_err) => {
                    tracing::error!(error = %encode_err, "could not encode failure reply");
                    return;
                }
            }
        }
    };

    let reply = Envelope::response_to(
        &envelope,
        inner.local_id.clone(),
        payload_type,
        payload,
    );
    let bytes = match inner.codec.encode(&reply) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "could not encode response envelope");
            return;
        }
    };
    if let Err(e) = inner
        .transport
        .send_to(&channel, &envelope.source, &bytes)
        .await
    {
        tracing::warn!(
            %channel,
            target = %envelope.source,
            error = %e,
            "could not deliver response"
        );
    }
}
