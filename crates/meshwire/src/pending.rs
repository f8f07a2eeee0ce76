//! The pending-call registry: outstanding request/response calls keyed
//! by correlation id, each with a deadline.
//!
//! Resolution, cancellation, and expiry race on the same entry. The
//! registry settles the race with the map's atomic remove: whichever
//! path removes the entry first delivers the outcome, the losers observe
//! it already gone and no-op. A call is therefore destroyed exactly
//! once, and its result slot fires exactly once.

use std::time::Instant;

use dashmap::DashMap;
use meshwire_protocol::{CorrelationId, Envelope};
use tokio::sync::oneshot;

use crate::MeshwireError;

/// Result slot of a single-response call.
pub(crate) type SingleReceiver = oneshot::Receiver<Result<Envelope, MeshwireError>>;
/// Result slot of a fan-out call.
pub(crate) type MultiReceiver = oneshot::Receiver<Result<Vec<Envelope>, MeshwireError>>;

enum ResponseSlot {
    /// One matching response resolves the call.
    Single(oneshot::Sender<Result<Envelope, MeshwireError>>),
    /// Matching responses accumulate until the deadline, which resolves
    /// the call with whatever arrived (empty included).
    Multi {
        responses: Vec<Envelope>,
        tx: oneshot::Sender<Result<Vec<Envelope>, MeshwireError>>,
    },
}

struct PendingCall {
    deadline: Instant,
    /// Response tag the caller expects; logged on mismatch diagnostics.
    expected_type: &'static str,
    slot: ResponseSlot,
}

impl PendingCall {
    /// Fires the slot with a terminal error (cancellation).
    fn fail(self, err: MeshwireError) {
        match self.slot {
            ResponseSlot::Single(tx) => {
                let _ = tx.send(Err(err));
            }
            ResponseSlot::Multi { tx, .. } => {
                let _ = tx.send(Err(err));
            }
        }
    }

    /// Fires the slot at deadline: timeout for single calls, partial
    /// results for fan-out calls.
    fn expire(self, id: CorrelationId) {
        match self.slot {
            ResponseSlot::Single(tx) => {
                let _ = tx.send(Err(MeshwireError::Timeout(id)));
            }
            ResponseSlot::Multi { responses, tx } => {
                let _ = tx.send(Ok(responses));
            }
        }
    }
}

/// Concurrent map of in-flight calls.
#[derive(Default)]
pub(crate) struct PendingCallRegistry {
    calls: DashMap<CorrelationId, PendingCall>,
}

impl PendingCallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a single-response call; the receiver fires on
    /// resolution, timeout, or cancellation — exactly one of them.
    pub fn register_single(
        &self,
        id: CorrelationId,
        deadline: Instant,
        expected_type: &'static str,
    ) -> SingleReceiver {
        let (tx, rx) = oneshot::channel();
        self.calls.insert(
            id,
            PendingCall {
                deadline,
                expected_type,
                slot: ResponseSlot::Single(tx),
            },
        );
        rx
    }

    /// Registers a fan-out call accumulating responses until the
    /// deadline (unbounded count).
    pub fn register_multi(
        &self,
        id: CorrelationId,
        deadline: Instant,
        expected_type: &'static str,
    ) -> MultiReceiver {
        let (tx, rx) = oneshot::channel();
        self.calls.insert(
            id,
            PendingCall {
                deadline,
                expected_type,
                slot: ResponseSlot::Multi {
                    responses: Vec::new(),
                    tx,
                },
            },
        );
        rx
    }

    /// Delivers a response envelope to its pending call.
    ///
    /// Returns `false` when no call matches — a late or duplicate
    /// response is a silent no-op, not an error, and changes no state.
    pub fn resolve(&self, id: CorrelationId, envelope: Envelope) -> bool {
        {
            let Some(mut entry) = self.calls.get_mut(&id) else {
                return false;
            };
            let expected_type = entry.expected_type;
            if let ResponseSlot::Multi { responses, .. } = &mut entry.slot {
                if envelope.payload_type != expected_type {
                    tracing::debug!(
                        correlation_id = %id,
                        expected = expected_type,
                        actual = %envelope.payload_type,
                        "accumulating off-type response"
                    );
                }
                responses.push(envelope);
                return true;
            }
        }
        // Single-shot: the atomic remove decides the race against the
        // reaper and cancellation.
        match self.calls.remove(&id) {
            Some((_, call)) => {
                if let ResponseSlot::Single(tx) = call.slot {
                    let _ = tx.send(Ok(envelope));
                }
                true
            }
            None => false,
        }
    }

    /// Cancels a pending call; the caller's slot fires with
    /// [`MeshwireError::Cancelled`]. A no-op (returning `false`) after
    /// the call already resolved or expired.
    pub fn cancel(&self, id: CorrelationId) -> bool {
        match self.calls.remove(&id) {
            Some((_, call)) => {
                call.fail(MeshwireError::Cancelled(id));
                true
            }
            None => false,
        }
    }

    /// Removes a call without firing its slot.
    ///
    /// Used when the send itself failed and the caller gets the send
    /// error directly.
    pub fn discard(&self, id: CorrelationId) {
        self.calls.remove(&id);
    }

    /// Expires every call whose deadline is at or before `now`.
    ///
    /// Single calls fail with [`MeshwireError::Timeout`]; fan-out calls
    /// resolve with their accumulated responses. Returns how many calls
    /// were expired.
    pub fn reap_expired(&self, now: Instant) -> usize {
        let due: Vec<CorrelationId> = self
            .calls
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| *entry.key())
            .collect();

        let mut reaped = 0;
        for id in due {
            // Re-check under the removal so a concurrent resolve that
            // won the race is respected.
            if let Some((_, call)) =
                self.calls.remove_if(&id, |_, call| call.deadline <= now)
            {
                call.expire(id);
                reaped += 1;
            }
        }
        reaped
    }

    /// Fails every outstanding call with `Cancelled` (service
    /// shutdown).
    pub fn drain_cancel(&self) {
        let ids: Vec<CorrelationId> =
            self.calls.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.cancel(id);
        }
    }

    /// Number of in-flight calls.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
