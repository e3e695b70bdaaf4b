//! In-flight request tracking.
//!
//! Every [`send_request`](crate::CommunicationManager::send_request) call
//! registers a one-shot slot keyed by its correlation ID. The dispatcher
//! resolves the slot when the matching response arrives. The caller holds a
//! [`PendingGuard`] that removes the entry when dropped, so the entry
//! disappears on every exit path: response, timeout, cancellation, a failed
//! send, or the caller's future being dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::oneshot;

use plexus_core::Message;

struct PendingRequest {
    /// Taken on first delivery; `None` afterwards.
    slot: Option<oneshot::Sender<Message>>,
    /// `None` when the timeout is too large to represent.
    deadline: Option<Instant>,
}

/// What happened to a response handed to [`CorrelationTable::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The waiting caller received the response.
    Delivered,
    /// A response for this correlation ID was already delivered.
    Duplicate,
    /// No request is waiting under this correlation ID.
    Unknown,
    /// The caller stopped waiting between lookup and delivery.
    Abandoned,
}

/// Correlation ID → pending response slot.
#[derive(Default)]
pub struct CorrelationTable {
    pending: RwLock<HashMap<String, PendingRequest>>,
}

impl CorrelationTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending request.
    ///
    /// Returns the guard owning the entry and the receiver the caller awaits.
    pub fn register(
        self: &Arc<Self>,
        correlation_id: impl Into<String>,
        deadline: Option<Instant>,
    ) -> (PendingGuard, oneshot::Receiver<Message>) {
        let correlation_id = correlation_id.into();
        let (tx, rx) = oneshot::channel();
        self.pending.write().insert(
            correlation_id.clone(),
            PendingRequest {
                slot: Some(tx),
                deadline,
            },
        );
        let guard = PendingGuard {
            table: Arc::clone(self),
            correlation_id,
        };
        (guard, rx)
    }

    /// Hands `response` to the request waiting on its correlation ID.
    pub fn deliver(&self, response: Message) -> DeliveryOutcome {
        let slot = {
            let mut pending = self.pending.write();
            match pending.get_mut(&response.correlation_id) {
                None => return DeliveryOutcome::Unknown,
                Some(entry) => match entry.slot.take() {
                    None => return DeliveryOutcome::Duplicate,
                    Some(slot) => slot,
                },
            }
        };
        match slot.send(response) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(_) => DeliveryOutcome::Abandoned,
        }
    }

    /// Returns `true` if a request is waiting under `correlation_id`.
    pub fn contains(&self, correlation_id: &str) -> bool {
        self.pending.read().contains_key(correlation_id)
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.pending.read().len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.read().is_empty()
    }

    /// Number of pending requests whose deadline has passed.
    ///
    /// Callers remove their own entries on timeout, so a non-zero value only
    /// shows up transiently.
    pub fn overdue(&self) -> usize {
        let now = Instant::now();
        self.pending
            .read()
            .values()
            .filter(|entry| entry.deadline.is_some_and(|deadline| deadline <= now))
            .count()
    }

    /// Drops every pending slot, waking all waiters with a closed channel.
    pub fn clear(&self) -> usize {
        let mut pending = self.pending.write();
        let count = pending.len();
        pending.clear();
        count
    }

    fn remove(&self, correlation_id: &str) {
        self.pending.write().remove(correlation_id);
    }
}

impl std::fmt::Debug for CorrelationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationTable")
            .field("pending", &self.len())
            .finish()
    }
}

/// Removes its correlation entry when dropped.
#[must_use = "dropping the guard unregisters the pending request"]
pub struct PendingGuard {
    table: Arc<CorrelationTable>,
    correlation_id: String,
}

impl PendingGuard {
    /// The correlation ID this guard owns.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.remove(&self.correlation_id);
    }
}
