//! Bus counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub accepted: AtomicU64,
    pub invalid: AtomicU64,
    pub filtered: AtomicU64,
    pub queue_full: AtomicU64,
    pub dispatched: AtomicU64,
    pub unroutable: AtomicU64,
    pub handler_failures: AtomicU64,
    pub responses_delivered: AtomicU64,
    pub responses_dropped: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, pending_requests: usize, queued: usize) -> BusStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        BusStats {
            accepted: load(&self.accepted),
            invalid: load(&self.invalid),
            filtered: load(&self.filtered),
            queue_full: load(&self.queue_full),
            dispatched: load(&self.dispatched),
            unroutable: load(&self.unroutable),
            handler_failures: load(&self.handler_failures),
            responses_delivered: load(&self.responses_delivered),
            responses_dropped: load(&self.responses_dropped),
            pending_requests,
            queued,
        }
    }
}

/// Point-in-time statistics about a bus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Messages accepted into the queue.
    pub accepted: u64,
    /// Sends rejected by validation.
    pub invalid: u64,
    /// Sends rejected by the filter chain.
    pub filtered: u64,
    /// Sends rejected because the queue was full.
    pub queue_full: u64,
    /// Messages taken off the queue and dispatched.
    pub dispatched: u64,
    /// Requests with no matching handler.
    pub unroutable: u64,
    /// Handler invocations that failed or panicked.
    pub handler_failures: u64,
    /// Responses handed to a waiting requester.
    pub responses_delivered: u64,
    /// Responses with an unknown, duplicate or abandoned correlation ID.
    pub responses_dropped: u64,
    /// Requests currently awaiting a response.
    pub pending_requests: usize,
    /// Messages currently waiting in the queue.
    pub queued: usize,
}

impl std::fmt::Display for BusStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Messages: {} accepted, {} dispatched, {} queued ({} invalid, {} filtered, {} queue full); \
             Requests: {} pending, {} unroutable, {} responses delivered, {} dropped; \
             {} handler failures",
            self.accepted,
            self.dispatched,
            self.queued,
            self.invalid,
            self.filtered,
            self.queue_full,
            self.pending_requests,
            self.unroutable,
            self.responses_delivered,
            self.responses_dropped,
            self.handler_failures
        )
    }
}
