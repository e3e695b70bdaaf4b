//! Bus tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default inbound queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// What the bus does with a request it cannot complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnroutablePolicy {
    /// Log and drop; the requester waits out its timeout.
    #[default]
    Drop,
    /// Answer immediately with a fault response, so the requester fails
    /// fast with `Unsupported` or `Handler`.
    Reply,
}

/// Configuration for a [`CommunicationManager`](crate::CommunicationManager).
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Capacity of the inbound queue; sends beyond it fail with `QueueFull`.
    pub queue_capacity: usize,
    /// Timeout applied to requests that do not set their own.
    pub request_timeout: Duration,
    /// Upper bound on concurrently dispatched messages; `None` spawns one
    /// task per message without limit.
    pub max_concurrent_dispatch: Option<usize>,
    /// Handling of requests with no matching handler or a failing handler.
    pub unroutable: UnroutablePolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_concurrent_dispatch: None,
            unroutable: UnroutablePolicy::Drop,
        }
    }
}

impl BusConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the queue capacity. Zero is bumped to one.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Sets the default request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bounds the number of messages dispatched at once.
    pub fn max_concurrent_dispatch(mut self, limit: usize) -> Self {
        self.max_concurrent_dispatch = Some(limit.max(1));
        self
    }

    /// Sets the unroutable request policy.
    pub fn unroutable(mut self, policy: UnroutablePolicy) -> Self {
        self.unroutable = policy;
        self
    }
}
