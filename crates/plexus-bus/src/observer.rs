//! Optional hook for handler failures that the bus would otherwise only log.

use plexus_core::{HandlerError, Message};

/// A handler failure observed during dispatch.
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    /// Plugin owning the failing handler.
    pub plugin_id: String,
    /// Name of the failing handler.
    pub handler: String,
    /// The message being processed.
    pub message: Message,
    /// What went wrong.
    pub error: HandlerError,
}

/// Receives handler failures from request routing and event fan-out.
///
/// Called synchronously from the dispatch task; implementations should be
/// quick and must not block.
pub trait DeliveryObserver: Send + Sync {
    /// Called once per failed handler invocation.
    fn on_failure(&self, failure: &DeliveryFailure);
}

impl<F> DeliveryObserver for F
where
    F: Fn(&DeliveryFailure) + Send + Sync,
{
    fn on_failure(&self, failure: &DeliveryFailure) {
        self(failure)
    }
}
