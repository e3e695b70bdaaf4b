//! Unified error types for the Plexus communication bus.
//!
//! [`BusError`] is what callers of the `send_*` family see. Handler and
//! lifecycle failures have their own types because they originate outside
//! the bus and are only ever logged by it.

use std::time::Duration;

use thiserror::Error;

// =============================================================================
// Bus Errors
// =============================================================================

/// Errors surfaced to callers of the bus API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The message is malformed or has expired.
    #[error("invalid message: {0}")]
    Validation(String),

    /// A filter in the chain rejected the message.
    #[error("message filtered out")]
    Filtered,

    /// The inbound queue has no free capacity.
    #[error("message queue is full (capacity {capacity})")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// No response arrived before the request deadline.
    #[error("request timeout after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the request.
    #[error("request canceled")]
    Canceled,

    /// The target plugin has no handler for the subject.
    #[error("plugin '{plugin_id}' cannot handle subject '{subject}'")]
    Unsupported {
        /// Target plugin.
        plugin_id: String,
        /// Requested subject.
        subject: String,
    },

    /// The target handler failed while processing the request.
    #[error("handler on plugin '{plugin_id}' failed: {reason}")]
    Handler {
        /// Target plugin.
        plugin_id: String,
        /// Failure detail reported by the handler.
        reason: String,
    },

    /// The bus has been shut down.
    #[error("communication bus is closed")]
    Closed,
}

impl BusError {
    /// Creates a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

// =============================================================================
// Handler Errors
// =============================================================================

/// Errors returned by [`MessageHandler::handle_message`](crate::MessageHandler::handle_message).
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// The payload did not have the shape the handler expects.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The handler was interrupted because the bus is shutting down.
    ///
    /// Long-running handlers return this after
    /// [`HandlerContext::shutdown_token`](crate::HandlerContext::shutdown_token)
    /// fires.
    #[error("handler interrupted by shutdown")]
    Interrupted,

    /// Any other handler failure.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Creates a generic handler failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Creates an invalid-payload error.
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

// =============================================================================
// Lifecycle Errors
// =============================================================================

/// Errors returned by a [`LifecycleOracle`](crate::LifecycleOracle).
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// The plugin is not known to the lifecycle manager.
    #[error("plugin '{0}' not found")]
    NotFound(String),

    /// The lifecycle manager could not answer.
    #[error("lifecycle query failed: {0}")]
    Unavailable(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Result type for handler invocations.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Result type for lifecycle queries.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
