//! The handler contract plugins implement to receive bus messages.
//!
//! A handler is a capability predicate ([`can_handle`](MessageHandler::can_handle))
//! paired with async processing logic
//! ([`handle_message`](MessageHandler::handle_message)). Plugins register any
//! number of handlers; for requests the bus picks the first one, in
//! registration order, whose predicate accepts the subject.
//!
//! ```rust,ignore
//! use plexus_core::{handler_fn, HandlerResult, Message, Payload};
//!
//! let echo = handler_fn(["echo"], |msg: Message| async move {
//!     HandlerResult::Ok(msg.payload)
//! });
//! bus.register_handler("p1", echo);
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::HandlerResult;
use crate::message::{Message, Payload};

// =============================================================================
// HandlerContext
// =============================================================================

/// Per-invocation context handed to a handler.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    plugin_id: String,
    shutdown: CancellationToken,
}

impl HandlerContext {
    /// Creates a context for a handler owned by `plugin_id`.
    pub fn new(plugin_id: impl Into<String>, shutdown: CancellationToken) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            shutdown,
        }
    }

    /// The plugin the invoked handler is registered under.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Token cancelled when the bus shuts down.
    ///
    /// Long-running handlers should `select!` on
    /// [`cancelled`](CancellationToken::cancelled) and bail out early.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Returns `true` once the bus has begun shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

// =============================================================================
// MessageHandler trait
// =============================================================================

/// A plugin-registered message handler.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Whether this handler accepts messages with the given subject.
    fn can_handle(&self, subject: &str) -> bool;

    /// Processes one message.
    ///
    /// For requests, the payload of the returned message becomes the payload
    /// of the response; every other field is rebuilt by the bus. For events
    /// and broadcasts the returned message is discarded.
    async fn handle_message(&self, ctx: &HandlerContext, msg: Message) -> HandlerResult<Message>;

    /// A short name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A shared, type-erased handler.
///
/// The registry compares handlers by `Arc` identity, so keep a clone of the
/// registered value around to unregister it later.
pub type BoxedHandler = Arc<dyn MessageHandler>;

// =============================================================================
// Subject patterns
// =============================================================================

/// Matches a subject against a pattern.
///
/// `*` matches every subject, a trailing `*` matches by prefix
/// (`"user.*"` accepts `"user.created"`), anything else must match exactly.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => subject.starts_with(prefix),
        None => pattern == subject,
    }
}

// =============================================================================
// FnHandler
// =============================================================================

/// A handler built from a list of subject patterns and an async closure.
///
/// The closure receives the message and returns the response payload.
pub struct FnHandler<F> {
    name: String,
    patterns: Vec<String>,
    func: F,
}

impl<F> FnHandler<F> {
    /// Overrides the name reported in logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The subject patterns this handler accepts.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Creates an [`FnHandler`] accepting the given subject patterns.
pub fn handler_fn<I, S, F, Fut>(patterns: I, func: F) -> FnHandler<F>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult<Payload>> + Send,
{
    let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
    FnHandler {
        name: format!("fn[{}]", patterns.join(",")),
        patterns,
        func,
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult<Payload>> + Send,
{
    fn can_handle(&self, subject: &str) -> bool {
        self.patterns.iter().any(|p| subject_matches(p, subject))
    }

    async fn handle_message(&self, _ctx: &HandlerContext, msg: Message) -> HandlerResult<Message> {
        let reply = Message::response_to(&msg, Payload::new());
        let payload = (self.func)(msg).await?;
        Ok(Message { payload, ..reply })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// =============================================================================
// LoggingMessageHandler
// =============================================================================

/// Logs every message it receives and acknowledges it with
/// `{"received": true}`.
///
/// Accepts every subject, which makes it a convenient catch-all registered
/// last in a plugin's handler list.
pub struct LoggingMessageHandler {
    plugin_id: String,
}

impl LoggingMessageHandler {
    /// Creates a logging handler for `plugin_id`.
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
        }
    }
}

#[async_trait]
impl MessageHandler for LoggingMessageHandler {
    fn can_handle(&self, _subject: &str) -> bool {
        true
    }

    async fn handle_message(&self, _ctx: &HandlerContext, msg: Message) -> HandlerResult<Message> {
        let payload = serde_json::to_string(&msg.payload)?;
        info!(
            plugin_id = %self.plugin_id,
            message_id = %msg.id,
            kind = %msg.kind,
            from = %msg.from,
            subject = %msg.subject,
            payload = %payload,
            "Message received"
        );

        let mut ack = Payload::new();
        ack.insert("received".into(), Value::Bool(true));
        Ok(Message::response_to(&msg, ack))
    }

    fn name(&self) -> &str {
        "logging"
    }
}
