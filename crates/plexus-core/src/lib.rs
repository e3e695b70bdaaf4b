//! # Plexus Core
//!
//! Shared vocabulary of the Plexus plugin communication bus.
//!
//! This crate defines what travels on the bus and the contracts the bus
//! talks to, without any of the routing machinery:
//!
//! - **Message model**: [`Message`], [`MessageType`], [`Payload`] and
//!   validation via [`Message::validate`]
//! - **Handler contract**: [`MessageHandler`] implemented by plugins, plus the
//!   closure-based [`FnHandler`] and the catch-all [`LoggingMessageHandler`]
//! - **Filter contract**: [`MessageFilter`] implemented by hosts, plus the
//!   reference [`DefaultMessageFilter`]
//! - **Lifecycle boundary**: [`LifecycleOracle`] answered by the external
//!   lifecycle manager, or by the in-memory [`StaticLifecycle`]
//! - **Errors**: [`BusError`] and friends
//!
//! The routing engine lives in `plexus-bus`.

pub mod error;
pub mod filter;
pub mod handler;
pub mod lifecycle;
pub mod message;

pub use error::{
    BusError, BusResult, HandlerError, HandlerResult, LifecycleError, LifecycleResult,
};
pub use filter::{DefaultMessageFilter, FilterFn, MessageFilter};
pub use handler::{
    BoxedHandler, FnHandler, HandlerContext, LoggingMessageHandler, MessageHandler, handler_fn,
    subject_matches,
};
pub use lifecycle::{LifecycleOracle, PluginState, StaticLifecycle};
pub use message::{Fault, FaultKind, Message, MessageType, Payload, generate_message_id};

/// Prelude for common imports.
pub mod prelude {
    pub use super::error::{BusError, BusResult, HandlerError, HandlerResult};
    pub use super::filter::{DefaultMessageFilter, MessageFilter};
    pub use super::handler::{HandlerContext, MessageHandler, handler_fn};
    pub use super::lifecycle::{LifecycleOracle, PluginState};
    pub use super::message::{Message, MessageType, Payload};
}
