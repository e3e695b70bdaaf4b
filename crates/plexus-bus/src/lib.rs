//! # Plexus Bus
//!
//! In-process message routing between plugins.
//!
//! [`CommunicationManager`] accepts messages from any plugin and delivers
//! them asynchronously according to their type:
//!
//! - **Requests** go to the first handler of the target plugin accepting the
//!   subject; the requester suspends in
//!   [`send_request`](CommunicationManager::send_request) until the matching
//!   response arrives or its timeout elapses.
//! - **Events and broadcasts** fan out to every running plugin except the
//!   sender, one concurrent delivery per accepting handler.
//! - **Responses** complete the pending request with the same correlation ID.
//!
//! Sending never blocks: a full queue is reported as
//! [`BusError::QueueFull`](plexus_core::BusError::QueueFull).

mod correlation;
mod dispatcher;
mod filters;
mod manager;
mod observer;
mod registry;
mod stats;

pub mod config;

pub use config::{BusConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_REQUEST_TIMEOUT, UnroutablePolicy};
pub use manager::{CommunicationManager, RequestOptions};
pub use observer::{DeliveryFailure, DeliveryObserver};
pub use registry::HandlerRegistry;
pub use stats::BusStats;
