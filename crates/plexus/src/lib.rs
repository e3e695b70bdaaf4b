//! # Plexus
//!
//! An in-process communication bus letting plugins of one host exchange
//! messages without knowing about each other.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  send_*   ┌──────────────┐   ┌───────────────┐   ┌──────────────────────────┐
//! │ plugin A │──────────▶│ filter chain │──▶│ bounded queue │──▶│ dispatch (task/message)  │
//! └──────────┘           └──────────────┘   └───────────────┘   └──────────────────────────┘
//!      ▲                                                          │ request  → first handler of `to`
//!      │ response (correlation ID)                                │ event    → every running plugin
//!      └──────────────────────────────────────────────────────────┘ response → waiting requester
//! ```
//!
//! - **Core** (`plexus-core`): message model, handler/filter/lifecycle contracts
//! - **Bus** (`plexus-bus`): `CommunicationManager`, routing and correlation
//! - **Runtime** (`plexus-runtime`): configuration, logging, shutdown handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plexus::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = PlexusRuntime::builder().build()?;
//!     runtime.plugins().set_state("greeter", PluginState::Running);
//!
//!     runtime.manager().register_handler(
//!         "greeter",
//!         Arc::new(handler_fn(["hello"], |msg: Message| async move {
//!             HandlerResult::Ok(msg.payload)
//!         })),
//!     );
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: `plexus.toml` configuration files
//! - `yaml-config`: `plexus.yaml` configuration files
//! - `json-log`: JSON log output

pub use plexus_bus as bus;
pub use plexus_core as core;
pub use plexus_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use plexus::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use plexus_runtime::{PlexusConfig, PlexusRuntime};

    // Bus
    pub use plexus_bus::{
        BusConfig, BusStats, CommunicationManager, DeliveryFailure, RequestOptions,
        UnroutablePolicy,
    };

    // Message model and contracts
    pub use plexus_core::prelude::*;
    pub use plexus_core::{
        BoxedHandler, FilterFn, LoggingMessageHandler, StaticLifecycle,
    };
}
