//! Plexus Runtime - host layer for the Plexus plugin communication bus.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `PlexusConfig`)
//! - Logging setup (`LoggingBuilder`, `init_from_config`)
//! - A runtime owning the bus and shutting it down on Ctrl+C/SIGTERM
//!   (`PlexusRuntime`)
//!
//! ```ignore
//! use plexus_runtime::PlexusRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = PlexusRuntime::builder().build()?;
//!     runtime.manager().register_handler("p1", my_handler);
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, PlexusConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents, init_from_config};
pub use runtime::{PlexusRuntime, RuntimeBuilder};

// Re-export tracing for use by plugins
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for plugin code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
