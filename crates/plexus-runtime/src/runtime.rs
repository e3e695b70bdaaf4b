//! Host runtime owning the communication bus.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use plexus_runtime::PlexusRuntime;
//!
//! // Loads plexus.toml from the current directory, if any.
//! let runtime = PlexusRuntime::builder().build()?;
//!
//! runtime.plugins().set_state("p1", PluginState::Running);
//! runtime.manager().register_handler("p1", my_handler);
//!
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tracing::info;

use plexus_bus::{BusStats, CommunicationManager};
use plexus_core::{LifecycleOracle, StaticLifecycle};

use crate::config::{ConfigLoader, ConfigResult, PlexusConfig};
use crate::error::RuntimeResult;
use crate::logging;

/// Hosts a [`CommunicationManager`] configured from [`PlexusConfig`].
///
/// By default plugin states are answered by an in-memory
/// [`StaticLifecycle`] reachable through [`plugins`](Self::plugins); hosts
/// with their own lifecycle manager pass it to
/// [`RuntimeBuilder::lifecycle`] instead.
pub struct PlexusRuntime {
    config: PlexusConfig,
    manager: CommunicationManager,
    lifecycle: Arc<dyn LifecycleOracle>,
    plugins: Arc<StaticLifecycle>,
}

impl PlexusRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration, using the in-memory lifecycle
    /// table.
    ///
    /// Initializes logging (unless a subscriber is already installed) and
    /// starts the bus. Must be called from within a Tokio runtime.
    pub fn from_config(config: &PlexusConfig) -> Self {
        let plugins = Arc::new(StaticLifecycle::new());
        let lifecycle: Arc<dyn LifecycleOracle> = plugins.clone();
        Self::assemble(config, lifecycle, plugins)
    }

    /// Creates a runtime whose plugin states come from `lifecycle`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_lifecycle(config: &PlexusConfig, lifecycle: Arc<dyn LifecycleOracle>) -> Self {
        Self::assemble(config, lifecycle, Arc::new(StaticLifecycle::new()))
    }

    fn assemble(
        config: &PlexusConfig,
        lifecycle: Arc<dyn LifecycleOracle>,
        plugins: Arc<StaticLifecycle>,
    ) -> Self {
        logging::init_from_config(&config.logging);

        let manager =
            CommunicationManager::with_config(Arc::clone(&lifecycle), config.bus.to_bus_config());

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            manager,
            lifecycle,
            plugins,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PlexusConfig {
        &self.config
    }

    /// Returns the communication bus.
    pub fn manager(&self) -> &CommunicationManager {
        &self.manager
    }

    /// Returns the lifecycle oracle the bus consults.
    pub fn lifecycle(&self) -> &Arc<dyn LifecycleOracle> {
        &self.lifecycle
    }

    /// Returns the in-memory plugin state table.
    ///
    /// Only consulted by the bus when no external lifecycle was supplied.
    pub fn plugins(&self) -> &Arc<StaticLifecycle> {
        &self.plugins
    }

    /// Returns current bus statistics.
    pub fn stats(&self) -> BusStats {
        self.manager.stats()
    }

    /// Returns `true` until [`stop`](Self::stop) has run.
    pub fn is_running(&self) -> bool {
        !self.manager.is_closed()
    }

    /// Shuts the bus down, releasing waiting requesters.
    pub async fn stop(&self) {
        if !self.is_running() {
            return;
        }
        info!("Stopping Plexus runtime");
        self.manager.shutdown().await;
        info!(stats = %self.manager.stats(), "Runtime stopped");
    }

    /// Runs until Ctrl+C or SIGTERM, then stops.
    ///
    /// # Errors
    ///
    /// Fails if the signal handlers cannot be installed.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Plexus runtime is now running. Press Ctrl+C to stop.");
        let result = wait_for_shutdown().await;
        self.stop().await;
        result
    }

    /// Runs until `shutdown` completes, then stops.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        shutdown.await;
        self.stop().await;
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`PlexusRuntime`] with layered configuration.
///
/// ```rust,ignore
/// let runtime = PlexusRuntime::builder()
///     .config_file("config/plexus.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    lifecycle: Option<Arc<dyn LifecycleOracle>>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            lifecycle: None,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g. "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: PlexusConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses an external lifecycle manager for plugin states.
    pub fn lifecycle(mut self, lifecycle: Arc<dyn LifecycleOracle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Loads the configuration and builds the runtime.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> ConfigResult<PlexusRuntime> {
        let config = self.config_loader.load()?;
        Ok(match self.lifecycle {
            Some(lifecycle) => PlexusRuntime::with_lifecycle(&config, lifecycle),
            None => PlexusRuntime::from_config(&config),
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusSettings;
    use plexus_bus::{RequestOptions, UnroutablePolicy};
    use plexus_core::{BusError, HandlerError, Message, Payload, PluginState, handler_fn};
    use std::time::Duration;

    fn config() -> PlexusConfig {
        PlexusConfig {
            bus: BusSettings {
                queue_capacity: 8,
                request_timeout_ms: 2_000,
                unroutable: UnroutablePolicy::Reply,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_runtime_applies_bus_settings() {
        let runtime = PlexusRuntime::from_config(&config());
        let bus = runtime.manager().config();
        assert_eq!(bus.queue_capacity, 8);
        assert_eq!(bus.request_timeout, Duration::from_secs(2));
        assert_eq!(bus.unroutable, UnroutablePolicy::Reply);
        assert!(runtime.is_running());
    }

    #[tokio::test]
    async fn test_plugins_table_drives_fan_out_and_requests() {
        let runtime = PlexusRuntime::from_config(&config());
        runtime.plugins().set_state("p1", PluginState::Running);
        runtime.manager().register_handler(
            "p1",
            Arc::new(handler_fn(["echo"], |msg: Message| async move {
                Ok::<_, HandlerError>(msg.payload)
            })),
        );

        let reply = runtime
            .manager()
            .send_request("core", "p1", "echo", Payload::new(), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(reply.from, "p1");
        assert_eq!(
            runtime.lifecycle().plugin_state("p1").await.unwrap(),
            PluginState::Running
        );
    }

    #[tokio::test]
    async fn test_run_until_stops_bus() {
        let runtime = PlexusRuntime::from_config(&config());
        runtime
            .run_until(tokio::time::sleep(Duration::from_millis(10)))
            .await;

        assert!(!runtime.is_running());
        assert_eq!(
            runtime.manager().send_event("core", "tick", Payload::new()),
            Err(BusError::Closed)
        );

        // Stopping twice is a no-op.
        runtime.stop().await;
    }

    #[tokio::test]
    async fn test_builder_with_external_lifecycle() {
        let external = Arc::new(StaticLifecycle::running(["p9"]));
        let runtime = PlexusRuntime::builder()
            .without_env()
            .search_path(std::env::temp_dir().join("plexus-runtime-no-config"))
            .merge(config())
            .lifecycle(external)
            .build()
            .unwrap();

        assert_eq!(runtime.config().bus.queue_capacity, 8);
        assert!(runtime.lifecycle().plugin_state("p9").await.unwrap().is_running());
        assert!(runtime.plugins().running_plugins().is_empty());
    }
}
