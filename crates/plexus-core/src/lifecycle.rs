//! Boundary to the external plugin lifecycle manager.
//!
//! The bus never owns plugin state. It only asks a [`LifecycleOracle`]
//! whether a plugin is running before fanning an event or broadcast out to
//! it. [`StaticLifecycle`] is a small in-memory oracle for hosts that do not
//! run a full lifecycle manager.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, LifecycleResult};

/// Lifecycle state of a plugin instance.
///
/// ```text
/// Installed ──► Starting ──► Running ──► Stopping ──► Stopped
///                  │            │
///                  └──► Error ◄─┘        Running ──► Upgrading ──► Running
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Installed but never started.
    Installed,
    /// Start in progress.
    Starting,
    /// Running and eligible for event delivery.
    Running,
    /// Stop in progress.
    Stopping,
    /// Stopped.
    Stopped,
    /// Failed to start or crashed.
    Error,
    /// Being replaced by a newer version.
    Upgrading,
}

impl PluginState {
    /// Whether the plugin should receive events and broadcasts.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns the lowercase name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Upgrading => "upgrading",
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answers lifecycle queries about plugins.
#[async_trait]
pub trait LifecycleOracle: Send + Sync {
    /// Returns the current state of `plugin_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] for unknown plugins. The bus
    /// treats any error as "not running".
    async fn plugin_state(&self, plugin_id: &str) -> LifecycleResult<PluginState>;
}

/// In-memory [`LifecycleOracle`] backed by a state table.
#[derive(Debug, Default)]
pub struct StaticLifecycle {
    states: RwLock<HashMap<String, PluginState>>,
}

impl StaticLifecycle {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table with every listed plugin in the running state.
    pub fn running<I, S>(plugin_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let states = plugin_ids
            .into_iter()
            .map(|id| (id.into(), PluginState::Running))
            .collect();
        Self {
            states: RwLock::new(states),
        }
    }

    /// Records the state of `plugin_id`, returning the previous one.
    pub fn set_state(&self, plugin_id: impl Into<String>, state: PluginState) -> Option<PluginState> {
        self.states.write().insert(plugin_id.into(), state)
    }

    /// Forgets `plugin_id`, as on uninstall.
    pub fn remove(&self, plugin_id: &str) -> Option<PluginState> {
        self.states.write().remove(plugin_id)
    }

    /// Returns the IDs of all running plugins.
    pub fn running_plugins(&self) -> Vec<String> {
        self.states
            .read()
            .iter()
            .filter(|(_, state)| state.is_running())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl LifecycleOracle for StaticLifecycle {
    async fn plugin_state(&self, plugin_id: &str) -> LifecycleResult<PluginState> {
        self.states
            .read()
            .get(plugin_id)
            .copied()
            .ok_or_else(|| LifecycleError::NotFound(plugin_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_lifecycle_states() {
        let lifecycle = StaticLifecycle::running(["p1"]);
        assert_eq!(lifecycle.plugin_state("p1").await.unwrap(), PluginState::Running);
        assert!(matches!(
            lifecycle.plugin_state("p2").await,
            Err(LifecycleError::NotFound(_))
        ));

        let previous = lifecycle.set_state("p1", PluginState::Stopped);
        assert_eq!(previous, Some(PluginState::Running));
        assert!(!lifecycle.plugin_state("p1").await.unwrap().is_running());
        assert!(lifecycle.running_plugins().is_empty());

        lifecycle.remove("p1");
        assert!(lifecycle.plugin_state("p1").await.is_err());
    }
}
