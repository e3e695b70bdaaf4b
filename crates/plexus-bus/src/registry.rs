//! Per-plugin handler registry.
//!
//! Each plugin owns an ordered list of handlers. Lookups hand out cloned
//! `Arc` snapshots so that capability checks and handler invocations never
//! run under the registry lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use plexus_core::BoxedHandler;

/// Maps plugin IDs to their handlers, in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Vec<BoxedHandler>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list of `plugin_id`.
    pub fn register(&self, plugin_id: impl Into<String>, handler: BoxedHandler) {
        let plugin_id = plugin_id.into();
        let name = handler.name().to_string();
        self.handlers
            .write()
            .entry(plugin_id.clone())
            .or_default()
            .push(handler);
        info!(plugin_id = %plugin_id, handler = %name, "Message handler registered");
    }

    /// Removes the first registration of `handler` (by `Arc` identity).
    ///
    /// Returns `true` if a handler was removed. A plugin whose list becomes
    /// empty is dropped from the registry entirely.
    pub fn unregister(&self, plugin_id: &str, handler: &BoxedHandler) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(plugin_id) else {
            return false;
        };
        let Some(pos) = list.iter().position(|h| Arc::ptr_eq(h, handler)) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            handlers.remove(plugin_id);
        }
        info!(plugin_id = %plugin_id, "Message handler unregistered");
        true
    }

    /// Removes every handler of `plugin_id`, returning how many were dropped.
    pub fn unregister_plugin(&self, plugin_id: &str) -> usize {
        let removed = self
            .handlers
            .write()
            .remove(plugin_id)
            .map_or(0, |list| list.len());
        if removed > 0 {
            info!(plugin_id = %plugin_id, count = removed, "Plugin handlers unregistered");
        }
        removed
    }

    /// Returns a snapshot of the handlers of `plugin_id`, if it has any.
    pub fn handlers_for(&self, plugin_id: &str) -> Option<Vec<BoxedHandler>> {
        self.handlers.read().get(plugin_id).cloned()
    }

    /// Returns the first handler of `plugin_id` accepting `subject`.
    pub fn first_match(&self, plugin_id: &str, subject: &str) -> Option<BoxedHandler> {
        self.handlers_for(plugin_id)?
            .into_iter()
            .find(|h| h.can_handle(subject))
    }

    /// Returns a snapshot of every plugin's handlers except `excluded`.
    pub fn snapshot_except(&self, excluded: &str) -> Vec<(String, Vec<BoxedHandler>)> {
        self.handlers
            .read()
            .iter()
            .filter(|(id, _)| id.as_str() != excluded)
            .map(|(id, list)| (id.clone(), list.clone()))
            .collect()
    }

    /// IDs of all plugins with at least one handler.
    pub fn plugin_ids(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }

    /// Number of handlers registered by `plugin_id`.
    pub fn handler_count(&self, plugin_id: &str) -> usize {
        self.handlers.read().get(plugin_id).map_or(0, Vec::len)
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("plugins", &self.handlers.read().len())
            .field("handlers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::{HandlerError, Message, handler_fn};

    fn named(pattern: &'static str, tag: &'static str) -> BoxedHandler {
        Arc::new(
            handler_fn([pattern], |msg: Message| async move { Ok::<_, HandlerError>(msg.payload) }).named(tag),
        )
    }

    #[test]
    fn test_first_match_wins_in_registration_order() {
        let registry = HandlerRegistry::new();
        registry.register("p1", named("echo", "first"));
        registry.register("p1", named("*", "second"));

        assert_eq!(registry.first_match("p1", "echo").unwrap().name(), "first");
        assert_eq!(registry.first_match("p1", "other").unwrap().name(), "second");
        assert!(registry.first_match("p2", "echo").is_none());
    }

    #[test]
    fn test_unregister_by_identity() {
        let registry = HandlerRegistry::new();
        let a = named("echo", "a");
        let b = named("echo", "b");
        registry.register("p1", Arc::clone(&a));
        registry.register("p1", Arc::clone(&b));

        assert!(registry.unregister("p1", &a));
        assert!(!registry.unregister("p1", &a));
        assert_eq!(registry.first_match("p1", "echo").unwrap().name(), "b");

        assert!(registry.unregister("p1", &b));
        assert!(registry.is_empty());
        assert!(registry.handlers_for("p1").is_none());
    }

    #[test]
    fn test_unregister_plugin_and_snapshot() {
        let registry = HandlerRegistry::new();
        registry.register("core", named("*", "core"));
        registry.register("p1", named("*", "p1a"));
        registry.register("p1", named("*", "p1b"));
        registry.register("p2", named("*", "p2"));
        assert_eq!(registry.len(), 4);

        let snapshot = registry.snapshot_except("core");
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|(id, _)| id != "core"));

        assert_eq!(registry.unregister_plugin("p1"), 2);
        assert_eq!(registry.handler_count("p1"), 0);
        assert_eq!(registry.unregister_plugin("p1"), 0);

        let mut ids = registry.plugin_ids();
        ids.sort();
        assert_eq!(ids, vec!["core".to_string(), "p2".to_string()]);
    }

    #[test]
    fn test_snapshot_is_detached_from_lock() {
        let registry = HandlerRegistry::new();
        registry.register("p1", named("*", "a"));
        let snapshot = registry.handlers_for("p1").unwrap();
        registry.unregister_plugin("p1");
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].can_handle("x"));
    }
}
