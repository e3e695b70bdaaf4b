//! Policy filters evaluated before a message is accepted by the bus.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::message::Message;

/// A policy predicate over outgoing messages.
///
/// Filters run in the order they were added; the first one returning `false`
/// rejects the message before it reaches the queue.
pub trait MessageFilter: Send + Sync {
    /// Returns `true` if the message may be sent.
    fn allow(&self, msg: &Message) -> bool;
}

/// Closure-backed [`MessageFilter`].
pub struct FilterFn<F>(pub F);

impl<F> MessageFilter for FilterFn<F>
where
    F: Fn(&Message) -> bool + Send + Sync,
{
    fn allow(&self, msg: &Message) -> bool {
        (self.0)(msg)
    }
}

/// Sender block-list plus an optional subject allow-list.
///
/// An empty allow-list permits every subject. Both lists can be edited after
/// the filter has been added to a bus.
#[derive(Debug, Default)]
pub struct DefaultMessageFilter {
    allowed_subjects: RwLock<HashSet<String>>,
    blocked_plugins: RwLock<HashSet<String>>,
}

impl DefaultMessageFilter {
    /// Creates a filter that allows everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `subject` to the allow-list.
    pub fn allow_subject(&self, subject: impl Into<String>) {
        self.allowed_subjects.write().insert(subject.into());
    }

    /// Blocks every message sent by `plugin_id`.
    pub fn block_plugin(&self, plugin_id: impl Into<String>) {
        self.blocked_plugins.write().insert(plugin_id.into());
    }

    /// Lifts a block placed by [`block_plugin`](Self::block_plugin).
    pub fn unblock_plugin(&self, plugin_id: &str) {
        self.blocked_plugins.write().remove(plugin_id);
    }
}

impl MessageFilter for DefaultMessageFilter {
    fn allow(&self, msg: &Message) -> bool {
        if self.blocked_plugins.read().contains(&msg.from) {
            return false;
        }
        let allowed = self.allowed_subjects.read();
        allowed.is_empty() || allowed.contains(&msg.subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Payload;

    fn event(from: &str, subject: &str) -> Message {
        Message::event(from, subject, Payload::new())
    }

    #[test]
    fn test_default_filter_allows_everything() {
        let filter = DefaultMessageFilter::new();
        assert!(filter.allow(&event("core", "tick")));
    }

    #[test]
    fn test_blocked_sender() {
        let filter = DefaultMessageFilter::new();
        filter.block_plugin("rogue");
        assert!(!filter.allow(&event("rogue", "tick")));
        assert!(filter.allow(&event("core", "tick")));

        filter.unblock_plugin("rogue");
        assert!(filter.allow(&event("rogue", "tick")));
    }

    #[test]
    fn test_subject_allow_list() {
        let filter = DefaultMessageFilter::new();
        filter.allow_subject("tick");
        assert!(filter.allow(&event("core", "tick")));
        assert!(!filter.allow(&event("core", "tock")));
    }

    #[test]
    fn test_closure_filter() {
        let filter = FilterFn(|msg: &Message| msg.subject != "secret");
        assert!(filter.allow(&event("core", "tick")));
        assert!(!filter.allow(&event("core", "secret")));
    }
}
