//! The ordered filter chain consulted on every send.

use std::sync::Arc;

use parking_lot::RwLock;

use plexus_core::{Message, MessageFilter};

/// Ordered sequence of [`MessageFilter`]s.
#[derive(Default)]
pub struct FilterChain {
    filters: RwLock<Vec<Arc<dyn MessageFilter>>>,
}

impl FilterChain {
    /// Creates an empty chain, which allows every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `filter` to the end of the chain.
    pub fn push(&self, filter: Arc<dyn MessageFilter>) {
        self.filters.write().push(filter);
    }

    /// Removes every filter.
    pub fn clear(&self) {
        self.filters.write().clear();
    }

    /// Number of filters in the chain.
    pub fn len(&self) -> usize {
        self.filters.read().len()
    }

    /// Returns `true` if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.filters.read().is_empty()
    }

    /// Runs the chain over `msg`, stopping at the first rejection.
    ///
    /// Filters are evaluated against a snapshot, so a filter may itself add
    /// filters without deadlocking.
    pub fn allows(&self, msg: &Message) -> bool {
        let filters = self.filters.read().clone();
        filters.iter().all(|filter| filter.allow(msg))
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::{FilterFn, Payload};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_empty_chain_allows() {
        let chain = FilterChain::new();
        assert!(chain.allows(&Message::event("core", "tick", Payload::new())));
    }

    #[test]
    fn test_short_circuits_on_first_rejection() {
        let calls = Arc::new(AtomicUsize::new(0));
        let after = Arc::clone(&calls);

        let chain = FilterChain::new();
        chain.push(Arc::new(FilterFn(|_: &Message| false)));
        chain.push(Arc::new(FilterFn(move |_: &Message| {
            after.fetch_add(1, Ordering::SeqCst);
            true
        })));

        assert!(!chain.allows(&Message::event("core", "tick", Payload::new())));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        chain.clear();
        assert!(chain.is_empty());
        assert!(chain.allows(&Message::event("core", "tick", Payload::new())));
    }
}
