//! The plugin communication manager.
//!
//! [`CommunicationManager`] is the bus API handed to plugins and hosts. It
//! owns:
//!
//! - the **handler registry** (plugin ID → ordered handlers),
//! - the **filter chain** evaluated on every send,
//! - the **correlation table** of requests awaiting a response,
//! - the bounded **inbound queue** and the dispatch loop draining it.
//!
//! Every `send_*` call validates the message, runs the filter chain and then
//! attempts a non-blocking enqueue. Only [`send_request`](CommunicationManager::send_request)
//! suspends, until its response arrives, its deadline passes, or it is
//! cancelled.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use plexus_bus::{CommunicationManager, RequestOptions};
//! use plexus_core::{StaticLifecycle, handler_fn, Message, Payload};
//!
//! let bus = CommunicationManager::new(Arc::new(StaticLifecycle::running(["p1"])));
//! bus.register_handler("p1", Arc::new(handler_fn(["echo"], |msg: Message| async move {
//!     Ok(msg.payload)
//! })));
//!
//! let reply = bus
//!     .send_request("core", "p1", "echo", Payload::new(), RequestOptions::default())
//!     .await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use plexus_core::{
    BoxedHandler, BusError, BusResult, HandlerContext, LifecycleOracle, Message, MessageFilter,
    Payload, generate_message_id,
};

use crate::config::BusConfig;
use crate::correlation::CorrelationTable;
use crate::dispatcher::run_dispatch_loop;
use crate::filters::FilterChain;
use crate::observer::{DeliveryFailure, DeliveryObserver};
use crate::registry::HandlerRegistry;
use crate::stats::{BusStats, Counters};

// =============================================================================
// RequestOptions
// =============================================================================

/// Per-call options for [`CommunicationManager::send_request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
    reply_to: Option<String>,
}

impl RequestOptions {
    /// Options using the bus defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the bus-wide request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Aborts the request with [`BusError::Canceled`] once `token` fires.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Addresses the response to `plugin_id` instead of the sender.
    pub fn reply_to(mut self, plugin_id: impl Into<String>) -> Self {
        self.reply_to = Some(plugin_id.into());
        self
    }
}

// =============================================================================
// BusState (internal)
// =============================================================================

/// State shared between the manager handles, the dispatch loop and the
/// dispatch tasks.
pub(crate) struct BusState {
    pub(crate) config: BusConfig,
    pub(crate) registry: HandlerRegistry,
    pub(crate) filters: FilterChain,
    pub(crate) pending: Arc<CorrelationTable>,
    pub(crate) lifecycle: Arc<dyn LifecycleOracle>,
    pub(crate) counters: Counters,
    pub(crate) shutdown: CancellationToken,
    observer: RwLock<Option<Arc<dyn DeliveryObserver>>>,
    inbound: mpsc::Sender<Message>,
    dispatch_loop: Mutex<Option<JoinHandle<()>>>,
}

impl BusState {
    /// Validates, filters and enqueues `msg` without blocking.
    pub(crate) fn submit(&self, mut msg: Message) -> BusResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(BusError::Closed);
        }

        if let Err(err) = msg.validate() {
            Counters::bump(&self.counters.invalid);
            return Err(err);
        }

        if !self.filters.is_empty() && !self.filters.allows(&msg) {
            Counters::bump(&self.counters.filtered);
            debug!(
                message_id = %msg.id,
                from = %msg.from,
                subject = %msg.subject,
                "Message filtered out"
            );
            return Err(BusError::Filtered);
        }

        msg.timestamp = Utc::now();

        match self.inbound.try_send(msg) {
            Ok(()) => {
                Counters::bump(&self.counters.accepted);
                Ok(())
            }
            Err(TrySendError::Full(msg)) => {
                Counters::bump(&self.counters.queue_full);
                warn!(
                    message_id = %msg.id,
                    from = %msg.from,
                    subject = %msg.subject,
                    capacity = self.config.queue_capacity,
                    "Message queue is full"
                );
                Err(BusError::QueueFull {
                    capacity: self.config.queue_capacity,
                })
            }
            Err(TrySendError::Closed(_)) => Err(BusError::Closed),
        }
    }

    /// Builds the context for a handler owned by `plugin_id`.
    pub(crate) fn handler_context(&self, plugin_id: &str) -> HandlerContext {
        HandlerContext::new(plugin_id, self.shutdown.child_token())
    }

    /// Counts a handler failure and forwards it to the observer, if any.
    pub(crate) fn report_failure(&self, failure: DeliveryFailure) {
        Counters::bump(&self.counters.handler_failures);
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer.on_failure(&failure);
        }
    }

    fn queued(&self) -> usize {
        self.inbound.max_capacity() - self.inbound.capacity()
    }
}

impl Drop for BusState {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// =============================================================================
// CommunicationManager
// =============================================================================

/// In-process message router between plugins.
///
/// Cloning is cheap and yields another handle to the same bus. The bus stops
/// when [`shutdown`](Self::shutdown) is called or the last handle is dropped.
#[derive(Clone)]
pub struct CommunicationManager {
    state: Arc<BusState>,
}

impl CommunicationManager {
    /// Creates a bus with the default configuration.
    ///
    /// Must be called from within a Tokio runtime: the dispatch loop is
    /// spawned immediately.
    pub fn new(lifecycle: Arc<dyn LifecycleOracle>) -> Self {
        Self::with_config(lifecycle, BusConfig::default())
    }

    /// Creates a bus with `config`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_config(lifecycle: Arc<dyn LifecycleOracle>, config: BusConfig) -> Self {
        let (inbound, rx) = mpsc::channel(config.queue_capacity.max(1));
        let shutdown = CancellationToken::new();
        let limit = config
            .max_concurrent_dispatch
            .map(|n| Arc::new(Semaphore::new(n)));

        info!(
            queue_capacity = config.queue_capacity,
            request_timeout = ?config.request_timeout,
            max_concurrent_dispatch = ?config.max_concurrent_dispatch,
            unroutable = ?config.unroutable,
            "Communication bus created"
        );

        let state = Arc::new(BusState {
            config,
            registry: HandlerRegistry::new(),
            filters: FilterChain::new(),
            pending: Arc::new(CorrelationTable::new()),
            lifecycle,
            counters: Counters::default(),
            shutdown: shutdown.clone(),
            observer: RwLock::new(None),
            inbound,
            dispatch_loop: Mutex::new(None),
        });

        let handle = tokio::spawn(run_dispatch_loop(
            Arc::downgrade(&state),
            rx,
            shutdown,
            limit,
        ));
        *state.dispatch_loop.lock() = Some(handle);

        Self { state }
    }

    /// Returns the bus configuration.
    pub fn config(&self) -> &BusConfig {
        &self.state.config
    }

    // ─── Handlers ────────────────────────────────────────────────────────────

    /// Appends `handler` to the handlers of `plugin_id`.
    ///
    /// Keep a clone of the `Arc` to unregister it later.
    pub fn register_handler(&self, plugin_id: impl Into<String>, handler: BoxedHandler) {
        self.state.registry.register(plugin_id, handler);
    }

    /// Removes a handler previously passed to
    /// [`register_handler`](Self::register_handler).
    pub fn unregister_handler(&self, plugin_id: &str, handler: &BoxedHandler) -> bool {
        self.state.registry.unregister(plugin_id, handler)
    }

    /// Removes every handler of `plugin_id`, as on uninstall.
    pub fn unregister_plugin(&self, plugin_id: &str) -> usize {
        self.state.registry.unregister_plugin(plugin_id)
    }

    /// Returns the handler registry.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.state.registry
    }

    // ─── Filters ─────────────────────────────────────────────────────────────

    /// Appends `filter` to the filter chain.
    pub fn add_filter(&self, filter: Arc<dyn MessageFilter>) {
        self.state.filters.push(filter);
    }

    /// Removes every filter.
    pub fn clear_filters(&self) {
        self.state.filters.clear();
    }

    /// Number of filters in the chain.
    pub fn filter_count(&self) -> usize {
        self.state.filters.len()
    }

    // ─── Observability ───────────────────────────────────────────────────────

    /// Installs a hook receiving every handler failure.
    pub fn set_delivery_observer(&self, observer: Arc<dyn DeliveryObserver>) {
        *self.state.observer.write() = Some(observer);
    }

    /// Returns current bus statistics.
    pub fn stats(&self) -> BusStats {
        self.state
            .counters
            .snapshot(self.state.pending.len(), self.state.queued())
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.state.pending.len()
    }

    /// Number of pending requests whose deadline has passed but whose caller
    /// has not yet been woken.
    pub fn overdue_requests(&self) -> usize {
        self.state.pending.overdue()
    }

    /// Returns `true` if a request is waiting under `correlation_id`.
    pub fn is_pending(&self, correlation_id: &str) -> bool {
        self.state.pending.contains(correlation_id)
    }

    // ─── Sending ─────────────────────────────────────────────────────────────

    /// Validates, filters and enqueues `msg`.
    ///
    /// Returns as soon as the enqueue attempt succeeds or fails.
    ///
    /// # Errors
    ///
    /// [`BusError::Validation`], [`BusError::Filtered`],
    /// [`BusError::QueueFull`] or [`BusError::Closed`].
    pub fn send_message(&self, msg: Message) -> BusResult<()> {
        self.state.submit(msg)
    }

    /// Sends an event from `from` to every running plugin that handles
    /// `subject`.
    pub fn send_event(
        &self,
        from: impl Into<String>,
        subject: impl Into<String>,
        payload: Payload,
    ) -> BusResult<()> {
        self.send_message(Message::event(from, subject, payload))
    }

    /// Sends a broadcast; delivered exactly like an event.
    pub fn send_broadcast(
        &self,
        from: impl Into<String>,
        subject: impl Into<String>,
        payload: Payload,
    ) -> BusResult<()> {
        self.send_message(Message::broadcast(from, subject, payload))
    }

    /// Sends a request to `to` and waits for its response.
    ///
    /// The correlation entry created for the request is removed on every
    /// exit path.
    ///
    /// # Errors
    ///
    /// Any error of [`send_message`](Self::send_message), plus
    /// [`BusError::Timeout`], [`BusError::Canceled`], [`BusError::Closed`],
    /// and, when the bus replies to unroutable requests,
    /// [`BusError::Unsupported`] or [`BusError::Handler`].
    pub async fn send_request(
        &self,
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        payload: Payload,
        options: RequestOptions,
    ) -> BusResult<Message> {
        let to = to.into();
        let subject = subject.into();
        let timeout = options.timeout.unwrap_or(self.state.config.request_timeout);
        let correlation_id = generate_message_id();

        let (guard, rx) = self
            .state
            .pending
            .register(correlation_id.clone(), Instant::now().checked_add(timeout));
        trace!(
            correlation_id = %guard.correlation_id(),
            to = %to,
            subject = %subject,
            "Request registered"
        );

        let mut msg = Message::request(from, to.clone(), subject.clone(), payload, correlation_id);
        msg.reply_to = options.reply_to;
        self.send_message(msg)?;

        let cancel = options.cancel.unwrap_or_default();
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BusError::Canceled),
            () = self.state.shutdown.cancelled() => Err(BusError::Closed),
            received = tokio::time::timeout(timeout, rx) => match received {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(_)) => Err(BusError::Closed),
                Err(_) => Err(BusError::Timeout(timeout)),
            },
        }?;

        match response.fault {
            Some(fault) => Err(fault.into_error(&to, &subject)),
            None => Ok(response),
        }
    }

    // ─── Shutdown ────────────────────────────────────────────────────────────

    /// Returns `true` once the bus has been shut down.
    pub fn is_closed(&self) -> bool {
        self.state.shutdown.is_cancelled()
    }

    /// Stops the dispatch loop and releases every waiting requester with
    /// [`BusError::Closed`].
    ///
    /// Messages still queued are dropped. Handlers already running see their
    /// [`HandlerContext`] shutdown token fire. Calling this more than once is
    /// harmless.
    pub async fn shutdown(&self) {
        self.state.shutdown.cancel();
        let released = if self.state.pending.is_empty() {
            0
        } else {
            self.state.pending.clear()
        };

        let handle = self.state.dispatch_loop.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
            info!(released_requests = released, "Communication bus shut down");
        }
    }
}

impl std::fmt::Debug for CommunicationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommunicationManager")
            .field("registry", &self.state.registry)
            .field("filters", &self.state.filters)
            .field("pending", &self.state.pending)
            .field("closed", &self.is_closed())
            .finish()
    }
}
