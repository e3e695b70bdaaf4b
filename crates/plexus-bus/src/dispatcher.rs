//! The dispatch loop and per-type routing.
//!
//! A single loop drains the inbound queue and spawns one task per message.
//! Each task routes by [`MessageType`]:
//!
//! | Type | Routing |
//! |---|---|
//! | `Request` | First handler of the target plugin accepting the subject; its reply is resubmitted as a `Response` |
//! | `Event` / `Broadcast` | Every accepting handler of every running plugin except the sender, one task each |
//! | `Response` | Handed to the request waiting on its correlation ID |
//!
//! Handler errors and panics are contained in the task that hit them; the
//! loop and unrelated messages never see them.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, error, trace, warn};

use plexus_core::{
    BoxedHandler, Fault, FaultKind, HandlerContext, HandlerError, HandlerResult, Message,
    MessageType,
};

use crate::config::UnroutablePolicy;
use crate::correlation::DeliveryOutcome;
use crate::manager::BusState;
use crate::observer::DeliveryFailure;
use crate::stats::Counters;

// =============================================================================
// Dispatch loop
// =============================================================================

/// Drains the queue until shutdown or until the bus is dropped.
///
/// The loop only holds a weak reference to the bus, so dropping the last
/// manager handle closes the queue and ends the loop.
pub(crate) async fn run_dispatch_loop(
    state: Weak<BusState>,
    mut inbound: mpsc::Receiver<Message>,
    shutdown: CancellationToken,
    limit: Option<Arc<Semaphore>>,
) {
    debug!("Dispatch loop started");

    loop {
        let msg = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            next = inbound.recv() => match next {
                Some(msg) => msg,
                None => break,
            },
        };

        let Some(state) = state.upgrade() else {
            break;
        };

        let permit = match &limit {
            Some(semaphore) => tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                permit = Arc::clone(semaphore).acquire_owned() => permit.ok(),
            },
            None => None,
        };

        Counters::bump(&state.counters.dispatched);
        let span = debug_span!(
            "dispatch",
            message_id = %msg.id,
            kind = %msg.kind,
            subject = %msg.subject,
        );
        tokio::spawn(
            async move {
                let _permit = permit;
                dispatch(state, msg).await;
            }
            .instrument(span),
        );
    }

    debug!(dropped = inbound.len(), "Dispatch loop stopped");
}

/// Routes one message according to its type.
pub(crate) async fn dispatch(state: Arc<BusState>, msg: Message) {
    match msg.kind {
        MessageType::Request => route_request(&state, msg).await,
        MessageType::Event | MessageType::Broadcast => fan_out(&state, msg).await,
        MessageType::Response => route_response(&state, msg),
    }
}

// =============================================================================
// Requests
// =============================================================================

async fn route_request(state: &Arc<BusState>, msg: Message) {
    let Some(handler) = state.registry.first_match(&msg.to, &msg.subject) else {
        if state.registry.handler_count(&msg.to) == 0 {
            warn!(
                plugin_id = %msg.to,
                message_id = %msg.id,
                "No handlers found for plugin"
            );
        } else {
            warn!(
                plugin_id = %msg.to,
                subject = %msg.subject,
                message_id = %msg.id,
                "No handler found for subject"
            );
        }
        reject_unroutable(state, &msg);
        return;
    };

    let ctx = state.handler_context(&msg.to);
    let response = match invoke(&handler, &ctx, msg.clone()).await {
        Ok(reply) => Message::response_to(&msg, reply.payload),
        Err(err) => {
            error!(
                plugin_id = %msg.to,
                subject = %msg.subject,
                message_id = %msg.id,
                handler = %handler.name(),
                error = %err,
                "Failed to handle request"
            );
            let fault = Fault {
                kind: FaultKind::HandlerFailed,
                message: err.to_string(),
            };
            state.report_failure(DeliveryFailure {
                plugin_id: msg.to.clone(),
                handler: handler.name().to_string(),
                message: msg.clone(),
                error: err,
            });
            if state.config.unroutable != UnroutablePolicy::Reply {
                return;
            }
            Message::fault_response(&msg, fault)
        }
    };

    if let Err(err) = state.submit(response) {
        error!(
            plugin_id = %msg.to,
            message_id = %msg.id,
            correlation_id = %msg.correlation_id,
            error = %err,
            "Failed to send response"
        );
    }
}

fn reject_unroutable(state: &BusState, msg: &Message) {
    Counters::bump(&state.counters.unroutable);
    if state.config.unroutable != UnroutablePolicy::Reply {
        return;
    }

    let fault = Fault {
        kind: FaultKind::Unsupported,
        message: format!("no handler for subject '{}'", msg.subject),
    };
    if let Err(err) = state.submit(Message::fault_response(msg, fault)) {
        error!(
            plugin_id = %msg.to,
            message_id = %msg.id,
            error = %err,
            "Failed to send unsupported response"
        );
    }
}

// =============================================================================
// Events & broadcasts
// =============================================================================

async fn fan_out(state: &Arc<BusState>, msg: Message) {
    for (plugin_id, handlers) in state.registry.snapshot_except(&msg.from) {
        match state.lifecycle.plugin_state(&plugin_id).await {
            Ok(plugin_state) if plugin_state.is_running() => {}
            Ok(plugin_state) => {
                trace!(plugin_id = %plugin_id, state = %plugin_state, "Skipping plugin that is not running");
                continue;
            }
            Err(err) => {
                debug!(plugin_id = %plugin_id, error = %err, "Skipping plugin with unknown state");
                continue;
            }
        }

        for handler in handlers {
            if !handler.can_handle(&msg.subject) {
                continue;
            }
            let state = Arc::clone(state);
            let plugin_id = plugin_id.clone();
            let msg = msg.clone();
            tokio::spawn(
                async move {
                    let ctx = state.handler_context(&plugin_id);
                    if let Err(err) = invoke(&handler, &ctx, msg.clone()).await {
                        error!(
                            plugin_id = %plugin_id,
                            subject = %msg.subject,
                            message_id = %msg.id,
                            handler = %handler.name(),
                            error = %err,
                            "Failed to handle {}", msg.kind
                        );
                        state.report_failure(DeliveryFailure {
                            plugin_id,
                            handler: handler.name().to_string(),
                            message: msg,
                            error: err,
                        });
                    }
                }
                .in_current_span(),
            );
        }
    }
}

// =============================================================================
// Responses
// =============================================================================

fn route_response(state: &BusState, msg: Message) {
    let correlation_id = msg.correlation_id.clone();
    let message_id = msg.id.clone();

    match state.pending.deliver(msg) {
        DeliveryOutcome::Delivered => {
            Counters::bump(&state.counters.responses_delivered);
            trace!(correlation_id = %correlation_id, "Response delivered");
        }
        DeliveryOutcome::Duplicate => {
            Counters::bump(&state.counters.responses_dropped);
            warn!(
                correlation_id = %correlation_id,
                message_id = %message_id,
                "Duplicate response dropped"
            );
        }
        DeliveryOutcome::Unknown | DeliveryOutcome::Abandoned => {
            Counters::bump(&state.counters.responses_dropped);
            warn!(
                correlation_id = %correlation_id,
                message_id = %message_id,
                "No pending request for response"
            );
        }
    }
}

// =============================================================================
// Invocation
// =============================================================================

/// Runs a handler, turning a panic into a [`HandlerError`].
async fn invoke(
    handler: &BoxedHandler,
    ctx: &HandlerContext,
    msg: Message,
) -> HandlerResult<Message> {
    match AssertUnwindSafe(handler.handle_message(ctx, msg))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::failed(format!(
            "handler panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
