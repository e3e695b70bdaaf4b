//! Echo Demo
//!
//! Walks through the bus from a host's point of view:
//!
//! - `core` sends requests to the `echo` plugin and waits for each reply
//! - `core` publishes `user.created`; every running plugin with a matching
//!   handler receives it, the stopped `archive` plugin does not
//! - a blocked sender is rejected by the filter chain
//! - a request nobody answers times out
//!
//! # Usage
//!
//! ```bash
//! cargo run --package plexus-echo -- --requests 5
//! cargo run --package plexus-echo -- --serve     # keep running until Ctrl+C
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use plexus::prelude::*;
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(about = "Plexus bus walkthrough")]
struct Args {
    /// Configuration file (defaults to plexus.toml in the current directory).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of concurrent echo requests.
    #[arg(short, long, default_value_t = 3)]
    requests: usize,

    /// Keep the bus running until Ctrl+C after the walkthrough.
    #[arg(long)]
    serve: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Counts `user.*` events.
#[derive(Default)]
struct UserCounter {
    seen: AtomicU64,
}

#[async_trait]
impl MessageHandler for UserCounter {
    fn can_handle(&self, subject: &str) -> bool {
        subject.starts_with("user.")
    }

    async fn handle_message(&self, ctx: &HandlerContext, msg: Message) -> HandlerResult<Message> {
        let total = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            plugin_id = %ctx.plugin_id(),
            subject = %msg.subject,
            total,
            "User event counted"
        );
        Ok(msg)
    }

    fn name(&self) -> &str {
        "user-counter"
    }
}

fn payload(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Payload::new(),
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = PlexusRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    let runtime = builder.build()?;
    let bus = runtime.manager().clone();

    let plugins = runtime.plugins();
    for id in ["core", "echo", "audit", "stats"] {
        plugins.set_state(id, PluginState::Running);
    }
    plugins.set_state("archive", PluginState::Stopped);

    bus.register_handler(
        "echo",
        Arc::new(
            handler_fn(["echo"], |msg: Message| async move {
                let mut reply = msg.payload;
                reply.insert("echoed".into(), json!(true));
                HandlerResult::Ok(reply)
            })
            .named("echo"),
        ),
    );
    bus.register_handler("stats", Arc::new(UserCounter::default()));
    bus.register_handler("archive", Arc::new(UserCounter::default()));
    bus.register_handler("audit", Arc::new(LoggingMessageHandler::new("audit")));

    let filter = Arc::new(DefaultMessageFilter::new());
    filter.block_plugin("rogue");
    bus.add_filter(filter);

    bus.set_delivery_observer(Arc::new(|failure: &DeliveryFailure| {
        warn!(
            plugin_id = %failure.plugin_id,
            handler = %failure.handler,
            error = %failure.error,
            "Delivery failed"
        );
    }));

    // Request/response
    let mut requests = JoinSet::new();
    for n in 0..args.requests {
        let bus = bus.clone();
        requests.spawn(async move {
            bus.send_request(
                "core",
                "echo",
                "echo",
                payload(json!({ "n": n })),
                RequestOptions::new().timeout(Duration::from_secs(5)),
            )
            .await
        });
    }
    while let Some(joined) = requests.join_next().await {
        match joined? {
            Ok(reply) => info!(payload = ?reply.payload, "Echo reply"),
            Err(e) => error!(error = %e, "Echo request failed"),
        }
    }

    // Fan-out
    bus.send_event("core", "user.created", payload(json!({ "user": "alice" })))?;
    bus.send_broadcast("core", "user.deleted", payload(json!({ "user": "bob" })))?;

    // Filtered sender
    if let Err(e) = bus.send_event("rogue", "user.created", Payload::new()) {
        warn!(error = %e, "Rogue event rejected");
    }

    // Nobody answers `missing` on the echo plugin
    let result = bus
        .send_request(
            "core",
            "echo",
            "missing",
            Payload::new(),
            RequestOptions::new().timeout(Duration::from_millis(200)),
        )
        .await;
    if let Err(e) = result {
        warn!(error = %e, "Unanswered request");
    }

    info!(stats = %runtime.stats(), "Walkthrough finished");

    if args.serve {
        runtime.run().await?;
    } else {
        runtime.stop().await;
    }

    Ok(())
}
