//! In-process WAMP router demo
//!
//! Run with: cargo run --example simple_router
//!
//! Three simulated clients connect, declare a prefix, subscribe to a chat
//! topic, publish to it and call a calculator procedure. Every frame the
//! router queues for a client is printed as it would be written to the
//! websocket.
//!
//! Set `RUST_LOG=wamp_rs=debug` to see the router's routing decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use wamp_rs::rpc::{CallError, CallInvocation};
use wamp_rs::server::handler::WampHandler;
use wamp_rs::session::ClientContext;
use wamp_rs::{ServerConfig, WampServer};

/// Calculator procedures plus a publish counter
struct DemoHandler {
    publishes: AtomicU64,
}

impl WampHandler for DemoHandler {
    async fn on_connection(&self, ctx: &ClientContext) -> bool {
        println!("[{}] connected", ctx.client_id);
        true
    }

    async fn on_disconnect(&self, ctx: &ClientContext) {
        println!("[{}] disconnected", ctx.client_id);
    }

    async fn on_call(&self, call: CallInvocation) {
        let numbers: Vec<f64> = call.args.iter().filter_map(Value::as_f64).collect();

        let outcome = match call.proc_uri.as_str() {
            "http://example.com/calc#add" => Ok(Value::from(numbers.iter().sum::<f64>())),
            "http://example.com/calc#div" => match numbers.as_slice() {
                [_, divisor] if *divisor == 0.0 => Err(CallError::new("division by zero")),
                [a, b] => Ok(Value::from(a / b)),
                _ => Err(CallError::new("div expects two numbers")),
            },
            other => Err(CallError::no_such_procedure(other)),
        };

        if let Err(e) = call.responder.respond(outcome) {
            eprintln!("[{}] reply failed: {}", call.ctx.client_id, e);
        }
    }

    async fn on_subscribed(&self, ctx: &ClientContext, topic: &str, _args: &[Value]) {
        println!("[{}] subscribed to {}", ctx.client_id, topic);
    }

    async fn on_unsubscribed(&self, ctx: &ClientContext, topic: Option<&str>, _args: &[Value]) {
        println!("[{}] unsubscribed from {}", ctx.client_id, topic.unwrap_or("all topics"));
    }

    async fn on_publish(&self, ctx: &ClientContext, event: &Value, topic: &str, _args: &[Value]) {
        let n = self.publishes.fetch_add(1, Ordering::Relaxed) + 1;
        println!("[{}] published #{} on {}: {}", ctx.client_id, n, topic, event);
    }
}

/// Print every frame queued for one client
fn print_frames(name: &'static str, mut rx: mpsc::UnboundedReceiver<bytes::Bytes>) {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            println!("  -> {}: {}", name, String::from_utf8_lossy(&frame));
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let handler = DemoHandler {
        publishes: AtomicU64::new(0),
    };
    let server = Arc::new(WampServer::new(
        ServerConfig::default().server_ident("simple_router"),
        handler,
    ));

    let (mut alice, rx) = server.connect().await?;
    print_frames("alice", rx);
    let (mut bob, rx) = server.connect().await?;
    print_frames("bob", rx);
    let (mut carol, rx) = server.connect().await?;
    print_frames("carol", rx);

    for client in [&mut alice, &mut bob, &mut carol] {
        client
            .dispatch_json(r#"[1, "chat", "http://example.com/chat#"]"#)
            .await?;
        client.dispatch_json(r#"[5, "chat:lobby"]"#).await?;
    }

    // Default: publisher does not receive its own event
    alice
        .dispatch_json(r#"[7, "chat:lobby", {"from": "alice", "text": "hi all"}]"#)
        .await?;

    // Explicit eligible list: only carol
    let eligible = format!(r#"[7, "chat:lobby", "psst", [], ["{}"]]"#, carol.id());
    bob.dispatch_json(&eligible).await?;

    bob.dispatch_json(r#"[1, "calc", "http://example.com/calc#"]"#)
        .await?;
    bob.dispatch_json(r#"[2, "call-1", "calc:add", 1, 2, 3.5]"#)
        .await?;
    bob.dispatch_json(r#"[2, "call-2", "calc:div", 1, 0]"#)
        .await?;

    // Unknown message types are dropped without closing the session
    if let Err(e) = carol.dispatch_json("[99]").await {
        println!("[{}] dropped: {}", carol.id(), e);
    }

    carol.dispatch_json("[6]").await?;

    alice.disconnect().await;
    bob.disconnect().await;
    carol.disconnect().await;

    // Let the printers drain
    tokio::task::yield_now().await;

    let stats = server.stats().await;
    println!();
    println!(
        "Stats: connections={} messages={} violations={} events={} calls={}",
        stats.total_connections,
        stats.messages_dispatched,
        stats.protocol_violations,
        stats.events_delivered,
        stats.calls,
    );

    Ok(())
}
