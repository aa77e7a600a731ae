//! Middleware example - groups, onion ordering and error codes.
//!
//! This example demonstrates:
//! - Engine-wide timing middleware wrapping every chain
//! - A derived group adding an auth check in front of admin handlers
//! - Replying with a registered error code
//! - Driving the server with the bundled `Client`
//!
//! # Running
//!
//! ```text
//! RUST_LOG=framewire=debug,middleware=info cargo run --example middleware
//! ```

use std::sync::Arc;
use std::time::Instant;

use framewire::codec::HeaderValues;
use framewire::{handler, Client, CodeRegistry, Engine, FramewireError};
use serde_json::json;
use tracing_subscriber::EnvFilter;

const PING: i64 = 1;
const RELOAD: i64 = 100;
const ERROR_REPLY: i64 = -1;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let codes = CodeRegistry::new();
    let forbidden = Arc::new(codes.register(403, "forbidden")?);

    let engine = Engine::builder().addr("127.0.0.1:0").build()?;

    engine.use_middleware(handler(|ctx| {
        Box::pin(async move {
            let start = Instant::now();
            let result = ctx.next().await;
            tracing::info!(
                message_id = ctx.message_id(),
                elapsed = ?start.elapsed(),
                "request handled"
            );
            result
        })
    }));

    engine.register(
        PING,
        [handler(|ctx| Box::pin(async move { ctx.write(PING, "pong").await }))],
    );

    let mut admin = engine.group();
    admin.use_middleware(handler(move |ctx| {
        let forbidden = Arc::clone(&forbidden);
        Box::pin(async move {
            if ctx.header_value("token").and_then(|v| v.as_str()) != Some("secret") {
                ctx.write_error(ERROR_REPLY, &forbidden).await?;
                return Err(FramewireError::Application((*forbidden).clone()));
            }
            ctx.next().await
        })
    }));
    admin.register(
        RELOAD,
        [handler(|ctx| Box::pin(async move { ctx.write(RELOAD, "reloaded").await }))],
    );

    let listener = engine.bind().await?;
    let addr = listener.local_addr()?;
    let server = engine.clone();
    let serving = tokio::spawn(async move { server.serve(listener).await });

    let mut client = Client::connect(addr).await?;
    let pong = client.call(PING, &HeaderValues::new(), &json!(null)).await?;
    tracing::info!(reply = %pong.body_json::<String>()?, "ping");

    let denied = client.call(RELOAD, &HeaderValues::new(), &json!(null)).await?;
    tracing::info!(message_id = denied.message_id(), reply = ?denied.body_json::<serde_json::Value>()?, "reload without token");

    let mut values = HeaderValues::new();
    values.insert("token".into(), json!("secret"));
    let reloaded = client.call(RELOAD, &values, &json!(null)).await?;
    tracing::info!(reply = %reloaded.body_json::<String>()?, "reload with token");

    engine.shutdown();
    serving.await??;
    Ok(())
}
