//! Echo server - simple request/response example.
//!
//! This example demonstrates:
//! - Building an engine from a JSON config (or defaults)
//! - Registering a handler for a message ID
//! - Typed body decoding and a typed response
//! - Shutting down on Ctrl-C
//!
//! # Running
//!
//! ```text
//! RUST_LOG=debug cargo run --example echo -- '{"addr": "7000"}'
//! ```

use framewire::{handler, Engine, ServerConfig};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const ECHO: i64 = 1;

#[derive(Deserialize, Debug)]
struct EchoInput {
    message: String,
}

#[derive(Serialize, Debug)]
struct EchoOutput {
    echo: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(json) => ServerConfig::from_json_str(&json)?,
        None => ServerConfig::default(),
    };
    let engine = Engine::from_config(config)?;

    engine.register(
        ECHO,
        [handler(|ctx| {
            Box::pin(async move {
                let input: EchoInput = ctx.read_json()?;
                ctx.write(ECHO, &EchoOutput { echo: input.message }).await
            })
        })],
    );

    let stopper = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.shutdown();
        }
    });

    engine.run().await?;
    Ok(())
}
