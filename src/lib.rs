//! # framewire
//!
//! A small TCP application server framework: a binary frame protocol with an
//! optional inline trace carrier, pooled per-request contexts, and onion
//! middleware chains routed by a numeric message ID.
//!
//! ## Architecture
//!
//! - **Engine** ([`server`]): accept loop, live-connection set, shutdown
//! - **Connection**: one task per socket, frames served strictly in order
//! - **Protocol** ([`protocol`]): `trace_flag | header_len | message_id`,
//!   JSON header values, optional trace carrier, length-prefixed JSON body
//! - **Handlers** ([`handler`]): [`Context`], [`Router`](handler::Router),
//!   [`Group`](handler::Group), context pool
//!
//! ## Example
//!
//! ```ignore
//! use framewire::{handler, Engine};
//!
//! #[tokio::main]
//! async fn main() -> framewire::Result<()> {
//!     let engine = Engine::builder().addr("8080").build()?;
//!
//!     engine.use_middleware(handler(|ctx| Box::pin(async move {
//!         tracing::info!(message_id = ctx.message_id(), "request");
//!         ctx.next().await
//!     })));
//!
//!     engine.register(42, [handler(|ctx| Box::pin(async move {
//!         let body: serde_json::Value = ctx.read_json()?;
//!         ctx.write(42, &body).await
//!     }))]);
//!
//!     engine.run().await
//! }
//! ```

pub mod client;
pub mod code;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod trace;
pub mod writer;

mod conn;

pub use client::Client;
pub use code::{CodeError, CodeRegistry};
pub use config::{ServerConfig, Transport};
pub use error::{FramewireError, Result};
pub use handler::{handler, Context};
pub use server::{Engine, EngineBuilder};
