//! Handler module - request context, middleware chains and routing.
//!
//! Provides:
//! - [`Router`] / [`Group`] - map message IDs to handler chains
//! - [`Context`] - one frame's state, continuation and response writing
//! - [`ContextPool`] - reuse of contexts across frames and connections
//!
//! # Example
//!
//! ```ignore
//! use framewire::handler::{handler, Router};
//!
//! let router = Router::new();
//! let mut root = router.group();
//!
//! root.use_middleware(handler(|ctx| Box::pin(async move {
//!     tracing::info!(message_id = ctx.message_id(), "in");
//!     ctx.next().await?;
//!     tracing::info!(message_id = ctx.message_id(), "out");
//!     Ok(())
//! })));
//!
//! root.register(1, [handler(|ctx| Box::pin(async move {
//!     let text: String = ctx.read_json()?;
//!     ctx.write(1, &text).await
//! }))]);
//! ```

mod chain;
mod context;
mod pool;
mod router;

pub use chain::{empty_chain, handler, BoxFuture, Chain, Handler, HandlerResult, SharedHandler};
pub use context::Context;
pub use pool::{ContextPool, PooledContext, DEFAULT_POOL_MAX_IDLE};
pub use router::{Group, Router};
