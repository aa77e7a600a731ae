//! Handler and chain types.
//!
//! A handler is any `Fn(&mut Context) -> BoxFuture<HandlerResult>`. The same
//! type serves as middleware: code before [`Context::next`] runs on the way
//! in, code after it on the way out.
//!
//! # Example
//!
//! ```ignore
//! use framewire::handler::handler;
//!
//! let timing = handler(|ctx| Box::pin(async move {
//!     let start = std::time::Instant::now();
//!     ctx.next().await?;
//!     tracing::debug!(elapsed = ?start.elapsed(), "frame handled");
//!     Ok(())
//! }));
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::Context;
use crate::error::Result;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for handler and middleware functions.
pub trait Handler: Send + Sync + 'static {
    /// Handle the frame held by `ctx`.
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        (self)(ctx)
    }
}

/// Handler shared between every chain that contains it.
pub type SharedHandler = Arc<dyn Handler>;

/// Ordered, immutable handler chain bound to a message ID.
pub type Chain = Arc<[SharedHandler]>;

/// Wrap a closure into a [`SharedHandler`].
pub fn handler<F>(f: F) -> SharedHandler
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Chain with no handlers; dispatching it does nothing.
pub fn empty_chain() -> Chain {
    Arc::from(Vec::new())
}
