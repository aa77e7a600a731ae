//! Free-list of reusable request contexts.
//!
//! # Design
//!
//! - `acquire` pops an idle context (or allocates one) and resets it
//! - the returned [`PooledContext`] owns the context outright
//! - dropping the guard resets the context and pushes it back, so release
//!   happens exactly once on every exit path and no handle outlives it
//! - at most `max_idle` contexts are kept; extras are freed
//!
//! # Usage
//!
//! ```
//! use framewire::handler::ContextPool;
//!
//! let pool = ContextPool::new(16);
//! {
//!     let mut ctx = pool.acquire();
//!     ctx.set_header_value("k", "v");
//! } // released here
//! assert_eq!(pool.idle(), 1);
//! assert!(pool.acquire().header_values().is_empty());
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::Context;

/// Default number of idle contexts kept for reuse.
pub const DEFAULT_POOL_MAX_IDLE: usize = 1024;

/// Thread-safe pool of [`Context`]s.
#[derive(Debug)]
pub struct ContextPool {
    free: Mutex<Vec<Box<Context>>>,
    max_idle: usize,
    allocated: AtomicUsize,
}

impl ContextPool {
    /// Create an empty pool keeping at most `max_idle` idle contexts.
    pub fn new(max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
            max_idle,
            allocated: AtomicUsize::new(0),
        })
    }

    /// Borrow a pristine context.
    pub fn acquire(self: &Arc<Self>) -> PooledContext {
        let popped = self.free.lock().pop();
        let mut ctx = match popped {
            Some(ctx) => ctx,
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Box::default()
            }
        };
        ctx.reset();

        PooledContext {
            ctx: Some(ctx),
            pool: Arc::clone(self),
        }
    }

    fn release(&self, mut ctx: Box<Context>) {
        // Drops writer/tracer handles now rather than on the next acquire.
        ctx.reset();

        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(ctx);
        }
    }

    /// Contexts waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Contexts allocated over the pool's lifetime.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

/// A context on loan from a [`ContextPool`]; returned when dropped.
pub struct PooledContext {
    ctx: Option<Box<Context>>,
    pool: Arc<ContextPool>,
}

impl Deref for PooledContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx.as_deref().expect("pooled context used after release")
    }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
            .as_deref_mut()
            .expect("pooled context used after release")
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.release(ctx);
        }
    }
}

impl std::fmt::Debug for PooledContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PooledContext").field(&self.ctx).finish()
    }
}
