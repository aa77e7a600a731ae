//! Message-ID router and middleware groups.
//!
//! The [`Router`] maps message IDs to handler chains. Chains are built by
//! [`Group`]s: a group accumulates middleware, and registering a message ID
//! on it installs `middleware ++ handlers` under that ID.
//!
//! Registration happens at configuration time, before the engine accepts
//! connections. Registering an ID twice is a configuration error.
//!
//! # Example
//!
//! ```ignore
//! use framewire::handler::{handler, Router};
//!
//! let router = Router::new();
//! let mut api = router.group();
//! api.use_middleware(auth);
//!
//! let mut admin = api.derive();
//! admin.use_middleware(audit);
//!
//! api.register(1, [echo]);        // auth, echo
//! admin.register(100, [reload]);  // auth, audit, reload
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::chain::{Chain, SharedHandler};
use crate::error::{FramewireError, Result};

/// Shared message-ID to handler-chain table.
#[derive(Clone, Default)]
pub struct Router {
    table: Arc<RwLock<HashMap<i64, Chain>>>,
}

impl Router {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Root group with no middleware.
    pub fn group(&self) -> Group {
        Group {
            middleware: Vec::new(),
            router: self.clone(),
        }
    }

    /// Install a chain. Fails if `message_id` is already taken.
    pub fn insert(&self, message_id: i64, chain: Vec<SharedHandler>) -> Result<()> {
        let mut table = self.table.write();
        if table.contains_key(&message_id) {
            return Err(FramewireError::DuplicateRoute(message_id));
        }
        table.insert(message_id, chain.into());
        Ok(())
    }

    /// Chain registered for `message_id`, or `None` when no handler exists.
    pub fn lookup(&self, message_id: i64) -> Option<Chain> {
        self.table.read().get(&message_id).cloned()
    }

    /// Whether a chain is registered for `message_id`.
    pub fn contains(&self, message_id: i64) -> bool {
        self.table.read().contains_key(&message_id)
    }

    /// Number of registered message IDs.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<i64> = self.table.read().keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("Router").field("message_ids", &ids).finish()
    }
}

/// Builder of a shared middleware prefix.
pub struct Group {
    middleware: Vec<SharedHandler>,
    router: Router,
}

impl Group {
    /// Append one middleware.
    pub fn use_middleware(&mut self, handler: SharedHandler) -> &mut Self {
        self.middleware.push(handler);
        self
    }

    /// Append several middleware, in order.
    pub fn use_all<I>(&mut self, handlers: I) -> &mut Self
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.middleware.extend(handlers);
        self
    }

    /// Child group starting from a copy of this group's middleware.
    ///
    /// Later changes to either group do not affect the other.
    pub fn derive(&self) -> Group {
        Group {
            middleware: self.middleware.clone(),
            router: self.router.clone(),
        }
    }

    /// Number of middleware in the prefix.
    pub fn middleware_len(&self) -> usize {
        self.middleware.len()
    }

    /// Register `handlers` for `message_id`, after this group's middleware.
    ///
    /// # Panics
    ///
    /// Panics if `message_id` is already registered. Use
    /// [`try_register`](Self::try_register) to get the error instead.
    pub fn register<I>(&self, message_id: i64, handlers: I)
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        if let Err(err) = self.try_register(message_id, handlers) {
            panic!("{err}");
        }
    }

    /// Register `handlers` for `message_id`, after this group's middleware.
    pub fn try_register<I>(&self, message_id: i64, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        let chain: Vec<SharedHandler> = self
            .middleware
            .iter()
            .cloned()
            .chain(handlers)
            .collect();
        self.router.insert(message_id, chain)?;
        tracing::debug!(message_id, "handler chain registered");
        Ok(())
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::chain::handler;
    use crate::handler::Context;
    use parking_lot::Mutex;

    fn tag(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> SharedHandler {
        let log = log.clone();
        handler(move |_ctx| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().push(name);
                Ok(())
            })
        })
    }

    async fn run(router: &Router, message_id: i64) {
        let chain = router.lookup(message_id).unwrap();
        let mut ctx = Context::new();
        ctx.load(Default::default(), chain);
        ctx.dispatch().await.unwrap();
    }

    #[tokio::test]
    async fn test_group_middleware_runs_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new();
        let mut root = router.group();
        root.use_middleware(tag(&log, "auth"));
        root.register(1, [tag(&log, "echo")]);

        run(&router, 1).await;
        assert_eq!(*log.lock(), ["auth", "echo"]);
    }

    #[tokio::test]
    async fn test_derive_inherits_and_diverges() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new();
        let mut root = router.group();
        root.use_middleware(tag(&log, "auth"));

        let mut admin = root.derive();
        admin.use_middleware(tag(&log, "audit"));
        root.use_middleware(tag(&log, "late"));

        assert_eq!(root.middleware_len(), 2);
        assert_eq!(admin.middleware_len(), 2);

        admin.register(100, [tag(&log, "reload")]);
        root.register(1, [tag(&log, "echo")]);

        run(&router, 100).await;
        assert_eq!(*log.lock(), ["auth", "audit", "reload"]);

        log.lock().clear();
        run(&router, 1).await;
        assert_eq!(*log.lock(), ["auth", "late", "echo"]);
    }

    #[test]
    fn test_middleware_added_after_register_not_applied() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new();
        let mut root = router.group();
        root.register(1, [tag(&log, "echo")]);
        root.use_all([tag(&log, "a"), tag(&log, "b")]);

        assert_eq!(router.lookup(1).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new();
        let root = router.group();
        root.try_register(5, [tag(&log, "first")]).unwrap();

        let other = router.group();
        let err = other.try_register(5, [tag(&log, "second")]).unwrap_err();
        assert!(matches!(err, FramewireError::DuplicateRoute(5)));
        assert_eq!(router.len(), 1);
    }

    #[test]
    #[should_panic(expected = "Router message ID 5 already registered")]
    fn test_duplicate_register_panics() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new();
        let root = router.group();
        root.register(5, [tag(&log, "first")]);
        root.register(5, [tag(&log, "second")]);
    }

    #[test]
    fn test_lookup_missing() {
        let router = Router::new();
        assert!(router.is_empty());
        assert!(router.lookup(404).is_none());
        assert!(!router.contains(404));
    }
}
