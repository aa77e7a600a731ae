//! Engine: listener, accept loop and connection lifecycle.
//!
//! The [`Engine`] owns the router, the context pool, the tracer and the set
//! of live connections. It is cheap to clone; clones share all state, so one
//! clone can run the accept loop while another calls
//! [`shutdown`](Engine::shutdown).
//!
//! # Example
//!
//! ```ignore
//! use framewire::{handler, Engine};
//!
//! #[tokio::main]
//! async fn main() -> framewire::Result<()> {
//!     let engine = Engine::builder().addr("127.0.0.1:7000").build()?;
//!     engine.register(1, [handler(|ctx| Box::pin(async move {
//!         let body: serde_json::Value = ctx.read_json()?;
//!         ctx.write(1, &body).await
//!     }))]);
//!
//!     let stopper = engine.clone();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         stopper.shutdown();
//!     });
//!
//!     engine.run().await
//! }
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::conn::{Connection, Dispatch};
use crate::error::{FramewireError, Result};
use crate::handler::{ContextPool, Group, Router, SharedHandler};
use crate::trace::{BinaryTracer, Tracer};

/// First pause after a failed accept; doubles up to [`MAX_ACCEPT_BACKOFF`].
const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(5);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Builder for an [`Engine`].
///
/// Starts from [`ServerConfig::default`].
pub struct EngineBuilder {
    config: ServerConfig,
    transport: Option<String>,
    tracer: Option<Arc<dyn Tracer>>,
}

impl EngineBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::from_config(ServerConfig::default())
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ServerConfig) -> Self {
        Self {
            config,
            transport: None,
            tracer: None,
        }
    }

    /// Listen address: `host:port`, or a bare port.
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.config.addr = addr.into();
        self
    }

    /// Transport network name: `tcp`, `tcp4` or `tcp6`.
    ///
    /// Anything else makes [`build`](Self::build) fail.
    pub fn transport(mut self, network: impl Into<String>) -> Self {
        self.transport = Some(network.into());
        self
    }

    /// Largest header or body section accepted from a peer.
    pub fn max_section_size(mut self, max: u64) -> Self {
        self.config.max_section_size = max;
        self
    }

    /// Idle request contexts kept for reuse.
    pub fn pool_max_idle(mut self, max_idle: usize) -> Self {
        self.config.pool_max_idle = max_idle;
        self
    }

    /// Trace carrier implementation. Default: [`BinaryTracer`].
    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Validate the configuration and create the engine.
    pub fn build(self) -> Result<Engine> {
        let mut config = self.config;
        if let Some(network) = self.transport {
            config.transport = network.parse()?;
        }
        config.validate()?;

        let tracer = self
            .tracer
            .unwrap_or_else(|| Arc::new(BinaryTracer::new()));
        Ok(Engine::assemble(config, tracer))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Live connections and stop state, guarded together.
#[derive(Default)]
struct EngineState {
    active: HashMap<u64, CancellationToken>,
    next_id: u64,
    stopped: bool,
}

struct Shared {
    config: ServerConfig,
    dispatch: Arc<Dispatch>,
    root: Mutex<Group>,
    state: Mutex<EngineState>,
    /// Cancelled by shutdown; ends the accept loop.
    stop: CancellationToken,
}

/// A TCP application server.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    /// Start building an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Engine with default configuration and tracer.
    pub fn new() -> Self {
        Self::assemble(ServerConfig::default(), Arc::new(BinaryTracer::new()))
    }

    /// Engine from a loaded configuration.
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        EngineBuilder::from_config(config).build()
    }

    fn assemble(config: ServerConfig, tracer: Arc<dyn Tracer>) -> Self {
        let router = Router::new();
        let dispatch = Arc::new(Dispatch {
            router: router.clone(),
            pool: ContextPool::new(config.pool_max_idle),
            tracer,
            max_section_size: config.max_section_size,
        });
        Self {
            shared: Arc::new(Shared {
                config,
                root: Mutex::new(router.group()),
                dispatch,
                state: Mutex::new(EngineState::default()),
                stop: CancellationToken::new(),
            }),
        }
    }

    /// Effective configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Message-ID table.
    pub fn router(&self) -> &Router {
        &self.shared.dispatch.router
    }

    /// New group starting with the engine-wide middleware.
    pub fn group(&self) -> Group {
        self.shared.root.lock().derive()
    }

    /// Append engine-wide middleware. Only chains registered afterwards
    /// include it.
    pub fn use_middleware(&self, handler: SharedHandler) -> &Self {
        self.shared.root.lock().use_middleware(handler);
        self
    }

    /// Register `handlers` for `message_id` after the engine-wide middleware.
    ///
    /// # Panics
    ///
    /// Panics if `message_id` is already registered.
    pub fn register<I>(&self, message_id: i64, handlers: I) -> &Self
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.shared.root.lock().register(message_id, handlers);
        self
    }

    /// Like [`register`](Self::register), returning the error instead.
    pub fn try_register<I>(&self, message_id: i64, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.shared.root.lock().try_register(message_id, handlers)
    }

    /// Bind a listener on the configured address and transport.
    pub async fn bind(&self) -> Result<TcpListener> {
        let config = &self.shared.config;
        let addr = config.listen_addr();

        let candidate = tokio::net::lookup_host(addr.as_str())
            .await?
            .find(|a| config.transport.accepts(a))
            .ok_or_else(|| {
                FramewireError::InvalidConfig(format!(
                    "no {} address resolved for {addr}",
                    config.transport
                ))
            })?;

        let listener = TcpListener::bind(candidate).await?;
        tracing::info!(
            address = %listener.local_addr()?,
            transport = %config.transport,
            "listener bound"
        );
        Ok(listener)
    }

    /// Bind, then serve until [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until [`shutdown`](Self::shutdown).
    ///
    /// Each connection is served on its own task. The listener is closed
    /// when this returns.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut backoff = MIN_ACCEPT_BACKOFF;

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shared.stop.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    backoff = MIN_ACCEPT_BACKOFF;
                    self.spawn_connection(stream, peer);
                }
                Err(err) => {
                    tracing::warn!(error = %err, retry_in = ?backoff, "accept failed");
                    tokio::select! {
                        _ = self.shared.stop.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_ACCEPT_BACKOFF);
                }
            }
        }

        tracing::info!("accept loop stopped");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let Some((id, cancel)) = self.register_connection() else {
            tracing::debug!(remote = %peer, "engine stopped, dropping connection");
            return;
        };

        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(conn_id = id, error = %err, "set_nodelay failed");
        }

        let conn = Connection::new(
            id,
            peer.to_string(),
            cancel,
            Arc::clone(&self.shared.dispatch),
        );
        let engine = self.clone();
        tokio::spawn(async move {
            // Errors are logged by the connection itself.
            let _ = conn.serve(stream).await;
            engine.unregister_connection(id);
        });
    }

    fn register_connection(&self) -> Option<(u64, CancellationToken)> {
        let mut state = self.shared.state.lock();
        if state.stopped {
            return None;
        }
        state.next_id += 1;
        let id = state.next_id;
        let token = CancellationToken::new();
        state.active.insert(id, token.clone());
        Some((id, token))
    }

    fn unregister_connection(&self, id: u64) {
        self.shared.state.lock().active.remove(&id);
    }

    /// Cancel every live connection and stop accepting.
    ///
    /// Returns immediately; connection tasks and the accept loop wind down
    /// on their own. The live set is emptied right away, so
    /// [`active_connections`](Self::active_connections) reads 0 even while a
    /// cancelled connection is still finishing the frame it was
    /// dispatching. Calling it more than once is harmless.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        let cancelled = state.active.len();
        for (_, token) in state.active.drain() {
            token.cancel();
        }
        state.stopped = true;
        self.shared.stop.cancel();
        drop(state);

        tracing::info!(connections = cancelled, "engine shutdown");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_stopped(&self) -> bool {
        self.shared.state.lock().stopped
    }

    /// Number of connections registered and not yet cancelled.
    ///
    /// A connection leaves the set when its serve loop exits or, all at
    /// once, when [`shutdown`](Self::shutdown) cancels it.
    pub fn active_connections(&self) -> usize {
        self.shared.state.lock().active.len()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.shared.config)
            .field("router", self.router())
            .field("active_connections", &self.active_connections())
            .finish_non_exhaustive()
    }
}
