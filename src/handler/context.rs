//! Per-request context handed to handlers.
//!
//! A [`Context`] carries one decoded frame through its handler chain:
//! - `header_value` / `set_header_value` - header values, echoed on responses
//! - `read_json` - decode the body on demand
//! - `next` - run the rest of the chain, then come back
//! - `write` / `write_error` - send a frame on the owning connection
//!
//! Contexts come from a [`ContextPool`](super::ContextPool) and are reset
//! between frames.
//!
//! # Example
//!
//! ```ignore
//! engine.register(1, [handler(|ctx| Box::pin(async move {
//!     let name: String = ctx.read_json()?;
//!     ctx.write(2, &format!("hello {name}")).await
//! }))]);
//! ```

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::chain::{empty_chain, BoxFuture, Chain, HandlerResult};
use crate::code::CodeError;
use crate::codec::{HeaderValues, JsonCodec};
use crate::error::{FramewireError, Result};
use crate::protocol::{encode_frame, Body, Frame, Header};
use crate::trace::{SpanContext, Tracer};
use crate::writer::ConnWriter;

/// State of one in-flight frame.
pub struct Context {
    /// Request scope, a child of the connection's token.
    scope: CancellationToken,
    /// Span of this request when the frame carried a trace.
    span: Option<SpanContext>,
    header: Header,
    body: Body,
    chain: Chain,
    /// Index of the handler currently running.
    index: usize,
    /// Whether responses carry a trace carrier.
    trace: bool,
    writer: Option<ConnWriter>,
    tracer: Option<Arc<dyn Tracer>>,
    remote_addr: String,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            scope: CancellationToken::new(),
            span: None,
            header: Header::default(),
            body: Body::default(),
            chain: empty_chain(),
            index: 0,
            trace: false,
            writer: None,
            tracer: None,
            remote_addr: String::new(),
        }
    }
}

impl Context {
    /// Create an unbound context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return every field to its pristine state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Attach the connection: request scope, write half, tracer and peer label.
    pub fn bind(
        &mut self,
        scope: CancellationToken,
        writer: ConnWriter,
        tracer: Arc<dyn Tracer>,
        remote_addr: &str,
    ) {
        self.scope = scope;
        self.writer = Some(writer);
        self.tracer = Some(tracer);
        self.remote_addr.clear();
        self.remote_addr.push_str(remote_addr);
    }

    /// Load a decoded frame and the chain selected for it.
    pub fn load(&mut self, frame: Frame, chain: Chain) {
        self.header = frame.header;
        self.body = frame.body;
        self.span = frame.span;
        self.chain = chain;
        self.index = 0;
    }

    /// Run the chain from the cursor to its end.
    ///
    /// Stops at the first handler error and returns it.
    pub async fn dispatch(&mut self) -> HandlerResult {
        self.run_chain().await
    }

    /// Run the remaining handlers, then return to the caller.
    ///
    /// The cursor is shared with [`dispatch`](Self::dispatch), so every
    /// handler runs exactly once however often `next` is called. Calling it
    /// with nothing left is a no-op.
    pub fn next(&mut self) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move {
            self.index += 1;
            self.run_chain().await
        })
    }

    fn run_chain(&mut self) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move {
            while self.index < self.chain.len() {
                let handler = Arc::clone(&self.chain[self.index]);
                handler.call(self).await?;
                self.index += 1;
            }
            Ok(())
        })
    }

    /// Number of handlers in the bound chain.
    #[inline]
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    /// Message ID of the current frame.
    #[inline]
    pub fn message_id(&self) -> i64 {
        self.header.message_id
    }

    /// Decoded header of the current frame.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Body of the current frame.
    #[inline]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// All header values.
    #[inline]
    pub fn header_values(&self) -> &HeaderValues {
        &self.header.values
    }

    /// Get a header value.
    pub fn header_value(&self, key: &str) -> Option<&Value> {
        self.header.values.get(key)
    }

    /// Set a header value; responses carry it.
    pub fn set_header_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.header.values.insert(key.into(), value.into());
    }

    /// Decode the body as JSON.
    pub fn read_json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        if self.body.is_empty() {
            return Err(FramewireError::EmptyBody);
        }
        JsonCodec::decode(&self.body.buf)
    }

    /// Whether responses written from this context carry a trace carrier.
    pub fn with_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Span of this request, if the frame was traced.
    #[inline]
    pub fn span(&self) -> Option<&SpanContext> {
        self.span.as_ref()
    }

    /// Request cancellation scope.
    #[inline]
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    /// Peer address of the owning connection.
    #[inline]
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Send `payload` as message `message_id`, echoing the header values.
    ///
    /// With tracing on, the request's span is injected, or a new root span
    /// when the request was not traced.
    pub async fn write<T>(&self, message_id: i64, payload: &T) -> Result<()>
    where
        T: serde::Serialize + Sync + ?Sized,
    {
        let writer = self.writer.as_ref().ok_or(FramewireError::ConnectionClosed)?;
        let mut buf = ConnWriter::encode_buffer();

        if self.trace {
            let tracer = self
                .tracer
                .as_deref()
                .ok_or_else(|| FramewireError::Trace("no tracer bound".to_string()))?;
            let started;
            let span = match &self.span {
                Some(span) => span,
                None => {
                    started = tracer.start_span(&message_id.to_string(), None);
                    &started
                }
            };
            encode_frame(&mut buf, message_id, &self.header.values, payload, Some((tracer, span)))?;
        } else {
            encode_frame(&mut buf, message_id, &self.header.values, payload, None)?;
        }

        writer.write_message(&buf).await
    }

    /// Send an application error as message `message_id`.
    pub async fn write_error(&self, message_id: i64, err: &CodeError) -> Result<()> {
        self.write(message_id, err).await
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("message_id", &self.header.message_id)
            .field("index", &self.index)
            .field("chain_len", &self.chain.len())
            .field("trace", &self.trace)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}
