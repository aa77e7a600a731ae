//! Minimal client for talking to an [`Engine`](crate::Engine).
//!
//! The [`Client`] owns one TCP connection. It sends frames and reads frames
//! back in order; there is no pooling, retry or request correlation beyond
//! "the next frame on the socket".
//!
//! # Example
//!
//! ```ignore
//! use framewire::{codec::HeaderValues, Client};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1:7000").await?;
//!
//!     let mut values = HeaderValues::new();
//!     values.insert("k".into(), "v".into());
//!
//!     let reply = client.call(42, &values, &serde_json::json!({"x": 1})).await?;
//!     println!("{}", reply.body_json::<serde_json::Value>()?);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::codec::HeaderValues;
use crate::error::{FramewireError, Result};
use crate::protocol::{encode_frame, read_frame, Frame, DEFAULT_MAX_SECTION_SIZE};
use crate::trace::{BinaryTracer, SpanContext, Tracer};
use crate::writer::ConnWriter;

/// A connection to a framewire server.
pub struct Client {
    reader: OwnedReadHalf,
    writer: ConnWriter,
    tracer: Arc<dyn Tracer>,
    max_section_size: u64,
}

impl Client {
    /// Connect to `addr`.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        tracing::debug!(remote = ?stream.peer_addr().ok(), "client connected");

        let (reader, write_half) = stream.into_split();
        Ok(Self {
            reader,
            writer: ConnWriter::new(write_half),
            tracer: Arc::new(BinaryTracer::new()),
            max_section_size: DEFAULT_MAX_SECTION_SIZE,
        })
    }

    /// Use `tracer` for outgoing carriers and incoming spans.
    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Largest section accepted in a response.
    pub fn with_max_section_size(mut self, max: u64) -> Self {
        self.max_section_size = max;
        self
    }

    /// Send one untraced frame.
    pub async fn send<B>(&self, message_id: i64, values: &HeaderValues, body: &B) -> Result<()>
    where
        B: serde::Serialize + ?Sized,
    {
        let mut buf = ConnWriter::encode_buffer();
        encode_frame(&mut buf, message_id, values, body, None)?;
        self.writer.write_message(&buf).await
    }

    /// Send one frame carrying `span` as its trace carrier.
    pub async fn send_traced<B>(
        &self,
        message_id: i64,
        values: &HeaderValues,
        body: &B,
        span: &SpanContext,
    ) -> Result<()>
    where
        B: serde::Serialize + ?Sized,
    {
        let mut buf = ConnWriter::encode_buffer();
        encode_frame(&mut buf, message_id, values, body, Some((&*self.tracer, span)))?;
        self.writer.write_message(&buf).await
    }

    /// Next frame from the server, or `None` once it closed the connection.
    pub async fn recv(&mut self) -> Result<Option<Frame>> {
        read_frame(&mut self.reader, &*self.tracer, self.max_section_size).await
    }

    /// Send a frame and wait for the next frame back.
    pub async fn call<B>(&mut self, message_id: i64, values: &HeaderValues, body: &B) -> Result<Frame>
    where
        B: serde::Serialize + ?Sized,
    {
        self.send(message_id, values, body).await?;
        self.recv().await?.ok_or(FramewireError::ConnectionClosed)
    }

    /// Shut down the write direction; the server sees end of stream.
    pub async fn close(&self) -> Result<()> {
        self.writer.shutdown().await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("remote", &self.reader.peer_addr().ok())
            .field("max_section_size", &self.max_section_size)
            .finish_non_exhaustive()
    }
}
