//! Per-connection serve loop.
//!
//! One task per accepted socket. Frames are read and dispatched strictly in
//! order: a frame's handler chain finishes before the next frame is read.
//!
//! ```text
//! ┌──────────┐  read_frame   ┌────────────┐  lookup   ┌────────┐
//! │ ReadHalf │ ────────────► │ Connection │ ────────► │ Router │
//! └──────────┘               └─────┬──────┘           └────────┘
//!                                  │ acquire / dispatch / drop
//!                                  ▼
//!                            ┌─────────────┐  write   ┌────────────┐
//!                            │ ContextPool │ ───────► │ ConnWriter │
//!                            └─────────────┘          └────────────┘
//! ```

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::error::{FramewireError, Result};
use crate::handler::{empty_chain, ContextPool, Router};
use crate::protocol::{read_frame, Frame};
use crate::trace::Tracer;
use crate::writer::ConnWriter;

/// State shared by every connection of an engine.
pub(crate) struct Dispatch {
    pub(crate) router: Router,
    pub(crate) pool: Arc<ContextPool>,
    pub(crate) tracer: Arc<dyn Tracer>,
    pub(crate) max_section_size: u64,
}

/// One accepted socket.
pub(crate) struct Connection {
    id: u64,
    remote_addr: String,
    cancel: CancellationToken,
    dispatch: Arc<Dispatch>,
}

impl Connection {
    pub(crate) fn new(
        id: u64,
        remote_addr: impl Into<String>,
        cancel: CancellationToken,
        dispatch: Arc<Dispatch>,
    ) -> Self {
        Self {
            id,
            remote_addr: remote_addr.into(),
            cancel,
            dispatch,
        }
    }

    /// Serve `stream` until the peer closes it, a read fails, a handler
    /// hits a framing error, or the connection is cancelled.
    ///
    /// A clean close and cancellation return `Ok(())`. Errors are logged
    /// and returned.
    pub(crate) async fn serve<S>(self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (mut reader, write_half) = tokio::io::split(stream);
        let writer = ConnWriter::new(write_half);

        tracing::debug!(conn_id = self.id, remote = %self.remote_addr, "connection opened");

        let result = self.read_loop(&mut reader, &writer).await;

        if let Err(err) = writer.shutdown().await {
            tracing::debug!(conn_id = self.id, error = %err, "write half shutdown failed");
        }

        match &result {
            Ok(()) => {
                tracing::debug!(conn_id = self.id, remote = %self.remote_addr, "connection closed")
            }
            Err(err) => tracing::error!(
                conn_id = self.id,
                remote = %self.remote_addr,
                error = %err,
                "connection failed"
            ),
        }
        result
    }

    async fn read_loop<R>(&self, reader: &mut R, writer: &ConnWriter) -> Result<()>
    where
        R: AsyncRead + Send + Unpin,
    {
        let tracer = &*self.dispatch.tracer;
        let max_section = self.dispatch.max_section_size;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                frame = read_frame(reader, tracer, max_section) => frame?,
            };

            let Some(frame) = frame else {
                tracing::debug!(conn_id = self.id, "peer closed the stream");
                return Ok(());
            };

            self.handle(frame, writer).await?;
        }
    }

    /// Dispatch one frame. Only framing errors escape; the rest are logged.
    async fn handle(&self, frame: Frame, writer: &ConnWriter) -> Result<()> {
        let message_id = frame.message_id();
        let chain = match self.dispatch.router.lookup(message_id) {
            Some(chain) => chain,
            None => {
                tracing::warn!(
                    conn_id = self.id,
                    remote = %self.remote_addr,
                    message_id,
                    "no handler registered"
                );
                empty_chain()
            }
        };

        let mut ctx = self.dispatch.pool.acquire();
        ctx.bind(
            self.cancel.child_token(),
            writer.clone(),
            Arc::clone(&self.dispatch.tracer),
            &self.remote_addr,
        );
        ctx.load(frame, chain);

        match ctx.dispatch().await {
            Ok(()) => Ok(()),
            Err(err) if err.is_framing() => Err(err),
            Err(err @ (FramewireError::Application(_) | FramewireError::WithMessage(_))) => {
                tracing::debug!(conn_id = self.id, message_id, error = %err, "handler returned application error");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(conn_id = self.id, message_id, error = %err, "handler failed");
                Ok(())
            }
        }
    }
}
