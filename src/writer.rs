//! Connection write half shared by the requests of one connection.
//!
//! Each response is encoded fully into a buffer first, then flushed under
//! the writer lock so frames from concurrent writers never interleave.
//!
//! # Architecture
//!
//! ```text
//! Context (frame 1) ─┐
//! Context (frame 2) ─┼─► ConnWriter (Arc<Mutex<BoxedWriter>>) ─► Socket
//! spawned task      ─┘
//! ```
//!
//! `AsyncWrite::write` may accept only part of a buffer, so
//! [`write_fully`] re-issues writes on the remaining suffix until nothing is
//! left or an error occurs.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::{FramewireError, Result};

/// Initial capacity of a response encode buffer.
pub const DEFAULT_ENCODE_CAPACITY: usize = 4 * 1024;

/// Boxed write half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Cloneable handle to a connection's write half.
#[derive(Clone)]
pub struct ConnWriter {
    inner: Arc<Mutex<BoxedWriter>>,
}

impl ConnWriter {
    /// Wrap a write half.
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Fresh buffer to encode a message into.
    pub fn encode_buffer() -> BytesMut {
        BytesMut::with_capacity(DEFAULT_ENCODE_CAPACITY)
    }

    /// Write a fully encoded message and flush it.
    pub async fn write_message(&self, message: &[u8]) -> Result<()> {
        let mut writer = self.inner.lock().await;
        write_fully(&mut *writer, message).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Shut down the write direction of the socket.
    pub async fn shutdown(&self) -> Result<()> {
        let mut writer = self.inner.lock().await;
        writer.shutdown().await?;
        Ok(())
    }
}

impl std::fmt::Debug for ConnWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnWriter").finish_non_exhaustive()
    }
}

/// Write every byte of `message`, tolerating partial writes.
pub async fn write_fully<W>(writer: &mut W, message: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut offset = 0;
    while offset < message.len() {
        let n = writer.write(&message[offset..]).await?;
        if n == 0 {
            return Err(FramewireError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "socket accepted zero bytes",
            )));
        }
        offset += n;
    }
    Ok(())
}
