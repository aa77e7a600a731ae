//! Distributed-trace carrier.
//!
//! When a frame's trace flag is set, an opaque carrier sits between the
//! header values and the body. The transport never counts its bytes: the
//! [`Tracer`] reads exactly what its own format needs straight from the
//! stream, and writes the carrier into the outgoing buffer.
//!
//! [`BinaryTracer`] is the default format:
//!
//! ```text
//! ┌──────────┬─────────┬───────────┬───────┬──────────────┬─────────────────────────────┐
//! │ Trace ID │ Span ID │ Parent ID │ Flags │ Baggage count│ (key len, key, val len, val)*│
//! │ 16 bytes │ 8 bytes │ 8 bytes   │ 1 byte│ u32 BE       │ u32 BE lengths              │
//! └──────────┴─────────┴───────────┴───────┴──────────────┴─────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{FramewireError, Result};
use crate::handler::BoxFuture;

/// Sampled flag bit.
pub const FLAG_SAMPLED: u8 = 0b0000_0001;

/// Fixed part of the binary carrier (ids + flags).
pub const CARRIER_FIXED_SIZE: usize = 16 + 8 + 8 + 1;

/// Maximum baggage entries accepted from the wire.
pub const MAX_BAGGAGE_ITEMS: u32 = 64;

/// Maximum length of a single baggage key or value.
pub const MAX_BAGGAGE_ITEM_LEN: u32 = 4096;

/// Identity of a span as propagated between processes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanContext {
    /// 128-bit trace identifier shared by every span of a trace.
    pub trace_id: u128,
    /// Identifier of this span.
    pub span_id: u64,
    /// Identifier of the parent span (0 for a root span).
    pub parent_id: u64,
    /// Flag bits (see [`FLAG_SAMPLED`]).
    pub flags: u8,
    /// Key/value items carried along the trace.
    pub baggage: BTreeMap<String, String>,
}

impl SpanContext {
    /// Start a new sampled trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: nonzero(rand::random::<u128>()),
            span_id: nonzero(rand::random::<u64>()),
            parent_id: 0,
            flags: FLAG_SAMPLED,
            baggage: BTreeMap::new(),
        }
    }

    /// Start a child span in the same trace, inheriting flags and baggage.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: nonzero(rand::random::<u64>()),
            parent_id: self.span_id,
            flags: self.flags,
            baggage: self.baggage.clone(),
        }
    }

    /// Whether the sampled bit is set.
    #[inline]
    pub fn is_sampled(&self) -> bool {
        self.flags & FLAG_SAMPLED != 0
    }

    /// Trace id as 32 lowercase hex digits.
    pub fn trace_id_hex(&self) -> String {
        format!("{:032x}", self.trace_id)
    }

    /// Set a baggage item.
    pub fn set_baggage(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.baggage.insert(key.into(), value.into());
    }
}

fn nonzero<T: Default + PartialEq + From<u8>>(v: T) -> T {
    if v == T::default() {
        T::from(1)
    } else {
        v
    }
}

/// Span propagation contract used by the frame codec.
pub trait Tracer: Send + Sync + 'static {
    /// Append a carrier for `span` to `carrier`.
    fn inject(&self, span: &SpanContext, carrier: &mut BytesMut) -> Result<()>;

    /// Read one carrier from `reader`, consuming exactly its bytes.
    fn extract<'a>(
        &'a self,
        reader: &'a mut (dyn AsyncRead + Send + Unpin),
    ) -> BoxFuture<'a, Result<SpanContext>>;

    /// Start a span named `name`, as a child of `parent` when given.
    fn start_span(&self, name: &str, parent: Option<&SpanContext>) -> SpanContext {
        let span = match parent {
            Some(parent) => parent.child(),
            None => SpanContext::new_root(),
        };
        tracing::trace!(
            span = name,
            trace_id = %span.trace_id_hex(),
            span_id = span.span_id,
            "span started"
        );
        span
    }
}

/// Default self-delimited binary carrier.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryTracer;

impl BinaryTracer {
    /// Create the binary tracer.
    pub fn new() -> Self {
        Self
    }
}

impl Tracer for BinaryTracer {
    fn inject(&self, span: &SpanContext, carrier: &mut BytesMut) -> Result<()> {
        if span.baggage.len() > MAX_BAGGAGE_ITEMS as usize {
            return Err(FramewireError::Trace(format!(
                "{} baggage items exceed maximum {}",
                span.baggage.len(),
                MAX_BAGGAGE_ITEMS
            )));
        }

        carrier.reserve(CARRIER_FIXED_SIZE + 4);
        carrier.put_u128(span.trace_id);
        carrier.put_u64(span.span_id);
        carrier.put_u64(span.parent_id);
        carrier.put_u8(span.flags);
        carrier.put_u32(span.baggage.len() as u32);

        for (key, value) in &span.baggage {
            for item in [key.as_bytes(), value.as_bytes()] {
                if item.len() > MAX_BAGGAGE_ITEM_LEN as usize {
                    return Err(FramewireError::Trace(format!(
                        "baggage item of {} bytes exceeds maximum {}",
                        item.len(),
                        MAX_BAGGAGE_ITEM_LEN
                    )));
                }
                carrier.put_u32(item.len() as u32);
                carrier.put_slice(item);
            }
        }

        Ok(())
    }

    fn extract<'a>(
        &'a self,
        reader: &'a mut (dyn AsyncRead + Send + Unpin),
    ) -> BoxFuture<'a, Result<SpanContext>> {
        Box::pin(async move { read_carrier(reader).await.map_err(carrier_error) })
    }
}

async fn read_carrier(reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<SpanContext> {
    let mut span = SpanContext {
        trace_id: reader.read_u128().await?,
        span_id: reader.read_u64().await?,
        parent_id: reader.read_u64().await?,
        flags: reader.read_u8().await?,
        baggage: BTreeMap::new(),
    };

    let count = reader.read_u32().await?;
    if count > MAX_BAGGAGE_ITEMS {
        return Err(FramewireError::Trace(format!(
            "{count} baggage items exceed maximum {MAX_BAGGAGE_ITEMS}"
        )));
    }

    for _ in 0..count {
        let key = read_item(reader).await?;
        let value = read_item(reader).await?;
        span.baggage.insert(key, value);
    }

    Ok(span)
}

async fn read_item(reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<String> {
    let len = reader.read_u32().await?;
    if len > MAX_BAGGAGE_ITEM_LEN {
        return Err(FramewireError::Trace(format!(
            "baggage item of {len} bytes exceeds maximum {MAX_BAGGAGE_ITEM_LEN}"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|e| FramewireError::Trace(format!("baggage is not UTF-8: {e}")))
}

fn carrier_error(err: FramewireError) -> FramewireError {
    match err {
        FramewireError::Io(e) if e.kind() == ErrorKind::UnexpectedEof => {
            FramewireError::Truncated {
                section: "trace carrier",
            }
        }
        other => other,
    }
}
