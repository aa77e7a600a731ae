//! Frame types and the stream codec.
//!
//! [`read_frame`] decodes one frame straight from an async reader,
//! [`encode_frame`] serializes one into a buffer that the caller flushes
//! in a single write loop (see [`ConnWriter`](crate::writer::ConnWriter)).
//!
//! # Example
//!
//! ```ignore
//! use bytes::BytesMut;
//! use framewire::codec::HeaderValues;
//! use framewire::protocol::{encode_frame, read_frame, DEFAULT_MAX_SECTION_SIZE};
//! use framewire::trace::BinaryTracer;
//!
//! let mut values = HeaderValues::new();
//! values.insert("k".into(), "v".into());
//!
//! let mut buf = BytesMut::new();
//! encode_frame(&mut buf, 42, &values, &serde_json::json!({"x": 1}), None)?;
//!
//! let mut reader: &[u8] = &buf;
//! let frame = read_frame(&mut reader, &BinaryTracer, DEFAULT_MAX_SECTION_SIZE)
//!     .await?
//!     .expect("one frame");
//! assert_eq!(frame.message_id(), 42);
//! assert_eq!(frame.header.values, values);
//! ```

use std::io::ErrorKind;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::wire_format::{
    trace_flag, validate_length, FixedHeader, FIXED_HEADER_SIZE, LENGTH_PREFIX_SIZE,
};
use crate::codec::{HeaderValues, JsonCodec};
use crate::error::{FramewireError, Result};
use crate::trace::{SpanContext, Tracer};

/// Frame metadata: trace flag, message id and header values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    /// Whether a trace carrier followed the header values.
    pub trace: bool,
    /// Message identifier.
    pub message_id: i64,
    /// Declared header values length.
    pub len: i64,
    /// Raw JSON bytes of the header values.
    pub raw: Bytes,
    /// Decoded header values.
    pub values: HeaderValues,
}

/// Frame payload, decoded by handlers on demand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    /// Declared body length.
    pub len: i64,
    /// Raw body bytes (JSON).
    pub buf: Bytes,
}

impl Body {
    /// Body bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Whether the body carries no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// One decoded frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Span context extracted from the trace carrier, when present.
    pub span: Option<SpanContext>,
    /// Body bytes.
    pub body: Body,
}

impl Frame {
    /// Get the message ID.
    #[inline]
    pub fn message_id(&self) -> i64 {
        self.header.message_id
    }

    /// Decode the body as JSON.
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        if self.body.is_empty() {
            return Err(FramewireError::EmptyBody);
        }
        JsonCodec::decode(&self.body.buf)
    }
}

/// Read one frame from `reader`.
///
/// Returns `Ok(None)` when the stream ends cleanly before the first byte of
/// a frame. A stream ending anywhere inside a frame is
/// [`FramewireError::Truncated`]. Sections larger than `max_section` bytes
/// are rejected before anything is allocated for them.
pub async fn read_frame<R>(
    reader: &mut R,
    tracer: &dyn Tracer,
    max_section: u64,
) -> Result<Option<Frame>>
where
    R: AsyncRead + Send + Unpin,
{
    let mut fixed = [0u8; FIXED_HEADER_SIZE];
    if !read_fixed_header(reader, &mut fixed).await? {
        return Ok(None);
    }
    let base = FixedHeader::decode(&fixed).ok_or(FramewireError::Truncated {
        section: "fixed header",
    })?;

    let header_len = validate_length("header", base.header_len, max_section)?;
    let raw = read_section(reader, "header", header_len).await?;
    let values = JsonCodec::decode_header_values(&raw)?;

    let span = if base.is_traced() {
        let remote = tracer.extract(&mut *reader).await?;
        Some(tracer.start_span(&base.message_id.to_string(), Some(&remote)))
    } else {
        None
    };

    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    reader
        .read_exact(&mut prefix)
        .await
        .map_err(|e| truncated(e, "body length"))?;
    let body_len = i64::from_be_bytes(prefix);
    let buf = read_section(reader, "body", validate_length("body", body_len, max_section)?).await?;

    Ok(Some(Frame {
        header: Header {
            trace: base.is_traced(),
            message_id: base.message_id,
            len: base.header_len,
            raw,
            values,
        },
        span,
        body: Body { len: body_len, buf },
    }))
}

/// Fill `buf`, telling a clean end-of-stream (`Ok(false)`) apart from one
/// that cuts the fixed header short.
async fn read_fixed_header<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(FramewireError::Truncated {
                section: "fixed header",
            });
        }
        filled += n;
    }
    Ok(true)
}

async fn read_section<R>(reader: &mut R, section: &'static str, len: usize) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| truncated(e, section))?;
    Ok(Bytes::from(buf))
}

fn truncated(err: std::io::Error, section: &'static str) -> FramewireError {
    if err.kind() == ErrorKind::UnexpectedEof {
        FramewireError::Truncated { section }
    } else {
        FramewireError::Io(err)
    }
}

/// Encode one frame into `buf`.
///
/// Header values and body are serialized to JSON. When `trace` is given the
/// tracer injects the span into the buffer between the header values and
/// the body length, and the trace byte is set.
pub fn encode_frame<B>(
    buf: &mut BytesMut,
    message_id: i64,
    header_values: &HeaderValues,
    body: &B,
    trace: Option<(&dyn Tracer, &SpanContext)>,
) -> Result<()>
where
    B: serde::Serialize + ?Sized,
{
    let body = JsonCodec::encode(body)?;
    encode_frame_raw(buf, message_id, header_values, &body, trace)
}

/// Encode one frame whose body is already serialized.
pub fn encode_frame_raw(
    buf: &mut BytesMut,
    message_id: i64,
    header_values: &HeaderValues,
    body: &[u8],
    trace: Option<(&dyn Tracer, &SpanContext)>,
) -> Result<()> {
    let values = JsonCodec::encode(header_values)?;
    let base = FixedHeader::new(
        trace_flag::from_bool(trace.is_some()),
        values.len() as i64,
        message_id,
    );

    buf.reserve(FIXED_HEADER_SIZE + values.len() + LENGTH_PREFIX_SIZE + body.len());
    buf.put_slice(&base.encode());
    buf.put_slice(&values);

    if let Some((tracer, span)) = trace {
        tracer.inject(span, buf)?;
    }

    buf.put_i64(body.len() as i64);
    buf.put_slice(body);
    Ok(())
}

/// Encode one frame into a fresh buffer.
pub fn build_frame<B>(message_id: i64, header_values: &HeaderValues, body: &B) -> Result<Bytes>
where
    B: serde::Serialize + ?Sized,
{
    let mut buf = BytesMut::new();
    encode_frame(&mut buf, message_id, header_values, body, None)?;
    Ok(buf.freeze())
}
