//! Error types for framewire.

use thiserror::Error;

use crate::code::{CodeError, WithMessage};

/// Main error type for all framewire operations.
#[derive(Debug, Error)]
pub enum FramewireError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization of header values or body.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stream ended in the middle of a frame.
    #[error("Frame truncated while reading {section}")]
    Truncated {
        /// Frame section being read when the stream ended.
        section: &'static str,
    },

    /// Declared section length is negative.
    #[error("Invalid {section} length: {len}")]
    InvalidLength {
        /// Frame section carrying the length.
        section: &'static str,
        /// Declared length.
        len: i64,
    },

    /// Declared section length exceeds the configured maximum.
    #[error("{section} length {len} exceeds maximum {max}")]
    FrameTooLarge {
        /// Frame section carrying the length.
        section: &'static str,
        /// Declared length.
        len: i64,
        /// Configured maximum.
        max: u64,
    },

    /// Trace carrier could not be injected or extracted.
    #[error("Trace carrier error: {0}")]
    Trace(String),

    /// Handler tried to decode an empty body.
    #[error("Empty body")]
    EmptyBody,

    /// A handler chain is already registered for this message ID.
    #[error("Router message ID {0} already registered")]
    DuplicateRoute(i64),

    /// An error code is already registered.
    #[error("Error code {0} already registered")]
    DuplicateCode(i64),

    /// Transport other than a stream-oriented TCP variant.
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Connection closed or no writer bound.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Application-level error raised by a handler.
    #[error("Application error: {0}")]
    Application(#[from] CodeError),

    /// Application-level error with added context.
    #[error("Application error: {0}")]
    WithMessage(#[from] WithMessage),
}

impl FramewireError {
    /// Whether this error comes from the byte stream itself: socket I/O,
    /// section lengths, truncation or the trace carrier.
    ///
    /// A connection ends on a framing error, whether `read_frame` or a
    /// handler's write hit it. Any error out of `read_frame` ends the
    /// connection, including a `Json` error for a malformed header section,
    /// because the stream position is lost. Other handler errors are scoped
    /// to their frame.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            FramewireError::Io(_)
                | FramewireError::Truncated { .. }
                | FramewireError::InvalidLength { .. }
                | FramewireError::FrameTooLarge { .. }
                | FramewireError::Trace(_)
        )
    }
}

/// Result type alias using FramewireError.
pub type Result<T> = std::result::Result<T, FramewireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_classification() {
        assert!(FramewireError::Truncated { section: "header" }.is_framing());
        assert!(FramewireError::InvalidLength {
            section: "body",
            len: -1
        }
        .is_framing());
        assert!(!FramewireError::EmptyBody.is_framing());
        assert!(!FramewireError::DuplicateRoute(1).is_framing());
        assert!(!FramewireError::Application(CodeError::new(500, "boom")).is_framing());

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer gone");
        assert!(FramewireError::Io(io).is_framing());
        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!FramewireError::Json(json).is_framing());
    }

    #[test]
    fn test_display() {
        let err = FramewireError::FrameTooLarge {
            section: "body",
            len: 10,
            max: 5,
        };
        assert_eq!(err.to_string(), "body length 10 exceeds maximum 5");
        assert_eq!(
            FramewireError::DuplicateRoute(42).to_string(),
            "Router message ID 42 already registered"
        );
    }
}
