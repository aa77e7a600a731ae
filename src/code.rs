//! Application error codes.
//!
//! A [`CodeRegistry`] maps numeric codes to messages. Handlers return
//! [`CodeError`]s (directly or via [`FramewireError::Application`]) and send
//! them to the peer with [`Context::write_error`](crate::handler::Context::write_error).
//! [`CodeError::with_message`] adds context without hiding the code;
//! [`cause`] finds it again.
//!
//! # Example
//!
//! ```
//! use framewire::code::CodeRegistry;
//!
//! let codes = CodeRegistry::new();
//! let not_found = codes.register(404, "not found").unwrap();
//! assert_eq!(codes.lookup(404), Some(not_found));
//! assert!(codes.register(404, "again").is_err());
//! ```

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{FramewireError, Result};

/// A numeric application error with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[error("code:{code}, message:{message}")]
pub struct CodeError {
    /// Numeric code.
    pub code: i64,
    /// Message sent to the peer.
    pub message: String,
}

impl CodeError {
    /// Build a code without registering it.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Wrap with extra context; the code stays reachable through
    /// [`cause`].
    pub fn with_message(self, message: impl Into<String>) -> WithMessage {
        WithMessage {
            message: message.into(),
            cause: self,
        }
    }

    /// Whether the [`cause`] of `err` carries the same code as `self`.
    pub fn is(&self, err: &(dyn std::error::Error + 'static)) -> bool {
        cause(err).is_some_and(|c| c.code == self.code)
    }
}

/// A [`CodeError`] with added context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}: {cause}")]
pub struct WithMessage {
    message: String,
    #[source]
    cause: CodeError,
}

impl WithMessage {
    /// Added context.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Wrapped code.
    pub fn code_error(&self) -> &CodeError {
        &self.cause
    }
}

/// First [`CodeError`] in the source chain of `err`, `err` included.
pub fn cause<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a CodeError> {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(code) = err.downcast_ref::<CodeError>() {
            return Some(code);
        }
        current = err.source();
    }
    None
}

/// Registry of known error codes.
#[derive(Debug, Default)]
pub struct CodeRegistry {
    codes: RwLock<HashMap<i64, CodeError>>,
}

impl CodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a code. Registering the same code twice is an error.
    pub fn register(&self, code: i64, message: impl Into<String>) -> Result<CodeError> {
        let mut codes = self.codes.write();
        if codes.contains_key(&code) {
            return Err(FramewireError::DuplicateCode(code));
        }
        let err = CodeError::new(code, message);
        codes.insert(code, err.clone());
        Ok(err)
    }

    /// Look up a registered code.
    pub fn lookup(&self, code: i64) -> Option<CodeError> {
        self.codes.read().get(&code).cloned()
    }

    /// Number of registered codes.
    pub fn len(&self) -> usize {
        self.codes.read().len()
    }

    /// Whether no codes are registered.
    pub fn is_empty(&self) -> bool {
        self.codes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let codes = CodeRegistry::new();
        assert!(codes.is_empty());

        let err = codes.register(1001, "invalid argument").unwrap();
        assert_eq!(err.code, 1001);
        assert_eq!(codes.lookup(1001).unwrap().message, "invalid argument");
        assert_eq!(codes.len(), 1);
        assert!(codes.lookup(1002).is_none());
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let codes = CodeRegistry::new();
        codes.register(7, "first").unwrap();

        let result = codes.register(7, "second");
        assert!(matches!(result, Err(FramewireError::DuplicateCode(7))));
        assert_eq!(codes.lookup(7).unwrap().message, "first");
    }

    #[test]
    fn test_display_and_is() {
        let err = CodeError::new(500, "internal");
        assert_eq!(err.to_string(), "code:500, message:internal");

        let wrapped: FramewireError = CodeError::new(500, "other text").into();
        assert!(err.is(&wrapped));
        assert!(!CodeError::new(501, "x").is(&wrapped));
        assert!(!err.is(&FramewireError::EmptyBody));
    }

    #[test]
    fn test_with_message_keeps_code() {
        let not_found = CodeError::new(404, "not found");
        let wrapped = not_found.clone().with_message("user 7");
        assert_eq!(wrapped.to_string(), "user 7: code:404, message:not found");
        assert_eq!(wrapped.code_error(), &not_found);
        assert_eq!(cause(&wrapped), Some(&not_found));
        assert!(not_found.is(&wrapped));

        let err: FramewireError = wrapped.into();
        assert!(not_found.is(&err));
        assert!(!CodeError::new(500, "x").is(&err));
        assert!(!err.is_framing());
    }

    #[test]
    fn test_cause_of_plain_error_is_none() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(cause(&io).is_none());
        assert!(cause(&FramewireError::EmptyBody).is_none());
    }

    #[test]
    fn test_serializes_as_object() {
        let json = serde_json::to_value(CodeError::new(404, "missing")).unwrap();
        assert_eq!(json, serde_json::json!({"code": 404, "message": "missing"}));
    }
}
