// src/core/errors.rs

//! Defines the primary error type for the connection core.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing every failure a connection can observe.
#[derive(Error, Debug)]
pub enum SpindleError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// Raised by a `Task` when a received chunk cannot be interpreted.
    /// Non-fatal: the connection logs it and resumes reading.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Read timed out")]
    Timeout,

    #[error("TLS Error: {0}")]
    Tls(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

// `std::io::Error` is not cloneable, so it is shared behind an `Arc`.
impl Clone for SpindleError {
    fn clone(&self) -> Self {
        match self {
            SpindleError::Io(e) => SpindleError::Io(Arc::clone(e)),
            SpindleError::MalformedInput(s) => SpindleError::MalformedInput(s.clone()),
            SpindleError::Timeout => SpindleError::Timeout,
            SpindleError::Tls(s) => SpindleError::Tls(s.clone()),
            SpindleError::Internal(s) => SpindleError::Internal(s.clone()),
        }
    }
}

impl PartialEq for SpindleError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SpindleError::Io(e1), SpindleError::Io(e2)) => {
                e1.kind() == e2.kind() && e1.to_string() == e2.to_string()
            }
            (SpindleError::MalformedInput(s1), SpindleError::MalformedInput(s2)) => s1 == s2,
            (SpindleError::Tls(s1), SpindleError::Tls(s2)) => s1 == s2,
            (SpindleError::Internal(s1), SpindleError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl SpindleError {
    /// Returns true for transport errors that simply mean the peer went away.
    pub fn is_normal_disconnect(&self) -> bool {
        matches!(self, SpindleError::Io(e) if matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionAborted
        ))
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for SpindleError {
    fn from(e: std::io::Error) -> Self {
        SpindleError::Io(Arc::new(e))
    }
}

impl From<std::str::Utf8Error> for SpindleError {
    fn from(e: std::str::Utf8Error) -> Self {
        SpindleError::MalformedInput(format!("invalid UTF-8: {e}"))
    }
}

impl From<tokio::time::error::Elapsed> for SpindleError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        SpindleError::Timeout
    }
}

impl From<rustls::Error> for SpindleError {
    fn from(e: rustls::Error) -> Self {
        SpindleError::Tls(e.to_string())
    }
}
