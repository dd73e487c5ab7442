//! # Error Taxonomy
//!
//! Purpose: Give every failure of the connection engine a single typed home,
//! with a stable numeric code for callers that log or compare codes.
//!
//! ## Design Principles
//! 1. **Enumerated Kinds**: One enum, one variant per failure class.
//! 2. **Scoped Server Errors**: `Server` carries the peer's message verbatim.
//! 3. **Stable Codes**: `ErrorKind::code()` never changes between releases.

use std::fmt;
use std::io;

use bytes::Bytes;
use thiserror::Error;

/// Result type used across the workspace.
pub type RespResult<T> = Result<T, RespError>;

/// Errors surfaced by the encoder, the reply decoder and the connection engine.
#[derive(Debug, Error)]
pub enum RespError {
    /// Socket creation failed.
    #[error("no file descriptor: {0}")]
    NoFileDescriptor(#[source] io::Error),

    /// Name resolution, connect, or socket I/O failed at the OS level.
    #[error("connect failure: {0}")]
    ConnectFailure(#[from] io::Error),

    /// A readiness check did not become ready within the configured window.
    #[error("operation timeout")]
    Timeout,

    /// Prefix, terminator, or length field did not match the grammar.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A line or fixed-length read exceeded the configured bound.
    #[error("reply too big: exceeds {limit} bytes")]
    TooBig { limit: usize },

    /// The peer answered with an error reply; the payload is kept as sent.
    #[error("server error: {}", String::from_utf8_lossy(.0))]
    Server(Bytes),

    /// A bulk or array reply carried the "no value" sentinel.
    #[error("null or absent value")]
    NullOrAbsent,

    /// The handle has no open socket.
    #[error("not connected")]
    NotConnected,

    /// The reply was well formed but not the value the command expects.
    #[error("unexpected reply: {0}")]
    Unexpected(String),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RespError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RespError::NoFileDescriptor(_) => ErrorKind::NoFileDescriptor,
            RespError::ConnectFailure(_) => ErrorKind::ConnectFailure,
            RespError::Timeout => ErrorKind::Timeout,
            RespError::Protocol(_) => ErrorKind::Protocol,
            RespError::TooBig { .. } => ErrorKind::TooBig,
            RespError::Server(_) => ErrorKind::Server,
            RespError::NullOrAbsent => ErrorKind::NullOrAbsent,
            RespError::NotConnected => ErrorKind::NotConnected,
            RespError::Unexpected(_) => ErrorKind::Unexpected,
            RespError::Config(_) => ErrorKind::Config,
        }
    }

    /// Shorthand for building a protocol error.
    pub fn protocol(reason: impl Into<String>) -> Self {
        RespError::Protocol(reason.into())
    }

    /// True when the error means "no value" rather than a failure.
    pub fn is_null(&self) -> bool {
        matches!(self, RespError::NullOrAbsent)
    }

    /// True when the connection is still request-aligned after this error.
    ///
    /// Only errors scoped to a single, fully consumed reply qualify. Anything
    /// else leaves the receive buffer in an undefined position and the caller
    /// must reconnect.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RespError::Server(_) | RespError::NullOrAbsent | RespError::Unexpected(_)
        )
    }
}

/// Copyable classification of a [`RespError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NullOrAbsent,
    Unexpected,
    NoFileDescriptor,
    ConnectFailure,
    TooBig,
    Timeout,
    Protocol,
    Server,
    NotConnected,
    Config,
}

impl ErrorKind {
    /// Stable negative code for the kind.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::NullOrAbsent => 0,
            ErrorKind::Unexpected => -1,
            ErrorKind::NoFileDescriptor => -3,
            ErrorKind::ConnectFailure => -4,
            ErrorKind::TooBig => -5,
            ErrorKind::Timeout => -6,
            ErrorKind::Protocol => -7,
            ErrorKind::Server => -8,
            ErrorKind::NotConnected => -9,
            ErrorKind::Config => -10,
        }
    }

    /// Maps a code produced by [`ErrorKind::code`] back to its kind.
    pub fn from_code(code: i32) -> Option<Self> {
        let kind = match code {
            0 => ErrorKind::NullOrAbsent,
            -1 => ErrorKind::Unexpected,
            -3 => ErrorKind::NoFileDescriptor,
            -4 => ErrorKind::ConnectFailure,
            -5 => ErrorKind::TooBig,
            -6 => ErrorKind::Timeout,
            -7 => ErrorKind::Protocol,
            -8 => ErrorKind::Server,
            -9 => ErrorKind::NotConnected,
            -10 => ErrorKind::Config,
            _ => return None,
        };
        Some(kind)
    }

    /// Fixed description of the kind.
    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::NullOrAbsent => "invalid key value",
            ErrorKind::Unexpected => "result unexpected",
            ErrorKind::NoFileDescriptor => "no file descriptor",
            ErrorKind::ConnectFailure => "connect failure",
            ErrorKind::TooBig => "command too big",
            ErrorKind::Timeout => "operation timeout",
            ErrorKind::Protocol => "protocol error",
            ErrorKind::Server => "server return error",
            ErrorKind::NotConnected => "not connected yet",
            ErrorKind::Config => "invalid configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
