//! # Client Configuration
//!
//! Purpose: Collect the knobs of one connection (target, timeouts, buffer
//! sizing) with defaults that match the protocol's conventions.
//!
//! ## Design Principles
//! 1. **Plain Data**: Public fields plus `Default`, no hidden state.
//! 2. **Partial Documents**: Every field has a serde default.
//! 3. **Clamped Sizes**: Buffer and length bounds never drop below a floor.

use std::fs;
use std::path::Path;
use std::time::Duration;

use respc_common::{RespError, RespResult};
use serde::Deserialize;

use crate::addr::{DEFAULT_HOST, DEFAULT_PORT};

/// Default per-syscall timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Default receive buffer capacity in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1024;

/// Smallest receive buffer the engine will use.
pub const MIN_BUFFER_CAPACITY: usize = 64;

/// Default bound on a single line or fixed-length read.
pub const DEFAULT_MAX_LENGTH: usize = 64_000;

/// Configuration for one [`crate::Connection`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Host name or IP literal.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Readiness-check window armed before every send/receive.
    pub timeout_ms: u64,
    /// Optional bound on the initial connect; `None` blocks.
    pub connect_timeout_ms: Option<u64>,
    /// Receive buffer capacity in bytes.
    pub buffer_capacity: usize,
    /// Largest line or fixed-length payload accepted from the peer.
    pub max_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            connect_timeout_ms: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `host`/`port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ClientConfig {
            host: host.into(),
            port,
            ..ClientConfig::default()
        }
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(text: &str) -> RespResult<Self> {
        serde_json::from_str(text).map_err(|err| RespError::Config(err.to_string()))
    }

    /// Reads and parses a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> RespResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| RespError::Config(format!("{}: {}", path.display(), err)))?;
        Self::from_json(&text)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Buffer capacity after clamping to [`MIN_BUFFER_CAPACITY`].
    pub fn effective_buffer_capacity(&self) -> usize {
        self.buffer_capacity.max(MIN_BUFFER_CAPACITY)
    }

    /// Length bound after clamping to at least one byte.
    pub fn effective_max_length(&self) -> usize {
        self.max_length.max(1)
    }
}
