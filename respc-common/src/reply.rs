//! # Reply Model
//!
//! Purpose: Name the five reply shapes and hold the pure parsing helpers the
//! decoder applies to header lines.
//!
//! ## Design Principles
//! 1. **Tagged Union**: One `Reply` variant per prefix byte.
//! 2. **Explicit Sentinels**: `-1` means "no value", `0` means "empty".
//! 3. **Strict Integers**: Header digits are validated, never guessed.

use std::collections::HashSet;

use bytes::Bytes;

use crate::error::{RespError, RespResult};

/// Prefix byte of a status reply.
pub const PREFIX_STATUS: u8 = b'+';
/// Prefix byte of an error reply.
pub const PREFIX_ERROR: u8 = b'-';
/// Prefix byte of an integer reply.
pub const PREFIX_INTEGER: u8 = b':';
/// Prefix byte of a bulk reply.
pub const PREFIX_BULK: u8 = b'$';
/// Prefix byte of an array reply.
pub const PREFIX_ARRAY: u8 = b'*';

/// Length or count announcing "no value".
pub const NULL_LENGTH: i64 = -1;

/// Reply decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK` style status line, bytes as sent.
    Status(Bytes),
    /// `-ERR ...` line, bytes as sent.
    Error(Bytes),
    /// `:123`.
    Integer(i64),
    /// `$...` payload, `None` for the null sentinel.
    Bulk(Option<Bytes>),
    /// `*...` of bulks, `None` for the null sentinel.
    Array(Option<Vec<Option<Bytes>>>),
}

impl Reply {
    /// Maps an `Error` reply into [`RespError::Server`].
    pub fn into_result(self) -> RespResult<Reply> {
        match self {
            Reply::Error(message) => Err(RespError::Server(message)),
            other => Ok(other),
        }
    }
}

/// How an array reply should be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    /// Keep wire order and duplicates.
    List,
    /// Drop duplicates, no order.
    Set,
}

/// Collected array reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayReply {
    List(Vec<Bytes>),
    Set(HashSet<Bytes>),
}

impl ArrayReply {
    pub fn new(kind: ArrayKind, capacity: usize) -> Self {
        match kind {
            ArrayKind::List => ArrayReply::List(Vec::with_capacity(capacity)),
            ArrayKind::Set => ArrayReply::Set(HashSet::with_capacity(capacity)),
        }
    }

    pub fn push(&mut self, item: Bytes) {
        match self {
            ArrayReply::List(items) => items.push(item),
            ArrayReply::Set(items) => {
                items.insert(item);
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayReply::List(items) => items.len(),
            ArrayReply::Set(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the ordered items, or `None` for a set.
    pub fn into_list(self) -> Option<Vec<Bytes>> {
        match self {
            ArrayReply::List(items) => Some(items),
            ArrayReply::Set(_) => None,
        }
    }

    /// Returns the items as a set; lists are deduplicated.
    pub fn into_set(self) -> HashSet<Bytes> {
        match self {
            ArrayReply::List(items) => items.into_iter().collect(),
            ArrayReply::Set(items) => items,
        }
    }
}

/// Parses a signed decimal header such as `-42`.
pub fn parse_integer(data: &[u8]) -> RespResult<i64> {
    let (negative, digits) = match data.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some(_) => (false, data),
        None => return Err(RespError::protocol("empty integer")),
    };
    if digits.is_empty() {
        return Err(RespError::protocol("integer without digits"));
    }

    // Accumulate as negative so that i64::MIN parses without overflow.
    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(RespError::protocol(format!(
                "invalid integer {:?}",
                String::from_utf8_lossy(data)
            )));
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_sub(i64::from(b - b'0')))
            .ok_or_else(|| RespError::protocol("integer overflow"))?;
    }

    if negative {
        Ok(value)
    } else {
        value
            .checked_neg()
            .ok_or_else(|| RespError::protocol("integer overflow"))
    }
}

/// Parses a bulk length or array count header.
///
/// Returns `Ok(None)` for the null sentinel and rejects any other negative.
pub fn parse_length(data: &[u8]) -> RespResult<Option<usize>> {
    let value = parse_integer(data)?;
    if value == NULL_LENGTH {
        return Ok(None);
    }
    if value < 0 {
        return Err(RespError::protocol(format!("negative length {}", value)));
    }
    usize::try_from(value)
        .map(Some)
        .map_err(|_| RespError::protocol(format!("length {} out of range", value)))
}
