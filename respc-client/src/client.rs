//! # Typed Command Facade
//!
//! Purpose: Offer a small set of everyday commands on top of the four
//! operate primitives, so callers do not hand-build requests.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `RespClient` hides request building and reply
//!    shape checks behind typed methods.
//! 2. **Borrow-Friendly API**: Keys and values are taken as `&[u8]`.
//! 3. **Fail Fast**: A status other than the expected one is `Unexpected`.

use std::collections::HashSet;
use std::time::Duration;

use bytes::Bytes;
use respc_common::{Arg, Reply, Request, RespError, RespResult};

use crate::config::ClientConfig;
use crate::connection::Connection;

/// TTL state of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key is missing.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the duration.
    ExpiresIn(Duration),
}

/// Synchronous client exposing typed commands.
#[derive(Debug)]
pub struct RespClient {
    conn: Connection,
}

impl RespClient {
    /// Connects to `host`/`port` with default settings.
    pub fn connect(host: &str, port: u16) -> RespResult<Self> {
        Self::with_config(ClientConfig::new(host, port))
    }

    pub fn with_config(config: ClientConfig) -> RespResult<Self> {
        Ok(RespClient {
            conn: Connection::open(config)?,
        })
    }

    /// Wraps an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        RespClient { conn }
    }

    pub fn connection(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    // ------------------------------------------------------------------
    // Server
    // ------------------------------------------------------------------

    pub fn auth(&mut self, password: &str) -> RespResult<()> {
        let status = self.conn.send_status_command("AUTH", &[Arg::Str(password)])?;
        expect_status(&status, "OK")
    }

    pub fn ping(&mut self) -> RespResult<()> {
        let status = self.conn.send_status_command("PING", &[])?;
        expect_status(&status, "PONG")
    }

    pub fn select(&mut self, index: i64) -> RespResult<()> {
        let status = self.conn.send_status_command("SELECT", &[Arg::Int(index)])?;
        expect_status(&status, "OK")
    }

    pub fn info(&mut self) -> RespResult<Bytes> {
        self.conn.send_bulk_command("INFO", &[])
    }

    pub fn dbsize(&mut self) -> RespResult<u64> {
        let size = self.conn.send_integer_command("DBSIZE", &[])?;
        u64::try_from(size).map_err(|_| RespError::Unexpected(format!("negative size {}", size)))
    }

    pub fn flushdb(&mut self) -> RespResult<()> {
        let status = self.conn.send_status_command("FLUSHDB", &[])?;
        expect_status(&status, "OK")
    }

    pub fn keys(&mut self, pattern: &str) -> RespResult<Vec<Bytes>> {
        self.conn.operate_list(&Request::command("KEYS", &[Arg::Str(pattern)]))
    }

    // ------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------

    pub fn exists(&mut self, key: &[u8]) -> RespResult<bool> {
        Ok(self.conn.send_integer_command("EXISTS", &[Arg::Bytes(key)])? > 0)
    }

    /// Returns true when the key was removed.
    pub fn del(&mut self, key: &[u8]) -> RespResult<bool> {
        Ok(self.conn.send_integer_command("DEL", &[Arg::Bytes(key)])? > 0)
    }

    /// Returns true when the timeout was set.
    pub fn expire(&mut self, key: &[u8], ttl: Duration) -> RespResult<bool> {
        let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let set = self
            .conn
            .send_integer_command("EXPIRE", &[Arg::Bytes(key), Arg::Int(secs)])?;
        Ok(set == 1)
    }

    pub fn ttl(&mut self, key: &[u8]) -> RespResult<KeyTtl> {
        match self.conn.send_integer_command("TTL", &[Arg::Bytes(key)])? {
            -2 => Ok(KeyTtl::Missing),
            -1 => Ok(KeyTtl::NoExpiry),
            secs if secs >= 0 => Ok(KeyTtl::ExpiresIn(Duration::from_secs(secs as u64))),
            other => Err(RespError::Unexpected(format!("ttl {}", other))),
        }
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> RespResult<()> {
        let status = self
            .conn
            .send_status_command("SET", &[Arg::Bytes(key), Arg::Bytes(value)])?;
        expect_status(&status, "OK")
    }

    /// Returns `None` when the key is missing.
    pub fn get(&mut self, key: &[u8]) -> RespResult<Option<Bytes>> {
        optional(self.conn.send_bulk_command("GET", &[Arg::Bytes(key)]))
    }

    /// Values in key order; missing keys are `None`.
    pub fn mget(&mut self, keys: &[&[u8]]) -> RespResult<Vec<Option<Bytes>>> {
        let mut builder = Request::builder(keys.len() + 1);
        builder.push_str("MGET");
        for key in keys {
            builder.push_bytes(key);
        }
        match self.conn.execute(&builder.build())?.into_result()? {
            Reply::Array(Some(items)) => Ok(items),
            other => Err(RespError::Unexpected(format!("{:?}", other))),
        }
    }

    pub fn incr_by(&mut self, key: &[u8], delta: i64) -> RespResult<i64> {
        self.conn
            .send_integer_command("INCRBY", &[Arg::Bytes(key), Arg::Int(delta)])
    }

    // ------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------

    /// Returns the list length after the push.
    pub fn rpush(&mut self, key: &[u8], element: &[u8]) -> RespResult<i64> {
        self.conn
            .send_integer_command("RPUSH", &[Arg::Bytes(key), Arg::Bytes(element)])
    }

    pub fn lrange(&mut self, key: &[u8], start: i64, stop: i64) -> RespResult<Vec<Bytes>> {
        self.conn.operate_list(&Request::command(
            "LRANGE",
            &[Arg::Bytes(key), Arg::Int(start), Arg::Int(stop)],
        ))
    }

    // ------------------------------------------------------------------
    // Sets
    // ------------------------------------------------------------------

    /// Returns true when the member was new.
    pub fn sadd(&mut self, key: &[u8], member: &[u8]) -> RespResult<bool> {
        let added = self
            .conn
            .send_integer_command("SADD", &[Arg::Bytes(key), Arg::Bytes(member)])?;
        Ok(added > 0)
    }

    pub fn smembers(&mut self, key: &[u8]) -> RespResult<HashSet<Bytes>> {
        self.conn
            .operate_set(&Request::command("SMEMBERS", &[Arg::Bytes(key)]))
    }

    pub fn sinter(&mut self, keys: &[&[u8]]) -> RespResult<HashSet<Bytes>> {
        let args: Vec<Arg<'_>> = keys.iter().map(|key| Arg::Bytes(*key)).collect();
        self.conn.operate_set(&Request::command("SINTER", &args))
    }

    // ------------------------------------------------------------------
    // Sorted sets
    // ------------------------------------------------------------------

    /// Returns true when the member was new.
    pub fn zadd(&mut self, key: &[u8], score: f64, member: &[u8]) -> RespResult<bool> {
        let added = self.conn.send_integer_command(
            "ZADD",
            &[Arg::Bytes(key), Arg::Float(score), Arg::Bytes(member)],
        )?;
        Ok(added > 0)
    }

    /// Score of `member`, or `None` when it is not in the set.
    pub fn zscore(&mut self, key: &[u8], member: &[u8]) -> RespResult<Option<f64>> {
        let raw = optional(
            self.conn
                .send_bulk_command("ZSCORE", &[Arg::Bytes(key), Arg::Bytes(member)]),
        )?;
        raw.map(|bytes| {
            std::str::from_utf8(&bytes)
                .ok()
                .and_then(|text| text.parse::<f64>().ok())
                .ok_or_else(|| RespError::Unexpected(format!("score {:?}", bytes)))
        })
        .transpose()
    }

    // ------------------------------------------------------------------
    // Hashes
    // ------------------------------------------------------------------

    /// Returns true when the field was new.
    pub fn hset(&mut self, key: &[u8], field: &[u8], value: &[u8]) -> RespResult<bool> {
        let added = self.conn.send_integer_command(
            "HSET",
            &[Arg::Bytes(key), Arg::Bytes(field), Arg::Bytes(value)],
        )?;
        Ok(added > 0)
    }

    pub fn hget(&mut self, key: &[u8], field: &[u8]) -> RespResult<Option<Bytes>> {
        optional(
            self.conn
                .send_bulk_command("HGET", &[Arg::Bytes(key), Arg::Bytes(field)]),
        )
    }

    /// Field/value pairs in server order.
    pub fn hgetall(&mut self, key: &[u8]) -> RespResult<Vec<(Bytes, Bytes)>> {
        let flat = self
            .conn
            .operate_list(&Request::command("HGETALL", &[Arg::Bytes(key)]))?;
        if flat.len() % 2 != 0 {
            return Err(RespError::Unexpected(format!(
                "odd field/value count {}",
                flat.len()
            )));
        }
        let mut pairs = Vec::with_capacity(flat.len() / 2);
        let mut iter = flat.into_iter();
        while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
            pairs.push((field, value));
        }
        Ok(pairs)
    }
}

fn expect_status(status: &[u8], expected: &str) -> RespResult<()> {
    if status == expected.as_bytes() {
        Ok(())
    } else {
        Err(RespError::Unexpected(format!(
            "expected {}, got {}",
            expected,
            String::from_utf8_lossy(status)
        )))
    }
}

fn optional<T>(result: RespResult<T>) -> RespResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(RespError::NullOrAbsent) => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mismatch_is_unexpected() {
        assert!(expect_status(b"OK", "OK").is_ok());
        let err = expect_status(b"QUEUED", "OK").unwrap_err();
        assert!(matches!(err, RespError::Unexpected(_)));
    }

    #[test]
    fn null_maps_to_none() {
        assert_eq!(optional::<u8>(Err(RespError::NullOrAbsent)).unwrap(), None);
        assert_eq!(optional(Ok(3)).unwrap(), Some(3));
        assert!(optional::<u8>(Err(RespError::Timeout)).is_err());
    }
}
