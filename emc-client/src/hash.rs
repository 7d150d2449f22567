//! # Sharding Strategies
//!
//! Purpose: Map a (transformed) key to the index of the host that owns it.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: The dispatcher only sees `ShardingStrategy`; built-in
//!    strategies and caller closures are interchangeable.
//! 2. **Pure Functions**: Strategies hold no state and have no side effects, so
//!    they are safe to call from anywhere.
//! 3. **Explicit Absence**: "No eligible host" and "not implemented" are distinct
//!    errors; a strategy never silently falls back to another.
//!
//! ## Contract
//! `select(key, host_count)` returns `Ok(index)` with `index < host_count`, or an
//! error. The dispatcher additionally treats an out-of-range index as
//! `NoEligibleHost`.

use serde::Deserialize;
use thiserror::Error;

/// Result of a host selection.
pub type ShardResult = Result<usize, ShardError>;

/// Reasons a strategy could not pick a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShardError {
    /// No host can own the key (for example, an empty host table).
    #[error("no eligible host")]
    NoEligibleHost,

    /// The strategy exists in name only.
    #[error("sharding strategy `{0}` is not implemented")]
    NotImplemented(&'static str),
}

/// Maps a key to a host index.
pub trait ShardingStrategy {
    /// Selects the owning host for `key` among `host_count` hosts.
    fn select(&self, key: &[u8], host_count: usize) -> ShardResult;
}

impl<F> ShardingStrategy for F
where
    F: Fn(&[u8], usize) -> ShardResult,
{
    fn select(&self, key: &[u8], host_count: usize) -> ShardResult {
        self(key, host_count)
    }
}

/// Always selects the first host.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fixed;

impl ShardingStrategy for Fixed {
    fn select(&self, _key: &[u8], host_count: usize) -> ShardResult {
        if host_count == 0 {
            return Err(ShardError::NoEligibleHost);
        }
        Ok(0)
    }
}

/// CRC-32 (IEEE) of the raw key bytes, modulo the host count.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32Modulo;

impl ShardingStrategy for Crc32Modulo {
    fn select(&self, key: &[u8], host_count: usize) -> ShardResult {
        if host_count == 0 {
            return Err(ShardError::NoEligibleHost);
        }
        let sum = crc32fast::hash(key);
        Ok((sum as usize) % host_count)
    }
}

/// Consistent-hash ring placeholder.
///
/// Reserved for a ring that keeps remapping minimal when hosts join or leave.
/// No ring is built; every call reports `NotImplemented`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ketama;

impl ShardingStrategy for Ketama {
    fn select(&self, _key: &[u8], _host_count: usize) -> ShardResult {
        Err(ShardError::NotImplemented("ketama"))
    }
}

/// Built-in strategy names accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    /// `Fixed`
    None,
    /// `Crc32Modulo`
    #[default]
    Crc32,
    /// `Ketama`
    Ketama,
}

impl HashKind {
    /// Instantiates the named strategy.
    pub fn strategy(self) -> Box<dyn ShardingStrategy> {
        match self {
            HashKind::None => Box::new(Fixed),
            HashKind::Crc32 => Box::new(Crc32Modulo),
            HashKind::Ketama => Box::new(Ketama),
        }
    }
}
