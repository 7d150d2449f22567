//! # Request Value Types
//!
//! Core value types shared by the dispatcher and transports: correlation
//! tokens, CAS tokens, owned key buffers, store arguments, and connection
//! identity.
//!
//! ## Design Principles
//!
//! 1. **Newtypes over Integers**: Tokens, CAS values and connection ids are
//!    distinct types so they cannot be swapped at call sites.
//!
//! 2. **Owned Key Handoff**: A transformed key is an owned `KeyBuf` that moves
//!    into the request handed to the transport. Whoever holds it last drops it,
//!    so it is released exactly once.
//!
//! 3. **Cheap Clones**: `KeyBuf` is backed by `bytes::Bytes`; the dispatcher can
//!    keep a handle for fault replies without copying the key.
//!
//! 4. **Wrapping Tokens**: Correlation tokens wrap at `u32::MAX`; reuse is only
//!    possible after the full range has been consumed.
//!
//! ## Extras Layout
//!
//! ```text
//! StoreArgs extras (8 bytes, network byte order):
//! +----------+-----------+
//! | flags:4B | expiry:4B |
//! +----------+-----------+
//! ```

use std::fmt;

use bytes::Bytes;
use serde::Deserialize;

/// Maximum key length accepted by memcached servers.
pub const MAX_KEY_LEN: usize = 250;

/// Size of the extras block carried by SET/REPLACE.
pub const STORE_EXTRAS_LEN: usize = 8;

/// Correlation token echoed by the server in the opaque header field.
///
/// Assigned by the dispatcher at issue time from a wrapping counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// First token handed out by a fresh client
    pub const ZERO: Token = Token(0);

    /// Creates a token from a raw opaque value
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Token(raw)
    }

    /// Returns the raw opaque value
    #[inline]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Returns the following token, wrapping at `u32::MAX`
    #[inline]
    pub const fn next(&self) -> Token {
        Token(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Compare-and-swap version token.
///
/// Zero means "no CAS" on requests and "unknown" on fault replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cas(pub u64);

impl Cas {
    /// No CAS constraint
    pub const NONE: Cas = Cas(0);

    #[inline]
    pub const fn new(v: u64) -> Self {
        Cas(v)
    }

    #[inline]
    pub const fn get(&self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// Owned key buffer produced by a key transform.
///
/// Moving a `KeyBuf` into a `Request` hands ownership to the transport for the
/// duration of the send; dropping it releases the buffer.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyBuf(Bytes);

impl KeyBuf {
    /// Wraps an already-owned buffer
    #[inline]
    pub fn new(data: impl Into<Bytes>) -> Self {
        KeyBuf(data.into())
    }

    /// Copies a borrowed key into a new owned buffer
    #[inline]
    pub fn copy_from_slice(data: &[u8]) -> Self {
        KeyBuf(Bytes::copy_from_slice(data))
    }

    /// Returns the key bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the key length
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the buffer, returning the shared bytes
    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl AsRef<[u8]> for KeyBuf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for KeyBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.len() <= 64 {
            write!(f, "KeyBuf({:?})", String::from_utf8_lossy(self.as_bytes()))
        } else {
            write!(f, "KeyBuf({}B)", self.len())
        }
    }
}

impl fmt::Display for KeyBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// Item flags and expiry carried by SET and REPLACE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreArgs {
    /// Opaque client flags stored alongside the item
    pub flags: u32,
    /// Expiration (seconds, or an absolute unix time above 30 days)
    pub expiry: u32,
}

impl StoreArgs {
    pub const fn new(flags: u32, expiry: u32) -> Self {
        StoreArgs { flags, expiry }
    }

    /// Encodes the extras block: flags then expiry, both big-endian
    pub fn to_extras(&self) -> [u8; STORE_EXTRAS_LEN] {
        let mut out = [0u8; STORE_EXTRAS_LEN];
        out[..4].copy_from_slice(&self.flags.to_be_bytes());
        out[4..].copy_from_slice(&self.expiry.to_be_bytes());
        out
    }
}

/// Identity of a live transport connection.
///
/// Allocated by the transport on `connect`; used by the dispatcher to match
/// connection-error notifications back to a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection flavour requested from the transport.
///
/// All hosts of one client share the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Stream connection
    #[default]
    Tcp,
    /// Datagram connection
    Udp,
}
