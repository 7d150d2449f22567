//! # Protocol Messages
//!
//! Purpose: Define the request and response shapes exchanged between the
//! dispatcher and a transport, independent of the on-wire byte layout.
//!
//! ## Design Principles
//!
//! 1. **Transport-Agnostic**: Messages carry decoded fields; framing and socket
//!    I/O belong to the transport.
//! 2. **Opaque Round-Trip**: `opaque` carries the correlation token end-to-end.
//!    Transports must echo it unmodified.
//! 3. **Owned Payloads**: Keys and values are `Bytes`/`KeyBuf` so messages can be
//!    moved across the send boundary without borrowing caller buffers.
//!
//! ## Usage Notes
//!
//! - Requests are built by the dispatcher; callers never pick the token.
//! - Responses are built by the transport from a decoded frame. The `opcode`
//!   is kept as the raw byte so that an unexpected opcode can still be
//!   reported precisely.
//! - `status` is `STATUS_OK` on success, or one of the server status codes.
//!
//! ## Field Map
//!
//! ```text
//! Request:
//! +---------+---------+--------+---------+---------+---------+
//! | opcode  | opaque  | cas    | extras  | key     | value   |
//! +---------+---------+--------+---------+---------+---------+
//! | Opcode  | Token   | Cas    | 0 or 8B | KeyBuf  | Bytes   |
//! +---------+---------+--------+---------+---------+---------+
//!
//! Response:
//! +---------+---------+----------------+--------+---------+---------+
//! | opcode  | opaque  | status         | cas    | key     | value   |
//! +---------+---------+----------------+--------+---------+---------+
//! | u8      | Token   | ResponseStatus | Cas    | Bytes   | Bytes   |
//! +---------+---------+----------------+--------+---------+---------+
//! ```

use std::fmt;

use bytes::Bytes;

use crate::opcode::Opcode;
use crate::types::{Cas, KeyBuf, StoreArgs, Token};

/// No error.
pub const STATUS_OK: u16 = 0x0000;
/// Key not found.
pub const STATUS_KEY_NOT_FOUND: u16 = 0x0001;
/// Key exists (ADD on a present key, CAS mismatch).
pub const STATUS_KEY_EXISTS: u16 = 0x0002;
/// Value too large.
pub const STATUS_VALUE_TOO_LARGE: u16 = 0x0003;
/// Invalid arguments.
pub const STATUS_INVALID_ARGUMENTS: u16 = 0x0004;
/// Item not stored (REPLACE on a missing key).
pub const STATUS_ITEM_NOT_STORED: u16 = 0x0005;
/// Incr/decr on a non-numeric value.
pub const STATUS_NON_NUMERIC: u16 = 0x0006;
/// Unknown command.
pub const STATUS_UNKNOWN_COMMAND: u16 = 0x0081;
/// Out of memory.
pub const STATUS_OUT_OF_MEMORY: u16 = 0x0082;

/// Status code reported by a server in a response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    NoError,
    KeyNotFound,
    KeyExists,
    ValueTooLarge,
    InvalidArguments,
    ItemNotStored,
    NonNumeric,
    UnknownCommand,
    OutOfMemory,
    /// Any code this client does not name.
    Other(u16),
}

impl ResponseStatus {
    /// Maps a raw status code
    pub const fn from_u16(code: u16) -> Self {
        match code {
            STATUS_OK => Self::NoError,
            STATUS_KEY_NOT_FOUND => Self::KeyNotFound,
            STATUS_KEY_EXISTS => Self::KeyExists,
            STATUS_VALUE_TOO_LARGE => Self::ValueTooLarge,
            STATUS_INVALID_ARGUMENTS => Self::InvalidArguments,
            STATUS_ITEM_NOT_STORED => Self::ItemNotStored,
            STATUS_NON_NUMERIC => Self::NonNumeric,
            STATUS_UNKNOWN_COMMAND => Self::UnknownCommand,
            STATUS_OUT_OF_MEMORY => Self::OutOfMemory,
            other => Self::Other(other),
        }
    }

    /// Returns the raw status code
    pub const fn code(self) -> u16 {
        match self {
            Self::NoError => STATUS_OK,
            Self::KeyNotFound => STATUS_KEY_NOT_FOUND,
            Self::KeyExists => STATUS_KEY_EXISTS,
            Self::ValueTooLarge => STATUS_VALUE_TOO_LARGE,
            Self::InvalidArguments => STATUS_INVALID_ARGUMENTS,
            Self::ItemNotStored => STATUS_ITEM_NOT_STORED,
            Self::NonNumeric => STATUS_NON_NUMERIC,
            Self::UnknownCommand => STATUS_UNKNOWN_COMMAND,
            Self::OutOfMemory => STATUS_OUT_OF_MEMORY,
            Self::Other(code) => code,
        }
    }

    #[inline]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::NoError)
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoError => write!(f, "no error"),
            Self::KeyNotFound => write!(f, "key not found"),
            Self::KeyExists => write!(f, "key exists"),
            Self::ValueTooLarge => write!(f, "value too large"),
            Self::InvalidArguments => write!(f, "invalid arguments"),
            Self::ItemNotStored => write!(f, "item not stored"),
            Self::NonNumeric => write!(f, "non-numeric value"),
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::Other(code) => write!(f, "status {:#06x}", code),
        }
    }
}

/// Request handed to a transport for transmission.
///
/// Use: Built by the dispatcher once a host and token have been chosen. The
/// transport owns the request (and its key) from `send` onward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Command opcode.
    pub opcode: Opcode,
    /// Correlation token (opaque header field).
    pub opaque: Token,
    /// Transformed key.
    pub key: KeyBuf,
    /// Value bytes (empty for GET/GETK).
    pub value: Bytes,
    /// Flags/expiry for SET and REPLACE.
    pub extras: Option<StoreArgs>,
    /// CAS constraint (zero for none).
    pub cas: Cas,
}

impl Request {
    /// Builds a key-echoing fetch.
    pub fn getk(key: KeyBuf, opaque: Token) -> Self {
        Request {
            opcode: Opcode::GetK,
            opaque,
            key,
            value: Bytes::new(),
            extras: None,
            cas: Cas::NONE,
        }
    }

    /// Builds an ADD.
    pub fn add(key: KeyBuf, value: Bytes, opaque: Token) -> Self {
        Request {
            opcode: Opcode::Add,
            opaque,
            key,
            value,
            extras: None,
            cas: Cas::NONE,
        }
    }

    /// Builds a SET or REPLACE.
    pub fn store(
        opcode: Opcode,
        key: KeyBuf,
        value: Bytes,
        cas: Cas,
        args: StoreArgs,
        opaque: Token,
    ) -> Self {
        debug_assert!(matches!(opcode, Opcode::Set | Opcode::Replace));
        Request {
            opcode,
            opaque,
            key,
            value,
            extras: Some(args),
            cas,
        }
    }

    /// Encoded extras block, empty when the opcode carries none.
    pub fn extras_bytes(&self) -> Vec<u8> {
        match self.extras {
            Some(args) => args.to_extras().to_vec(),
            None => Vec::new(),
        }
    }
}

/// Response delivered by a transport into the dispatcher.
///
/// Use: Built by the transport from a decoded response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Raw opcode echoed by the server.
    pub opcode: u8,
    /// Correlation token echoed from the request.
    pub opaque: Token,
    /// Server status.
    pub status: ResponseStatus,
    /// Echoed key (GETK only; empty otherwise).
    pub key: Bytes,
    /// Value bytes (get family only).
    pub value: Bytes,
    /// CAS token assigned by the server.
    pub cas: Cas,
}

impl Response {
    /// Builds a status-only response for the given opcode and token.
    pub fn new(opcode: Opcode, opaque: Token, status: ResponseStatus) -> Self {
        Response {
            opcode: opcode.as_u8(),
            opaque,
            status,
            key: Bytes::new(),
            value: Bytes::new(),
            cas: Cas::NONE,
        }
    }

    /// Attaches a key and value (get family replies).
    pub fn with_value(mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        self.key = key.into();
        self.value = value.into();
        self
    }

    /// Attaches a CAS token.
    pub fn with_cas(mut self, cas: Cas) -> Self {
        self.cas = cas;
        self
    }

    /// Decoded opcode, if known to this client.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }
}
