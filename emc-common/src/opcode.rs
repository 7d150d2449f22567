// opcode.rs - command opcodes for the memcached binary protocol
//
// This module defines the subset of binary-protocol opcodes the client
// issues, and the classification the dispatcher uses to pick a completion
// shape for each response.
//
// ============================================================================
// OPCODE FAMILIES
// ============================================================================
//
// Every opcode the client sends belongs to exactly one family:
//
// 1. **Get family** (GET, GETK): the reply carries the key (GETK only), the
//    stored value, and a CAS token.
//
// 2. **Store family** (SET, ADD, REPLACE): the reply carries only a status
//    and the CAS token assigned by the server.
//
// The opcode recorded at issue time must match the opcode echoed by the
// server. A mismatch means the framing layer lost sync with the stream.
//
// Opcode numbers follow the memcached binary protocol:
//
//   0x00 GET   0x01 SET   0x02 ADD   0x03 REPLACE   0x0c GETK

/// GET: fetch a value (key is not echoed).
pub const OP_GET: u8 = 0x00;

/// SET: store unconditionally (honours CAS when non-zero).
pub const OP_SET: u8 = 0x01;

/// ADD: store only if the key is absent.
pub const OP_ADD: u8 = 0x02;

/// REPLACE: store only if the key is present.
pub const OP_REPLACE: u8 = 0x03;

/// GETK: fetch a value and echo the key in the reply.
pub const OP_GETK: u8 = 0x0c;

/// Binary protocol opcode.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Fetch a value
    Get = OP_GET,

    /// Store unconditionally
    Set = OP_SET,

    /// Store if absent
    Add = OP_ADD,

    /// Store if present
    Replace = OP_REPLACE,

    /// Fetch a value, echoing the key
    GetK = OP_GETK,
}

/// Completion shape selected by an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandFamily {
    /// Reply carries key, value and CAS.
    Get,
    /// Reply carries status and CAS only.
    Store,
}

impl Opcode {
    /// Convert opcode to its wire number
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to create an opcode from its wire number
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            OP_GET => Some(Self::Get),
            OP_SET => Some(Self::Set),
            OP_ADD => Some(Self::Add),
            OP_REPLACE => Some(Self::Replace),
            OP_GETK => Some(Self::GetK),
            _ => None,
        }
    }

    /// Get human-readable opcode name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Set => "SET",
            Self::Add => "ADD",
            Self::Replace => "REPLACE",
            Self::GetK => "GETK",
        }
    }

    /// Returns the completion family for this opcode
    pub const fn family(self) -> CommandFamily {
        match self {
            Self::Get | Self::GetK => CommandFamily::Get,
            Self::Set | Self::Add | Self::Replace => CommandFamily::Store,
        }
    }

    /// Check if opcode reads a value
    pub const fn is_get(self) -> bool {
        matches!(self.family(), CommandFamily::Get)
    }

    /// Check if opcode stores a value
    pub const fn is_store(self) -> bool {
        matches!(self.family(), CommandFamily::Store)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
