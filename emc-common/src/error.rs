//! # Transport and Protocol Errors
//!
//! Two separate channels:
//!
//! - `TransportError` is the ordinary, recoverable failure a transport
//!   returns from `connect` or `send`.
//! - `ProtocolViolation` is a broken contract between the dispatcher and its
//!   transport (or caller). It is never mixed into the recoverable channel:
//!   the host application is expected to abort or tear the client down.

use std::io;

use thiserror::Error;

use crate::types::{ConnectionId, Token};

/// Failure reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    /// Request could not be queued for transmission.
    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    /// The connection handle is no longer usable.
    #[error("connection closed")]
    Closed,
}

/// Non-recoverable dispatcher invariant violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// A token was inserted while an earlier request with the same token was
    /// still pending (token space exhausted with unretired entries).
    #[error("correlation token {0} is already pending")]
    TokenCollision(Token),

    /// A response arrived for a token that is not pending.
    #[error("response for unknown correlation token {0}")]
    UnknownToken(Token),

    /// The echoed opcode differs from the opcode that was sent.
    #[error("response for token {token} has opcode {received:#04x}, sent {sent:#04x}")]
    OpcodeMismatch { token: Token, sent: u8, received: u8 },

    /// A connection error names a connection no host owns.
    #[error("connection error for unknown connection {0}")]
    UnknownConnection(ConnectionId),
}
