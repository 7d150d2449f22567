//! # Transport Contract
//!
//! Purpose: Describe what the dispatcher needs from the component that owns
//! sockets, framing and the event loop.
//!
//! ## Design Principles
//! 1. **Non-Blocking**: `connect` and `send` return immediately; completion and
//!    failure arrive later through `Client::on_response` and
//!    `Client::on_connection_error`.
//! 2. **Ownership Handoff**: `send` takes the `Request` by value. The transport
//!    owns the transformed key from then on, and drops it once transmitted or
//!    failed.
//! 3. **Opaque Round-Trip**: The request's `opaque` token must come back
//!    unmodified on the matching `Response`.

use std::net::SocketAddr;

#[cfg(test)]
use mockall::automock;

use emc_common::{ConnectionId, ConnectionKind, Request, TransportError};

#[cfg_attr(test, automock)]
pub trait Transport {
    /// Starts a connection to `addr`.
    fn connect(
        &mut self,
        addr: SocketAddr,
        kind: ConnectionKind,
    ) -> Result<ConnectionId, TransportError>;

    /// Queues `request` on `conn`.
    fn send(&mut self, conn: ConnectionId, request: Request) -> Result<(), TransportError>;

    /// Releases `conn`. Must tolerate connections that already failed.
    fn close(&mut self, conn: ConnectionId);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(
        &mut self,
        addr: SocketAddr,
        kind: ConnectionKind,
    ) -> Result<ConnectionId, TransportError> {
        (**self).connect(addr, kind)
    }

    fn send(&mut self, conn: ConnectionId, request: Request) -> Result<(), TransportError> {
        (**self).send(conn, request)
    }

    fn close(&mut self, conn: ConnectionId) {
        (**self).close(conn)
    }
}
