//! # Dispatcher
//!
//! Purpose: Assign correlation tokens, route each request to its host, and
//! match asynchronous responses back to the completion that issued them.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Client` hides sharding, key rewriting, connection
//!    bookkeeping and correlation behind `get`/`add`/`set`/`replace`.
//! 2. **All or Nothing Issue**: A failed `issue` leaves no pending record, opens
//!    no extra state, and does not consume a token.
//! 3. **Exactly-Once Retirement**: Every issued token leaves the index once: by
//!    its response, or by a fault (`ConnectionLost`, `Shutdown`, `TimedOut`,
//!    `Cancelled`) delivered through the same completion.
//! 4. **Separate Fault Channel**: Broken transport contracts come back as
//!    `ProtocolViolation`, never as a `ClientError`.
//!
//! ## Control Flow
//! ```text
//! issue: transform key -> select host -> insert pending -> connect? -> send
//! on_response: lookup token -> check opcode -> remove -> callback
//! on_connection_error: drop connection -> fault that host's pending requests
//! ```

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, trace, warn};

use emc_common::{
    Cas, ConnectionId, ConnectionKind, KeyBuf, Opcode, ProtocolViolation, Request, Response,
    StoreArgs, Token, TransportError,
};

use crate::completion::{Completion, Status};
use crate::hash::{ShardError, ShardingStrategy};
use crate::host::{Host, HostAddress, HostTable};
use crate::key::{copy_key, KeyError, KeyTransform};
use crate::pending::{PendingIndex, PendingRequest};
use crate::stats::{DispatchStats, StatsRecorder};
use crate::transport::Transport;

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Recoverable errors returned synchronously by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The key transform could not produce a key.
    #[error("key transform failed: {0}")]
    KeyTransformFailed(#[source] KeyError),

    /// Sharding found no host for the key, or picked one out of range.
    #[error("no eligible host")]
    NoEligibleHost,

    /// The configured sharding strategy is a placeholder.
    #[error("sharding strategy `{0}` is not implemented")]
    ShardingNotImplemented(&'static str),

    /// Lazy connect to the selected host failed.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: TransportError,
    },

    /// The transport refused the request.
    #[error("send to {addr} failed: {source}")]
    SendFailed {
        addr: SocketAddr,
        #[source]
        source: TransportError,
    },

    /// Bookkeeping memory could not be reserved.
    #[error("allocation failure")]
    AllocationFailure,

    /// A host address is neither IPv4 nor IPv6.
    #[error("unsupported address family: {0}")]
    UnsupportedAddressFamily(String),

    /// A host string could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The builder was finished without a sharding strategy.
    #[error("no sharding strategy configured")]
    MissingShardingStrategy,

    /// The completion cannot receive replies for this opcode.
    #[error("completion does not match {opcode} reply shape")]
    CompletionMismatch { opcode: Opcode },

    /// Configuration values are inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// A command to issue, borrowing the caller's key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// Fetch a value (sent as GETK so the reply echoes the key).
    Get { key: &'a [u8] },
    /// Store only if the key is absent.
    Add { key: &'a [u8], value: Bytes },
    /// Store unconditionally, or against `cas` when non-zero.
    Set {
        key: &'a [u8],
        value: Bytes,
        cas: Cas,
        args: StoreArgs,
    },
    /// Store only if the key is present.
    Replace {
        key: &'a [u8],
        value: Bytes,
        cas: Cas,
        args: StoreArgs,
    },
}

impl<'a> Command<'a> {
    /// Opcode put on the wire for this command.
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Get { .. } => Opcode::GetK,
            Command::Add { .. } => Opcode::Add,
            Command::Set { .. } => Opcode::Set,
            Command::Replace { .. } => Opcode::Replace,
        }
    }

    /// Caller-supplied key, before any transform.
    pub fn key(&self) -> &'a [u8] {
        match self {
            Command::Get { key }
            | Command::Add { key, .. }
            | Command::Set { key, .. }
            | Command::Replace { key, .. } => *key,
        }
    }

    fn into_request(self, key: KeyBuf, token: Token) -> Request {
        match self {
            Command::Get { .. } => Request::getk(key, token),
            Command::Add { value, .. } => Request::add(key, value, token),
            Command::Set {
                value, cas, args, ..
            } => Request::store(Opcode::Set, key, value, cas, args, token),
            Command::Replace {
                value, cas, args, ..
            } => Request::store(Opcode::Replace, key, value, cas, args, token),
        }
    }
}

/// Asynchronous cache client driven by the host application's event loop.
///
/// `U` is handed `&mut` to every completion; `C` is the per-request context.
pub struct Client<T: Transport, U = (), C = ()> {
    hosts: HostTable,
    sharding: Box<dyn ShardingStrategy>,
    key_transform: Option<Box<dyn KeyTransform>>,
    kind: ConnectionKind,
    request_timeout: Option<Duration>,
    pending: PendingIndex<U, C>,
    next_token: Token,
    transport: T,
    user: U,
    stats: StatsRecorder,
}

impl<T: Transport, U, C> Client<T, U, C> {
    /// Creates a client over `hosts`, which are sorted before use.
    ///
    /// No connection is opened until the first request for a host.
    ///
    /// # Errors
    /// `UnsupportedAddressFamily` for non-IP hosts, `AllocationFailure` if the
    /// host table cannot be allocated.
    pub fn new(
        hosts: impl IntoIterator<Item = HostAddress>,
        sharding: Box<dyn ShardingStrategy>,
        key_transform: Option<Box<dyn KeyTransform>>,
        kind: ConnectionKind,
        transport: T,
        user: U,
    ) -> ClientResult<Self> {
        let hosts = HostTable::new(hosts)?;
        debug!(hosts = hosts.len(), ?kind, "client created");
        Ok(Client {
            hosts,
            sharding,
            key_transform,
            kind,
            request_timeout: None,
            pending: PendingIndex::new(),
            next_token: Token::ZERO,
            transport,
            user,
            stats: StatsRecorder::default(),
        })
    }

    /// Sets the age after which `sweep_expired` faults a request.
    pub fn set_request_timeout(&mut self, timeout: Option<Duration>) {
        self.request_timeout = timeout;
    }

    /// Issues a command and registers `completion` for its reply.
    ///
    /// On error nothing stays registered and the token is not consumed.
    ///
    /// # Panics
    /// If the next token is still pending, meaning the whole token space is
    /// in flight. This is an internal consistency failure.
    pub fn issue(
        &mut self,
        command: Command<'_>,
        completion: Completion<U, C>,
        ctx: C,
    ) -> ClientResult<Token> {
        let opcode = command.opcode();
        match self.try_issue(command, completion, ctx) {
            Ok((token, host)) => {
                self.stats.record_issued();
                trace!(%token, host, %opcode, "request issued");
                Ok(token)
            }
            Err(err) => {
                self.stats.record_issue_failure();
                debug!(%opcode, error = %err, "issue failed");
                Err(err)
            }
        }
    }

    fn try_issue(
        &mut self,
        command: Command<'_>,
        completion: Completion<U, C>,
        ctx: C,
    ) -> ClientResult<(Token, usize)> {
        let opcode = command.opcode();
        if let Some(family) = completion.family() {
            if family != opcode.family() {
                return Err(ClientError::CompletionMismatch { opcode });
            }
        }

        let key = match &self.key_transform {
            Some(transform) => transform.transform(command.key()),
            None => copy_key(command.key()),
        }
        .map_err(ClientError::KeyTransformFailed)?;

        let host = self.select_host(key.as_bytes())?;

        if !self.pending.try_reserve_one() {
            return Err(ClientError::AllocationFailure);
        }
        let token = self.next_token;
        let record = PendingRequest {
            token,
            opcode,
            host,
            key: key.clone(),
            issued_at: Instant::now(),
            completion,
            ctx,
        };
        if let Err(violation) = self.pending.insert(record) {
            panic!("{violation}");
        }

        let (conn, addr) = match self.ensure_connected(host) {
            Ok(found) => found,
            Err(err) => {
                self.pending.remove(token);
                return Err(err);
            }
        };

        if let Err(source) = self.transport.send(conn, command.into_request(key, token)) {
            self.pending.remove(token);
            return Err(ClientError::SendFailed { addr, source });
        }

        self.next_token = token.next();
        Ok((token, host))
    }

    fn select_host(&self, key: &[u8]) -> ClientResult<usize> {
        let host_count = self.hosts.len();
        match self.sharding.select(key, host_count) {
            Ok(index) if index < host_count => Ok(index),
            Ok(_) | Err(ShardError::NoEligibleHost) => Err(ClientError::NoEligibleHost),
            Err(ShardError::NotImplemented(name)) => Err(ClientError::ShardingNotImplemented(name)),
        }
    }

    fn ensure_connected(&mut self, index: usize) -> ClientResult<(ConnectionId, SocketAddr)> {
        let host = self
            .hosts
            .get_mut(index)
            .ok_or(ClientError::NoEligibleHost)?;
        let addr = host.addr();
        if let Some(conn) = host.connection() {
            return Ok((conn, addr));
        }

        let conn = self
            .transport
            .connect(addr, self.kind)
            .map_err(|source| ClientError::ConnectFailed { addr, source })?;
        host.set_connection(conn);
        self.stats.record_connect();
        debug!(host = index, %addr, %conn, "connected");
        Ok((conn, addr))
    }

    /// Fetches `key`. The completion must be get-shaped or `Discard`.
    pub fn get(
        &mut self,
        key: &[u8],
        completion: Completion<U, C>,
        ctx: C,
    ) -> ClientResult<Token> {
        self.issue(Command::Get { key }, completion, ctx)
    }

    /// Stores `value` under `key` only if the key is absent.
    pub fn add(
        &mut self,
        key: &[u8],
        value: impl Into<Bytes>,
        completion: Completion<U, C>,
        ctx: C,
    ) -> ClientResult<Token> {
        let value = value.into();
        self.issue(Command::Add { key, value }, completion, ctx)
    }

    /// Stores `value` under `key`; a non-zero `cas` makes the store conditional.
    pub fn set(
        &mut self,
        key: &[u8],
        value: impl Into<Bytes>,
        cas: Cas,
        args: StoreArgs,
        completion: Completion<U, C>,
        ctx: C,
    ) -> ClientResult<Token> {
        let value = value.into();
        self.issue(
            Command::Set {
                key,
                value,
                cas,
                args,
            },
            completion,
            ctx,
        )
    }

    /// Stores `value` under `key` only if the key is present.
    pub fn replace(
        &mut self,
        key: &[u8],
        value: impl Into<Bytes>,
        cas: Cas,
        args: StoreArgs,
        completion: Completion<U, C>,
        ctx: C,
    ) -> ClientResult<Token> {
        let value = value.into();
        self.issue(
            Command::Replace {
                key,
                value,
                cas,
                args,
            },
            completion,
            ctx,
        )
    }

    /// Routes a response to its pending request and retires it.
    ///
    /// # Errors
    /// `UnknownToken` if nothing is pending under the echoed token and
    /// `OpcodeMismatch` if the echoed opcode differs from the one sent. The
    /// pending index is left untouched in both cases.
    pub fn on_response(&mut self, response: Response) -> Result<(), ProtocolViolation> {
        let token = response.opaque;
        let sent = match self.pending.get(token) {
            Some(request) => request.opcode,
            None => {
                warn!(%token, opcode = response.opcode, "response for unknown token");
                return Err(ProtocolViolation::UnknownToken(token));
            }
        };
        if sent.as_u8() != response.opcode {
            warn!(%token, sent = %sent, received = response.opcode, "opcode mismatch");
            return Err(ProtocolViolation::OpcodeMismatch {
                token,
                sent: sent.as_u8(),
                received: response.opcode,
            });
        }

        let PendingRequest {
            key,
            completion,
            ctx,
            host,
            ..
        } = self
            .pending
            .remove(token)
            .ok_or(ProtocolViolation::UnknownToken(token))?;

        self.stats.record_response(completion.is_discard());
        trace!(%token, host, status = %response.status, "response dispatched");

        let echoed = if response.key.is_empty() {
            key.into_bytes()
        } else {
            response.key
        };
        completion.complete(
            &mut self.user,
            Status::Server(response.status),
            echoed,
            response.value,
            response.cas,
            ctx,
        );
        Ok(())
    }

    /// Handles failure of `conn`: the host is marked disconnected and every
    /// request routed to it is faulted with `ConnectionLost`.
    ///
    /// Returns the number of faulted requests. The next request for the host
    /// reconnects.
    ///
    /// # Errors
    /// `UnknownConnection` if no host currently owns `conn`.
    pub fn on_connection_error(&mut self, conn: ConnectionId) -> Result<usize, ProtocolViolation> {
        let index = match self.hosts.position_of(conn) {
            Some(index) => index,
            None => {
                warn!(%conn, "error for unknown connection");
                return Err(ProtocolViolation::UnknownConnection(conn));
            }
        };
        if let Some(host) = self.hosts.get_mut(index) {
            host.take_connection();
        }
        self.transport.close(conn);

        let faulted = self.fault_where(Status::ConnectionLost, |request| request.host == index);
        warn!(%conn, host = index, faulted, "connection lost");
        Ok(faulted)
    }

    /// Faults every pending request with `Cancelled`. Connections stay open.
    pub fn prune_pending(&mut self) -> usize {
        let drained = self.pending.take_all();
        let faulted = self.retire_faulted(Status::Cancelled, drained);
        if faulted > 0 {
            debug!(faulted, "pending requests pruned");
        }
        faulted
    }

    /// Faults requests issued at least the request timeout before `now`.
    ///
    /// Returns 0 without doing anything when no timeout is configured.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let Some(timeout) = self.request_timeout else {
            return 0;
        };
        let faulted = self.fault_where(Status::TimedOut, |request| {
            now.saturating_duration_since(request.issued_at) >= timeout
        });
        if faulted > 0 {
            debug!(faulted, ?timeout, "expired requests swept");
        }
        faulted
    }

    /// Tears the client down: closes all connections and faults every pending
    /// request with `Shutdown`. Returns the final counters.
    pub fn shutdown(mut self) -> DispatchStats {
        self.teardown();
        self.stats()
    }

    fn teardown(&mut self) {
        let connections = self.hosts.take_connections();
        let closed = connections.len();
        for conn in connections {
            self.transport.close(conn);
        }
        let drained = self.pending.take_all();
        let faulted = self.retire_faulted(Status::Shutdown, drained);
        if closed > 0 || faulted > 0 {
            debug!(closed, faulted, "client torn down");
        }
    }

    fn fault_where<F>(&mut self, status: Status, pred: F) -> usize
    where
        F: FnMut(&PendingRequest<U, C>) -> bool,
    {
        let drained = self.pending.take_where(pred);
        self.retire_faulted(status, drained)
    }

    fn retire_faulted(&mut self, status: Status, drained: Vec<PendingRequest<U, C>>) -> usize {
        let count = drained.len();
        self.stats.record_faults(status, count);
        for request in drained {
            trace!(token = %request.token, %status, "faulting request");
            request
                .completion
                .fault(&mut self.user, status, request.key.into_bytes(), request.ctx);
        }
        count
    }

    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True if `token` is still awaiting retirement.
    #[inline]
    pub fn is_pending(&self, token: Token) -> bool {
        self.pending.contains(token)
    }

    #[inline]
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Hosts in sharding order.
    #[inline]
    pub fn hosts(&self) -> &[Host] {
        self.hosts.as_slice()
    }

    /// True if host `index` holds a live connection.
    pub fn is_connected(&self, index: usize) -> bool {
        self.hosts.get(index).is_some_and(Host::is_connected)
    }

    /// Token the next successful issue will use.
    #[inline]
    pub fn next_token(&self) -> Token {
        self.next_token
    }

    #[inline]
    pub fn connection_kind(&self) -> ConnectionKind {
        self.kind
    }

    #[inline]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[inline]
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    #[inline]
    pub fn user(&self) -> &U {
        &self.user
    }

    #[inline]
    pub fn user_mut(&mut self) -> &mut U {
        &mut self.user
    }

    /// Snapshot of the dispatch counters.
    pub fn stats(&self) -> DispatchStats {
        self.stats.snapshot(self.pending.len())
    }
}

impl<T: Transport, U, C> Drop for Client<T, U, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
