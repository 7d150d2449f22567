//! # Completions
//!
//! Purpose: Carry the caller's callback from issue time to the one moment the
//! request is retired, with the reply shape that matches the command family.
//!
//! ## Design Principles
//! 1. **Closed Sum Type**: Two callback shapes (get, store) plus an explicit
//!    "discard" variant replace function pointers and a dummy union slot.
//! 2. **Single Shot**: Callbacks are `FnOnce`; retiring a request consumes its
//!    completion, so it cannot fire twice.
//! 3. **Faults Share the Channel**: Connection loss, shutdown, timeout and prune
//!    reach the same callback with a `Status` that is not a server status.

use std::fmt;

use bytes::Bytes;

use emc_common::{Cas, CommandFamily, ResponseStatus};

/// Outcome delivered to a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Status reported by the server.
    Server(ResponseStatus),
    /// The connection carrying the request failed.
    ConnectionLost,
    /// The client was torn down before a reply arrived.
    Shutdown,
    /// No reply arrived within the configured request timeout.
    TimedOut,
    /// The request was pruned by the application.
    Cancelled,
}

impl Status {
    /// True only for a server-reported success.
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Server(status) if status.is_ok())
    }

    /// True for locally generated faults.
    pub fn is_fault(&self) -> bool {
        !matches!(self, Status::Server(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Server(status) => write!(f, "{status}"),
            Status::ConnectionLost => write!(f, "connection lost"),
            Status::Shutdown => write!(f, "client shut down"),
            Status::TimedOut => write!(f, "timed out"),
            Status::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Reply delivered to a get-family completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetReply {
    pub status: Status,
    /// Echoed key; on faults, the key that was sent.
    pub key: Bytes,
    pub value: Bytes,
    pub cas: Cas,
}

/// Reply delivered to a store-family completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreReply {
    pub status: Status,
    pub cas: Cas,
}

pub type GetCallback<U, C> = Box<dyn FnOnce(&mut U, GetReply, C)>;
pub type StoreCallback<U, C> = Box<dyn FnOnce(&mut U, StoreReply, C)>;

/// Callback slot of a pending request.
///
/// `U` is the client-wide user context, `C` the per-request context.
pub enum Completion<U, C> {
    Get(GetCallback<U, C>),
    Store(StoreCallback<U, C>),
    /// The caller does not want to be notified.
    Discard,
}

impl<U, C> Completion<U, C> {
    pub fn get<F>(callback: F) -> Self
    where
        F: FnOnce(&mut U, GetReply, C) + 'static,
    {
        Completion::Get(Box::new(callback))
    }

    pub fn store<F>(callback: F) -> Self
    where
        F: FnOnce(&mut U, StoreReply, C) + 'static,
    {
        Completion::Store(Box::new(callback))
    }

    /// Family this completion can serve; `None` for `Discard`.
    pub fn family(&self) -> Option<CommandFamily> {
        match self {
            Completion::Get(_) => Some(CommandFamily::Get),
            Completion::Store(_) => Some(CommandFamily::Store),
            Completion::Discard => None,
        }
    }

    pub fn is_discard(&self) -> bool {
        matches!(self, Completion::Discard)
    }

    /// Delivers a reply built from server fields.
    pub(crate) fn complete(
        self,
        user: &mut U,
        status: Status,
        key: Bytes,
        value: Bytes,
        cas: Cas,
        ctx: C,
    ) {
        match self {
            Completion::Get(callback) => callback(
                user,
                GetReply {
                    status,
                    key,
                    value,
                    cas,
                },
                ctx,
            ),
            Completion::Store(callback) => callback(user, StoreReply { status, cas }, ctx),
            Completion::Discard => {}
        }
    }

    /// Delivers a local fault.
    pub(crate) fn fault(self, user: &mut U, status: Status, key: Bytes, ctx: C) {
        debug_assert!(status.is_fault());
        self.complete(user, status, key, Bytes::new(), Cas::NONE, ctx);
    }
}

impl<U, C> fmt::Debug for Completion<U, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Get(_) => write!(f, "Completion::Get"),
            Completion::Store(_) => write!(f, "Completion::Store"),
            Completion::Discard => write!(f, "Completion::Discard"),
        }
    }
}
