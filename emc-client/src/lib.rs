//! # emc Async Client
//!
//! Purpose: Shard memcached binary-protocol requests across a pool of servers
//! and match their out-of-order responses back to the caller that issued them,
//! on top of a transport and event loop supplied by the host application.
//!
//! ## Design Principles
//! 1. **Single Control Thread**: Every entry point takes `&mut self`; the event
//!    loop drives `issue`, `on_response` and `on_connection_error` in turn.
//! 2. **Pluggable Strategies**: Sharding and key rewriting are traits with
//!    built-ins and closure support.
//! 3. **Exactly-Once Completions**: Each issued request is retired once, by its
//!    response or by a fault status.
//! 4. **Transport Agnostic**: Sockets, framing and readiness live behind the
//!    `Transport` trait.

mod client;
mod completion;
mod config;
mod hash;
mod host;
mod key;
mod pending;
pub mod reply;
mod stats;
mod transport;

pub use client::{Client, ClientError, ClientResult, Command};
pub use completion::{Completion, GetCallback, GetReply, Status, StoreCallback, StoreReply};
pub use config::{ClientBuilder, ClientConfig};
pub use hash::{Crc32Modulo, Fixed, HashKind, Ketama, ShardError, ShardResult, ShardingStrategy};
pub use host::{host_order, Host, HostAddress, HostTable};
pub use key::{
    Identity, KeyError, KeyTransform, KeyTransformKind, Md5Hex, Truncate, DIGEST_HEX_LEN,
};
pub use stats::DispatchStats;
pub use transport::Transport;

pub use emc_common::{
    Cas, CommandFamily, ConnectionId, ConnectionKind, KeyBuf, Opcode, ProtocolViolation, Request,
    Response, ResponseStatus, StoreArgs, Token, TransportError, MAX_KEY_LEN,
};
