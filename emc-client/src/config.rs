//! # Client Configuration
//!
//! Purpose: Build a `Client` either from a declarative `ClientConfig` (hosts as
//! strings, built-in strategies by name) or programmatically through
//! `ClientBuilder` (custom strategies and closures).
//!
//! ## Design Principles
//! 1. **Builder Pattern**: Optional pieces have defaults; the sharding strategy
//!    does not, and `build` refuses to guess one.
//! 2. **Fail at Init**: Bad host strings, unsupported families and bad timeouts
//!    are rejected before any request can be issued.

use std::time::Duration;

use serde::Deserialize;

use emc_common::ConnectionKind;

use crate::client::{Client, ClientError, ClientResult};
use crate::hash::{HashKind, ShardingStrategy};
use crate::host::HostAddress;
use crate::key::{KeyTransform, KeyTransformKind};
use crate::transport::Transport;

/// Declarative client settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Host strings: `ip:port`, `[ipv6]:port`.
    pub hosts: Vec<String>,
    /// Built-in sharding strategy.
    pub hash: HashKind,
    /// Built-in key transform; `None` sends keys unchanged.
    pub key_transform: Option<KeyTransformKind>,
    /// Connection flavour shared by all hosts.
    pub connection: ConnectionKind,
    /// Age in milliseconds after which `sweep_expired` faults a request.
    pub request_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            hosts: Vec::new(),
            hash: HashKind::Crc32,
            key_transform: None,
            connection: ConnectionKind::Tcp,
            request_timeout_ms: None,
        }
    }
}

impl ClientConfig {
    /// Parses every host string.
    pub fn host_addresses(&self) -> ClientResult<Vec<HostAddress>> {
        self.hosts.iter().map(|raw| raw.parse()).collect()
    }

    /// Converts `request_timeout_ms`, rejecting a zero timeout.
    pub fn request_timeout(&self) -> ClientResult<Option<Duration>> {
        match self.request_timeout_ms {
            Some(0) => Err(ClientError::Config(
                "request_timeout_ms must be greater than zero".to_string(),
            )),
            Some(ms) => Ok(Some(Duration::from_millis(ms))),
            None => Ok(None),
        }
    }
}

impl<T: Transport, U, C> Client<T, U, C> {
    /// Builds a client from declarative settings.
    pub fn from_config(config: &ClientConfig, transport: T, user: U) -> ClientResult<Self> {
        let hosts = config.host_addresses()?;
        let timeout = config.request_timeout()?;
        let mut client = Client::new(
            hosts,
            config.hash.strategy(),
            config.key_transform.map(KeyTransformKind::transform),
            config.connection,
            transport,
            user,
        )?;
        client.set_request_timeout(timeout);
        Ok(client)
    }
}

/// Programmatic client construction.
#[derive(Default)]
pub struct ClientBuilder {
    hosts: Vec<HostAddress>,
    sharding: Option<Box<dyn ShardingStrategy>>,
    key_transform: Option<Box<dyn KeyTransform>>,
    kind: ConnectionKind,
    request_timeout: Option<Duration>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, addr: impl Into<HostAddress>) -> Self {
        self.hosts.push(addr.into());
        self
    }

    pub fn hosts(mut self, addrs: impl IntoIterator<Item = HostAddress>) -> Self {
        self.hosts.extend(addrs);
        self
    }

    /// Required.
    pub fn sharding(mut self, strategy: impl ShardingStrategy + 'static) -> Self {
        self.sharding = Some(Box::new(strategy));
        self
    }

    pub fn hash_kind(mut self, kind: HashKind) -> Self {
        self.sharding = Some(kind.strategy());
        self
    }

    pub fn key_transform(mut self, transform: impl KeyTransform + 'static) -> Self {
        self.key_transform = Some(Box::new(transform));
        self
    }

    pub fn connection_kind(mut self, kind: ConnectionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Finishes the client.
    ///
    /// # Errors
    /// `MissingShardingStrategy` if no strategy was set, plus the errors of
    /// `Client::new`.
    pub fn build<T: Transport, U, C>(
        self,
        transport: T,
        user: U,
    ) -> ClientResult<Client<T, U, C>> {
        let sharding = self.sharding.ok_or(ClientError::MissingShardingStrategy)?;
        let mut client = Client::new(
            self.hosts,
            sharding,
            self.key_transform,
            self.kind,
            transport,
            user,
        )?;
        client.set_request_timeout(self.request_timeout);
        Ok(client)
    }
}
