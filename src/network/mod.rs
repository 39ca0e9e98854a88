//! Connection & communication with a broker.
//!
//! # Network Module
//!
//! Kafka uses a binary protocol over TCP. The protocol defines all APIs as
//! request response message pairs. All messages are size delimited.
//!
//! The server guarantees that on a single TCP connection, requests will
//! be processed in the order they are sent and responses will return in
//! that order as well. This client keeps one request in flight per
//! socket: a connection is leased from the [`pool`] for exactly one round
//! trip and handed back afterwards, so concurrent callers simply lease
//! different sockets to the same broker.
//!
//! Sockets are reused per broker address through the
//! [`ConnectionFactory`]. A [`pool::Lease`] looks like an owned
//! connection to the caller; dropping it returns the socket to its pool
//! instead of closing it. Only [`ConnectionFactory::release_all`] closes
//! sockets for real.
use std::{fmt, str::FromStr};

use async_trait::async_trait;
use bytes::BytesMut;

use crate::{
    encode::ToByte,
    error::{Error, Result},
};

pub mod factory;
pub mod pool;
pub mod tcp;

pub use factory::{ConnectionFactory, ConnectionManager};
pub use tcp::TcpConnection;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_owned(),
            port,
        }
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parse `host:port`.
impl FromStr for BrokerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| {
            tracing::error!("ERROR: broker address {} is missing a port", s);
            Error::MissingBrokerConfigOptions
        })?;
        let port = port.parse::<u16>().map_err(|_| {
            tracing::error!("ERROR: broker address {} has an invalid port", s);
            Error::MissingBrokerConfigOptions
        })?;
        if host.is_empty() {
            return Err(Error::MissingBrokerConfigOptions);
        }
        Ok(Self::new(host, port))
    }
}

/// A socket that carries size delimited frames.
#[async_trait]
pub trait BrokerConnection {
    async fn send_request<R: ToByte + Sync + Send>(&mut self, req: &R) -> Result<()>;
    async fn receive_response(&mut self) -> Result<BytesMut>;
    async fn connect(addr: &BrokerAddress) -> Result<Self>
    where
        Self: Sized;
    /// Non-blocking check: `false` once the peer hung up.
    fn is_alive(&self) -> bool;
}
