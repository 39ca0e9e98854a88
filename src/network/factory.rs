//! Per broker address connection pools.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;

use super::{
    pool::{Lease, Manager, ObjectPool, PoolState},
    BrokerAddress, BrokerConnection, TcpConnection,
};
use crate::error::{Error, Result};

/// Opens TCP connections to one broker and checks them before reuse.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    address: BrokerAddress,
}

impl ConnectionManager {
    pub fn new(address: BrokerAddress) -> Self {
        Self { address }
    }

    pub fn address(&self) -> &BrokerAddress {
        &self.address
    }
}

#[async_trait]
impl Manager for ConnectionManager {
    type Item = TcpConnection;

    async fn create(&self) -> Result<TcpConnection> {
        TcpConnection::connect(&self.address).await
    }

    fn is_alive(&self, conn: &TcpConnection) -> bool {
        conn.is_alive()
    }

    fn destroy(&self, conn: TcpConnection) {
        tracing::debug!("Closing connection to {}", self.address);
        drop(conn)
    }
}

pub type ConnectionLease = Lease<ConnectionManager>;

#[derive(Default)]
struct Registry {
    pools: HashMap<String, Arc<ObjectPool<ConnectionManager>>>,
    released: bool,
}

/// Registry of connection pools keyed by `host:port`. Pools are created
/// the first time an address is asked for.
#[derive(Default)]
pub struct ConnectionFactory {
    registry: Mutex<Registry>,
}

impl std::fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("state", &self.state())
            .finish()
    }
}

impl ConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool_for(&self, address: &BrokerAddress) -> Result<Arc<ObjectPool<ConnectionManager>>> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if registry.released {
            return Err(Error::PoolReleased);
        }
        let pool = registry
            .pools
            .entry(address.to_string())
            .or_insert_with(|| {
                tracing::debug!("Creating connection pool for {}", address);
                ObjectPool::new(ConnectionManager::new(address.clone()))
            });
        Ok(pool.clone())
    }

    /// Lease a live connection to `address`.
    pub async fn acquire(&self, address: &BrokerAddress) -> Result<ConnectionLease> {
        self.pool_for(address)?.acquire().await
    }

    /// Counters summed over every address.
    pub fn state(&self) -> PoolState {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry
            .pools
            .values()
            .map(|pool| pool.state())
            .fold(PoolState::default(), |acc, state| acc + state)
    }

    pub fn state_for(&self, address: &BrokerAddress) -> Option<PoolState> {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.pools.get(&address.to_string()).map(|pool| pool.state())
    }

    /// Close every idle connection and make in-flight ones close when
    /// their lease ends. Later acquisitions fail with `PoolReleased`.
    pub fn release_all(&self) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.released = true;
        for pool in registry.pools.values() {
            pool.release();
        }
    }
}
