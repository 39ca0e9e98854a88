//! A generic acquire/return/detach object pool.
//!
//! Items are created on demand by a [`Manager`] and handed out wrapped in
//! a [`Lease`]. Dropping the lease returns the item; a lease marked broken
//! detaches its item instead. Once the pool is released, every returning
//! item is destroyed rather than kept.
//!
//! The counters in [`PoolState`] are updated under the same lock as the
//! idle list, so every snapshot satisfies
//! `constructed == available + occupied + detached`.
use std::{
    fmt,
    ops::Add,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Creates, validates and destroys pooled items.
#[async_trait]
pub trait Manager: Send + Sync + 'static {
    type Item: Send + 'static;

    async fn create(&self) -> Result<Self::Item>;

    /// Checked before an idle item is handed out again.
    fn is_alive(&self, item: &Self::Item) -> bool;

    /// Really dispose of an item.
    fn destroy(&self, item: Self::Item) {
        drop(item)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    pub constructed: usize,
    pub available: usize,
    pub occupied: usize,
    pub detached: usize,
}

impl PoolState {
    pub fn is_consistent(&self) -> bool {
        self.constructed == self.available + self.occupied + self.detached
    }
}

impl Add for PoolState {
    type Output = PoolState;

    fn add(self, other: PoolState) -> PoolState {
        PoolState {
            constructed: self.constructed + other.constructed,
            available: self.available + other.available,
            occupied: self.occupied + other.occupied,
            detached: self.detached + other.detached,
        }
    }
}

struct Slots<T> {
    idle: Vec<T>,
    state: PoolState,
    released: bool,
}

pub struct ObjectPool<M: Manager> {
    manager: M,
    slots: Mutex<Slots<M::Item>>,
}

impl<M: Manager> fmt::Debug for ObjectPool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("state", &self.state())
            .finish()
    }
}

impl<M: Manager> ObjectPool<M> {
    pub fn new(manager: M) -> Arc<Self> {
        Arc::new(Self {
            manager,
            slots: Mutex::new(Slots {
                idle: vec![],
                state: PoolState::default(),
                released: false,
            }),
        })
    }

    // nothing panics while holding the lock, but a poisoned guard still
    // holds consistent counters
    fn lock(&self) -> MutexGuard<'_, Slots<M::Item>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn state(&self) -> PoolState {
        self.lock().state
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Hand out an idle item that passes the liveness check, or build a
    /// new one. Dead idle items are detached along the way.
    pub async fn acquire(self: &Arc<Self>) -> Result<Lease<M>> {
        loop {
            let candidate = {
                let mut slots = self.lock();
                if slots.released {
                    return Err(Error::PoolReleased);
                }
                let item = slots.idle.pop();
                if item.is_some() {
                    slots.state.available -= 1;
                    slots.state.occupied += 1;
                }
                item
            };

            match candidate {
                Some(item) if self.manager.is_alive(&item) => {
                    return Ok(Lease::new(self.clone(), item));
                }
                Some(item) => {
                    tracing::debug!("Detaching dead pooled item");
                    self.detach(item);
                }
                None => break,
            }
        }

        let item = self.manager.create().await?;
        let mut slots = self.lock();
        slots.state.constructed += 1;
        if slots.released {
            slots.state.detached += 1;
            drop(slots);
            self.manager.destroy(item);
            return Err(Error::PoolReleased);
        }
        slots.state.occupied += 1;
        drop(slots);
        Ok(Lease::new(self.clone(), item))
    }

    fn give_back(&self, item: M::Item) {
        let mut slots = self.lock();
        slots.state.occupied -= 1;
        if slots.released {
            slots.state.detached += 1;
            drop(slots);
            self.manager.destroy(item);
        } else {
            slots.state.available += 1;
            slots.idle.push(item);
        }
    }

    fn detach(&self, item: M::Item) {
        {
            let mut slots = self.lock();
            slots.state.occupied -= 1;
            slots.state.detached += 1;
        }
        self.manager.destroy(item);
    }

    /// Tear the pool down: idle items are destroyed now, leased items are
    /// destroyed when their lease ends.
    pub fn release(&self) {
        let idle = {
            let mut slots = self.lock();
            slots.released = true;
            let idle = std::mem::take(&mut slots.idle);
            slots.state.available -= idle.len();
            slots.state.detached += idle.len();
            idle
        };
        tracing::debug!("Releasing pool with {} idle items", idle.len());
        for item in idle {
            self.manager.destroy(item);
        }
    }
}

/// A borrowed pool item. Dropping it is the ordinary way to give the item
/// back; only a broken lease or a released pool destroys the item.
pub struct Lease<M: Manager> {
    pool: Arc<ObjectPool<M>>,
    item: Option<M::Item>,
    broken: bool,
}

impl<M: Manager> Lease<M> {
    fn new(pool: Arc<ObjectPool<M>>, item: M::Item) -> Self {
        Self {
            pool,
            item: Some(item),
            broken: false,
        }
    }

    pub fn get(&self) -> Result<&M::Item> {
        self.item.as_ref().ok_or(Error::PoolReleased)
    }

    pub fn get_mut(&mut self) -> Result<&mut M::Item> {
        self.item.as_mut().ok_or(Error::PoolReleased)
    }

    /// Detach instead of returning when the lease ends.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// End the lease now, discarding the item.
    pub fn detach(mut self) {
        self.broken = true;
    }
}

impl<M: Manager> fmt::Debug for Lease<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("broken", &self.broken)
            .finish()
    }
}

impl<M: Manager> Drop for Lease<M> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            if self.broken {
                self.pool.detach(item);
            } else {
                self.pool.give_back(item);
            }
        }
    }
}
