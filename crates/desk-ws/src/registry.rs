//! Named connection manager slots.
//!
//! Connection managers are only ever obtained through a [`LinkRegistry`].
//! Creating a slot that already exists returns the existing manager, and
//! replacing or removing a slot disconnects the previous manager first, so a
//! reload can never leave two live links (and two reconnect timers) behind.

use crate::connection::ConnectionManager;
use crate::socket::Connector;
use desk_core::Scheduler;
use std::collections::HashMap;
use tracing::info;

/// Slot name of the engine event stream.
pub const ENGINE_LINK: &str = "engine";

/// Registry of connection managers keyed by name.
pub struct LinkRegistry<C: Connector> {
    slots: HashMap<String, ConnectionManager<C>>,
}

impl<C: Connector> Default for LinkRegistry<C> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<C: Connector> LinkRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the manager in `key`, creating it with `make` when empty.
    pub fn get_or_create<F>(&mut self, key: &str, make: F) -> &mut ConnectionManager<C>
    where
        F: FnOnce() -> ConnectionManager<C>,
    {
        self.slots.entry(key.to_string()).or_insert_with(|| {
            info!(slot = key, "Creating link manager");
            make()
        })
    }

    pub fn get(&self, key: &str) -> Option<&ConnectionManager<C>> {
        self.slots.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ConnectionManager<C>> {
        self.slots.get_mut(key)
    }

    /// Disconnect and drop the manager in `key`. Returns whether one existed.
    pub fn teardown(&mut self, key: &str, sched: &mut dyn Scheduler) -> bool {
        match self.slots.remove(key) {
            Some(mut previous) => {
                previous.disconnect(sched);
                info!(slot = key, "Link manager torn down");
                true
            }
            None => false,
        }
    }

    /// Install `manager` in `key`, tearing down any previous occupant first.
    pub fn replace(
        &mut self,
        key: &str,
        sched: &mut dyn Scheduler,
        manager: ConnectionManager<C>,
    ) -> &mut ConnectionManager<C> {
        self.teardown(key, sched);
        self.get_or_create(key, || manager)
    }

    /// Tear down every slot.
    pub fn teardown_all(&mut self, sched: &mut dyn Scheduler) {
        let keys: Vec<String> = self.slots.keys().cloned().collect();
        for key in keys {
            self.teardown(&key, sched);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
