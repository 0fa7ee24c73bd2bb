//! Enabling and disabling entities.
//!
//! ```text
//! Created ─> Active ⇄ Inactive
//!              │         │
//!              └────┬────┘
//!                   v
//!               Destroyed   (terminal)
//! ```
//!
//! An inactive entity keeps its components and stays reachable by id, but
//! matches no query. Reactivating re-evaluates it against every query from
//! its current state.

use tracing::trace;

use crate::entities::Entities;
use crate::entity::EntityId;
use crate::error::EcsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Active,
    Inactive,
    /// Destroyed, or never issued by this world.
    Destroyed,
}

impl Entities {
    pub fn state(&self, id: EntityId) -> EntityState {
        match self.store.get(id) {
            Some(r) if r.active => EntityState::Active,
            Some(_) => EntityState::Inactive,
            None => EntityState::Destroyed,
        }
    }

    pub fn is_active(&self, id: EntityId) -> bool {
        self.state(id) == EntityState::Active
    }

    /// Setting the current state again is a no-op.
    pub fn set_active(&mut self, id: EntityId, active: bool) -> Result<(), EcsError> {
        let record = self.record_mut(id)?;
        if record.active == active {
            return Ok(());
        }
        record.active = active;

        let tick = self.store.tick();
        if let Some(record) = self.store.get(id) {
            self.index.on_activation(record, tick);
        }
        trace!(entity = %id, active, "activation changed");
        Ok(())
    }

    pub fn activate(&mut self, id: EntityId) -> Result<(), EcsError> {
        self.set_active(id, true)
    }

    pub fn deactivate(&mut self, id: EntityId) -> Result<(), EcsError> {
        self.set_active(id, false)
    }
}
