//! Entity records in a generational arena.
//!
//! ## Memory layout
//!
//! ```text
//! slots: [ {gen 0, Some(rec)}, {gen 1, None}, {gen 0, Some(rec)} ]
//! free:  [1]             <- slots available for reuse
//! ```
//!
//! Allocation pops `free` when possible, otherwise grows `slots`. Removal
//! bumps the slot's generation so outstanding handles go stale.
//!
//! The store itself knows nothing about queries; [`Entities`](crate::Entities)
//! pairs every mutation here with the matching index update.

use std::collections::{BTreeMap, HashMap};

use crate::component::Component;
use crate::entity::EntityId;
use crate::kind::KindId;

/// Everything one entity owns.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub(crate) id: EntityId,
    pub(crate) name: Option<String>,
    pub(crate) active: bool,
    pub(crate) parent: Option<EntityId>,
    pub(crate) children: Vec<EntityId>,
    pub(crate) components: BTreeMap<KindId, Component>,
    /// Tick in which each kind was last added or marked modified.
    pub(crate) modified: HashMap<KindId, u64>,
}

impl EntityRecord {
    fn new(id: EntityId, name: Option<String>, active: bool) -> Self {
        Self {
            id,
            name,
            active,
            parent: None,
            children: Vec::new(),
            components: BTreeMap::new(),
            modified: HashMap::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn has(&self, kind: KindId) -> bool {
        self.components.contains_key(&kind)
    }

    pub fn component(&self, kind: KindId) -> Option<&Component> {
        self.components.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = KindId> + '_ {
        self.components.keys().copied()
    }

    /// Whether `kind` was added or modified during `tick`.
    pub fn modified_in(&self, kind: KindId, tick: u64) -> bool {
        self.modified.get(&kind) == Some(&tick)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    record: Option<EntityRecord>,
}

#[derive(Debug)]
pub(crate) struct Store {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    /// The open tick window. Starts at 1 so a zero stamp never matches.
    tick: u64,
}

impl Store {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            tick: 1,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    pub fn alloc(&mut self, name: Option<String>, active: bool) -> EntityId {
        let id = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let id = EntityId {
                index,
                generation: slot.generation,
            };
            slot.record = Some(EntityRecord::new(id, name, active));
            id
        } else {
            let index = self.slots.len() as u32;
            let id = EntityId {
                index,
                generation: 0,
            };
            self.slots.push(Slot {
                generation: 0,
                record: Some(EntityRecord::new(id, name, active)),
            });
            id
        };
        self.live += 1;
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.record.as_ref())
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.record.as_mut())
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// Take the record out and retire the id.
    pub fn remove(&mut self, id: EntityId) -> Option<EntityRecord> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(record)
    }

    /// Retire every live id.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.record.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.live = 0;
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.slots.iter().filter_map(|s| s.record.as_ref())
    }

    /// Whether `ancestor` appears on the parent chain of `id` (or is `id`).
    pub fn is_ancestor_or_self(&self, ancestor: EntityId, id: EntityId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.get(current).and_then(|r| r.parent);
        }
        false
    }

    /// Pre-order descendants of `id`, not including `id`.
    pub fn descendants(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack: Vec<EntityId> = match self.get(id) {
            Some(r) => r.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(r) = self.get(next) {
                stack.extend(r.children.iter().rev().copied());
            }
        }
        out
    }
}
