//! Incrementally maintained query results.
//!
//! Every registered query owns a slot holding its compiled predicate and its
//! current members. `by_kind` maps each kind to the queries that mention it,
//! so a component edge on one entity re-evaluates only that entity against
//! only those queries. Full scans happen once, when a query is registered.
//!
//! Identical compiled queries share one slot; the slot is released when its
//! last registrant unregisters.

use std::collections::{BTreeSet, HashMap};
use tracing::trace;

use crate::entity::EntityId;
use crate::kind::KindId;
use crate::query::CompiledQuery;
use crate::store::{EntityRecord, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub(crate) usize);

#[derive(Debug)]
struct QueryEntry {
    query: CompiledQuery,
    members: BTreeSet<EntityId>,
    refs: usize,
}

impl QueryEntry {
    fn reevaluate(&mut self, record: &EntityRecord, tick: u64) {
        if self.query.matches(record, tick) {
            self.members.insert(record.id);
        } else {
            self.members.remove(&record.id);
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct QueryIndex {
    slots: Vec<Option<QueryEntry>>,
    by_kind: HashMap<KindId, Vec<QueryId>>,
    /// Queries with no required kinds: a bare entity can match them.
    unconstrained: Vec<QueryId>,
    /// Queries whose members depend on the open tick.
    windowed: Vec<QueryId>,
}

impl QueryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a query, reusing an identical slot when one exists, and
    /// populate it from the current store contents.
    pub fn insert(&mut self, query: CompiledQuery, store: &Store) -> QueryId {
        if let Some(pos) = self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|e| e.query == query))
        {
            if let Some(entry) = self.slots[pos].as_mut() {
                entry.refs += 1;
            }
            return QueryId(pos);
        }

        let tick = store.tick();
        let members = store
            .iter()
            .filter(|r| query.matches(r, tick))
            .map(|r| r.id)
            .collect();

        let pos = match self.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        let id = QueryId(pos);
        for kind in query.kinds() {
            self.by_kind.entry(kind).or_default().push(id);
        }
        if query.required.is_empty() {
            self.unconstrained.push(id);
        }
        if query.has_modified_terms() {
            self.windowed.push(id);
        }
        self.slots[pos] = Some(QueryEntry {
            query,
            members,
            refs: 1,
        });
        id
    }

    /// Drop one reference to a slot. Returns true when the slot was released.
    pub fn release(&mut self, id: QueryId) -> bool {
        let Some(entry) = self.slots.get_mut(id.0).and_then(Option::as_mut) else {
            return false;
        };
        entry.refs -= 1;
        if entry.refs > 0 {
            return false;
        }
        if let Some(entry) = self.slots[id.0].take() {
            for kind in entry.query.kinds() {
                if let Some(list) = self.by_kind.get_mut(&kind) {
                    list.retain(|q| *q != id);
                    if list.is_empty() {
                        self.by_kind.remove(&kind);
                    }
                }
            }
        }
        self.unconstrained.retain(|q| *q != id);
        self.windowed.retain(|q| *q != id);
        true
    }

    pub fn members(&self, id: QueryId) -> Option<&BTreeSet<EntityId>> {
        self.slots.get(id.0)?.as_ref().map(|e| &e.members)
    }

    /// Number of live slots.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// A component of `kind` was added, removed or marked modified.
    pub fn on_component_edge(&mut self, record: &EntityRecord, kind: KindId, tick: u64) {
        let Some(ids) = self.by_kind.get(&kind) else {
            return;
        };
        for id in ids {
            if let Some(entry) = self.slots[id.0].as_mut() {
                entry.reevaluate(record, tick);
            }
        }
        trace!(entity = %record.id, ?kind, queries = ids.len(), "component edge");
    }

    /// A new entity without components.
    pub fn on_created(&mut self, record: &EntityRecord, tick: u64) {
        for id in &self.unconstrained {
            if let Some(entry) = self.slots[id.0].as_mut() {
                entry.reevaluate(record, tick);
            }
        }
    }

    /// The entity was activated or deactivated.
    pub fn on_activation(&mut self, record: &EntityRecord, tick: u64) {
        for entry in self.slots.iter_mut().flatten() {
            entry.reevaluate(record, tick);
        }
        trace!(entity = %record.id, active = record.active, "activation edge");
    }

    pub fn on_destroyed(&mut self, id: EntityId) {
        for entry in self.slots.iter_mut().flatten() {
            entry.members.remove(&id);
        }
    }

    /// Close the tick window: no stamp matches the next tick yet.
    pub fn end_tick(&mut self) {
        for id in &self.windowed {
            if let Some(entry) = self.slots[id.0].as_mut() {
                entry.members.clear();
            }
        }
    }

    /// Forget every member, keeping the registered queries.
    pub fn clear_members(&mut self) {
        for entry in self.slots.iter_mut().flatten() {
            entry.members.clear();
        }
    }
}
