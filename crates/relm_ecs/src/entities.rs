//! The entity store facade.
//!
//! [`Entities`] owns the kind registry, the entity records and the query
//! index. Every mutating operation updates the record and then notifies the
//! index before returning, so any query read afterwards is already current.
//!
//! Modifications are stamped with the open tick. The tick advances only at
//! the end of [`World::update`](crate::World::update); changes made between
//! updates therefore belong to the next update's window.

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, trace};

use crate::component::{Component, TypedComponent};
use crate::entity::EntityId;
use crate::error::EcsError;
use crate::index::{QueryId, QueryIndex};
use crate::kind::{KindId, Registry};
use crate::query::QuerySpec;
use crate::store::{EntityRecord, Store};

/// What happens to the children of a destroyed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestroyPolicy {
    /// Children survive as roots.
    #[default]
    Orphan,
    /// Children and all their descendants are destroyed too.
    Cascade,
}

#[derive(Debug)]
pub struct Entities {
    pub(crate) registry: Registry,
    pub(crate) store: Store,
    pub(crate) index: QueryIndex,
}

impl Default for Entities {
    fn default() -> Self {
        Self::new()
    }
}

impl Entities {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            store: Store::new(),
            index: QueryIndex::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn kind_of(&self, name: &str) -> Result<KindId, EcsError> {
        self.registry.kind_of(name)
    }

    /// The open modification window.
    pub fn tick(&self) -> u64 {
        self.store.tick()
    }

    // -- Entity lifecycle --

    /// A fresh, active entity with no components.
    pub fn create(&mut self) -> EntityId {
        self.create_inner(None, true)
    }

    pub fn create_named(&mut self, name: impl Into<String>) -> EntityId {
        self.create_inner(Some(name.into()), true)
    }

    /// Start building an inactive entity. It joins query results once the
    /// builder calls [`EntityBuilder::activate`].
    pub fn spawn(&mut self) -> EntityBuilder<'_> {
        let id = self.create_inner(None, false);
        EntityBuilder { entities: self, id }
    }

    fn create_inner(&mut self, name: Option<String>, active: bool) -> EntityId {
        let id = self.store.alloc(name, active);
        let tick = self.store.tick();
        if let Some(record) = self.store.get(id) {
            self.index.on_created(record, tick);
        }
        trace!(entity = %id, active, "created entity");
        id
    }

    /// Destroy `id`. Returns every destroyed id: just `id` for
    /// [`DestroyPolicy::Orphan`], `id` plus its pre-order descendants for
    /// [`DestroyPolicy::Cascade`].
    pub fn destroy(&mut self, id: EntityId, policy: DestroyPolicy) -> Result<Vec<EntityId>, EcsError> {
        let record = self.record(id)?;
        let parent = record.parent;
        let children = record.children.clone();

        if let Some(parent) = parent.and_then(|p| self.store.get_mut(p)) {
            parent.children.retain(|c| *c != id);
        }

        let mut doomed = vec![id];
        match policy {
            DestroyPolicy::Orphan => {
                for child in children {
                    if let Some(c) = self.store.get_mut(child) {
                        c.parent = None;
                    }
                }
            }
            DestroyPolicy::Cascade => doomed.extend(self.store.descendants(id)),
        }

        for victim in &doomed {
            self.index.on_destroyed(*victim);
            self.store.remove(*victim);
        }
        debug!(entity = %id, ?policy, destroyed = doomed.len(), "destroyed entity");
        Ok(doomed)
    }

    /// Whether `id` refers to a live entity.
    pub fn contains(&self, id: EntityId) -> bool {
        self.store.contains(id)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }

    /// Destroy every entity and empty every query result. Registered kinds
    /// and queries stay.
    pub fn clear(&mut self) {
        self.store.clear();
        self.index.clear_members();
    }

    // -- Components --

    /// Attach a component built from the kind's defaults overlaid with
    /// `fields` (an object, or null for all defaults).
    pub fn add_component(
        &mut self,
        id: EntityId,
        kind: KindId,
        fields: Value,
    ) -> Result<&Component, EcsError> {
        let kind_def = self.registry.kind(kind)?.clone();
        let record = self.record(id)?;
        if record.has(kind) {
            return Err(EcsError::DuplicateComponent {
                entity: id,
                kind: kind_def.name().to_string(),
            });
        }
        let values = kind_def.instantiate(fields)?;

        let tick = self.store.tick();
        let record = self.record_mut(id)?;
        record.components.insert(kind, Component::new(kind_def, values));
        record.modified.insert(kind, tick);
        self.notify(id, kind);

        self.record(id)?
            .component(kind)
            .ok_or_else(|| self.missing(id, kind))
    }

    /// Attach a component by kind name.
    pub fn add(&mut self, id: EntityId, kind: &str, fields: Value) -> Result<&Component, EcsError> {
        let kind = self.registry.kind_of(kind)?;
        self.add_component(id, kind, fields)
    }

    pub fn remove_component(&mut self, id: EntityId, kind: KindId) -> Result<Component, EcsError> {
        self.maybe_remove(id, kind)?
            .ok_or_else(|| self.missing(id, kind))
    }

    /// Remove the component if present. Only a dead entity is an error.
    pub fn maybe_remove(&mut self, id: EntityId, kind: KindId) -> Result<Option<Component>, EcsError> {
        let record = self.record_mut(id)?;
        let Some(component) = record.components.remove(&kind) else {
            return Ok(None);
        };
        record.modified.remove(&kind);
        self.notify(id, kind);
        Ok(Some(component))
    }

    pub fn get_component(&self, id: EntityId, kind: KindId) -> Option<&Component> {
        self.store.get(id)?.component(kind)
    }

    pub fn has_component(&self, id: EntityId, kind: KindId) -> bool {
        self.store.get(id).is_some_and(|r| r.has(kind))
    }

    /// Stamp `kind` on `id` as modified in the open tick. A second call in
    /// the same tick is a no-op.
    pub fn mark_modified(&mut self, id: EntityId, kind: KindId) -> Result<(), EcsError> {
        let tick = self.store.tick();
        let record = self.record_mut(id)?;
        if !record.has(kind) {
            return Err(self.missing(id, kind));
        }
        if record.modified.insert(kind, tick) == Some(tick) {
            return Ok(());
        }
        self.notify(id, kind);
        Ok(())
    }

    /// Mutate a component in place and mark it modified.
    pub fn modify<R>(
        &mut self,
        id: EntityId,
        kind: KindId,
        f: impl FnOnce(&mut Component) -> R,
    ) -> Result<R, EcsError> {
        let record = self.record_mut(id)?;
        let Some(component) = record.components.get_mut(&kind) else {
            return Err(self.missing(id, kind));
        };
        let out = f(component);
        self.mark_modified(id, kind)?;
        Ok(out)
    }

    /// Like [`modify`](Self::modify), but only marks the component modified
    /// when `f` succeeds.
    pub fn try_modify<R>(
        &mut self,
        id: EntityId,
        kind: KindId,
        f: impl FnOnce(&mut Component) -> Result<R, EcsError>,
    ) -> Result<R, EcsError> {
        let record = self.record_mut(id)?;
        let Some(component) = record.components.get_mut(&kind) else {
            return Err(self.missing(id, kind));
        };
        let out = f(component)?;
        self.mark_modified(id, kind)?;
        Ok(out)
    }

    /// Set one field, validated against the kind, and mark it modified.
    pub fn set_field(
        &mut self,
        id: EntityId,
        kind: KindId,
        field: &str,
        value: Value,
    ) -> Result<(), EcsError> {
        self.try_modify(id, kind, |c| c.set(field, value))
    }

    // -- Typed access --

    pub fn insert<T: TypedComponent>(&mut self, id: EntityId, value: &T) -> Result<(), EcsError> {
        let kind = self.registry.kind_of(T::kind_name())?;
        let fields = serde_json::to_value(value)?;
        self.add_component(id, kind, fields)?;
        Ok(())
    }

    /// `Ok(None)` when the entity lives but lacks the component.
    pub fn read<T: TypedComponent>(&self, id: EntityId) -> Result<Option<T>, EcsError> {
        let kind = self.registry.kind_of(T::kind_name())?;
        match self.record(id)?.component(kind) {
            Some(c) => Ok(Some(c.deserialize()?)),
            None => Ok(None),
        }
    }

    /// Read, mutate and write back a typed component, marking it modified.
    pub fn write<T: TypedComponent, R>(
        &mut self,
        id: EntityId,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, EcsError> {
        let kind = self.registry.kind_of(T::kind_name())?;
        let mut value: T = self
            .read(id)?
            .ok_or_else(|| self.missing(id, kind))?;
        let out = f(&mut value);
        let Value::Object(fields) = serde_json::to_value(&value)? else {
            return Err(EcsError::InvalidField {
                kind: T::kind_name().to_string(),
                field: "*".to_string(),
                message: "typed component did not serialize to an object".to_string(),
            });
        };
        self.try_modify(id, kind, |c| c.set_all(fields))?;
        Ok(out)
    }

    // -- Hierarchy --

    /// Attach `id` under `parent`, or detach it with `None`. Fails without
    /// changing anything if `parent` is `id` or one of its descendants.
    pub fn set_parent(&mut self, id: EntityId, parent: Option<EntityId>) -> Result<(), EcsError> {
        let old = self.record(id)?.parent;
        if let Some(p) = parent {
            self.record(p)?;
            if self.store.is_ancestor_or_self(id, p) {
                return Err(EcsError::CyclicHierarchy { entity: id, parent: p });
            }
        }
        if old == parent {
            return Ok(());
        }

        if let Some(old) = old.and_then(|o| self.store.get_mut(o)) {
            old.children.retain(|c| *c != id);
        }
        if let Some(new) = parent.and_then(|p| self.store.get_mut(p)) {
            new.children.push(id);
        }
        self.record_mut(id)?.parent = parent;
        trace!(entity = %id, ?parent, "reparented");
        Ok(())
    }

    pub fn parent(&self, id: EntityId) -> Result<Option<EntityId>, EcsError> {
        Ok(self.record(id)?.parent)
    }

    pub fn children(&self, id: EntityId) -> Result<&[EntityId], EcsError> {
        Ok(&self.record(id)?.children)
    }

    /// Pre-order descendants, not including `id`.
    pub fn descendants(&self, id: EntityId) -> Result<Vec<EntityId>, EcsError> {
        self.record(id)?;
        Ok(self.store.descendants(id))
    }

    // -- Lookup --

    pub fn get_by_id(&self, id: EntityId) -> Option<&EntityRecord> {
        self.store.get(id)
    }

    /// Every live entity with `kind`, active or not. Computed from the
    /// records, not the query index.
    pub fn get_all_by_component(&self, kind: KindId) -> Vec<EntityId> {
        self.store.iter().filter(|r| r.has(kind)).map(|r| r.id).collect()
    }

    pub fn get_all_by(&self, predicate: impl Fn(&EntityRecord) -> bool) -> Vec<EntityId> {
        self.store.iter().filter(|r| predicate(r)).map(|r| r.id).collect()
    }

    pub fn name(&self, id: EntityId) -> Option<&str> {
        self.store.get(id)?.name()
    }

    pub fn set_name(&mut self, id: EntityId, name: Option<String>) -> Result<(), EcsError> {
        self.record_mut(id)?.name = name;
        Ok(())
    }

    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.store
            .iter()
            .find(|r| r.name.as_deref() == Some(name))
            .map(|r| r.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.store.iter()
    }

    // -- Queries --

    pub fn register_query(&mut self, spec: &QuerySpec) -> Result<QueryId, EcsError> {
        let compiled = spec.compile(&self.registry)?;
        Ok(self.index.insert(compiled, &self.store))
    }

    pub fn unregister_query(&mut self, id: QueryId) {
        self.index.release(id);
    }

    /// Current members of a registered query, in id order.
    pub fn members(&self, id: QueryId) -> Option<&BTreeSet<EntityId>> {
        self.index.members(id)
    }

    /// Close the tick window and open the next one.
    pub(crate) fn end_tick(&mut self) {
        self.index.end_tick();
        self.store.advance_tick();
    }

    // -- Internals --

    pub(crate) fn record(&self, id: EntityId) -> Result<&EntityRecord, EcsError> {
        self.store.get(id).ok_or(EcsError::NoSuchEntity(id))
    }

    pub(crate) fn record_mut(&mut self, id: EntityId) -> Result<&mut EntityRecord, EcsError> {
        self.store.get_mut(id).ok_or(EcsError::NoSuchEntity(id))
    }

    fn notify(&mut self, id: EntityId, kind: KindId) {
        let tick = self.store.tick();
        if let Some(record) = self.store.get(id) {
            self.index.on_component_edge(record, kind, tick);
        }
    }

    fn missing(&self, id: EntityId, kind: KindId) -> EcsError {
        EcsError::MissingComponent {
            entity: id,
            kind: self.registry.name_of(kind),
        }
    }
}

/// Adds components to an inactive entity before it joins any query.
pub struct EntityBuilder<'a> {
    entities: &'a mut Entities,
    id: EntityId,
}

impl EntityBuilder<'_> {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn named(self, name: impl Into<String>) -> Result<Self, EcsError> {
        self.entities.set_name(self.id, Some(name.into()))?;
        Ok(self)
    }

    pub fn with(self, kind: &str, fields: Value) -> Result<Self, EcsError> {
        self.entities.add(self.id, kind, fields)?;
        Ok(self)
    }

    pub fn with_typed<T: TypedComponent>(self, value: &T) -> Result<Self, EcsError> {
        self.entities.insert(self.id, value)?;
        Ok(self)
    }

    pub fn child_of(self, parent: EntityId) -> Result<Self, EcsError> {
        self.entities.set_parent(self.id, Some(parent))?;
        Ok(self)
    }

    /// Finish and make the entity visible to queries.
    pub fn activate(self) -> Result<EntityId, EcsError> {
        self.entities.activate(self.id)?;
        Ok(self.id)
    }

    /// Finish, leaving the entity inactive.
    pub fn build(self) -> EntityId {
        self.id
    }
}

/// Build a field object from `(name, value)` pairs.
pub fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Value {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), v);
    }
    Value::Object(map)
}
