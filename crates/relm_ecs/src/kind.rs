//! Component kinds and the registry that owns them.
//!
//! ## Stable identity
//!
//! [`KindId`] is derived from the kind's **name** with the FNV-1a 64-bit
//! hash, so the same kind has the same id no matter when (or in which
//! process) it was registered:
//!
//! ```text
//! hash = 0xcbf29ce484222325          (offset basis)
//! for each byte in name.as_bytes():
//!     hash = hash XOR byte
//!     hash = hash * 0x00000100000001b3  (prime)
//! ```

use relm_schema::{ComponentDef, EnumDef, Schema, SchemaError, default_value, validate_value};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::EcsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KindId(pub u64);

impl KindId {
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }
}

/// A registered component kind: its declaration plus the enum types its
/// fields refer to. Immutable once registered.
#[derive(Debug, Clone)]
pub struct ComponentKind {
    id: KindId,
    def: ComponentDef,
    enums: BTreeMap<String, EnumDef>,
}

impl ComponentKind {
    pub fn id(&self) -> KindId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn def(&self) -> &ComponentDef {
        &self.def
    }

    pub fn is_tag(&self) -> bool {
        self.def.is_tag()
    }

    /// Check a single field value against its declared type.
    pub fn validate_field(&self, field: &str, value: &Value) -> Result<(), EcsError> {
        let def = self.def.field_def(field).ok_or_else(|| self.invalid(field, "no such field"))?;
        validate_value(value, &def.ty, &self.enums).map_err(|msg| self.invalid(field, &msg))
    }

    /// Build a field map: declared defaults (or zero values) first, then
    /// `overrides`, which must be an object or null.
    pub fn instantiate(&self, overrides: Value) -> Result<Map<String, Value>, EcsError> {
        let mut fields = Map::new();
        for f in &self.def.fields {
            let value = match &f.default {
                Some(v) => v.clone(),
                None => default_value(&f.ty, &self.enums),
            };
            fields.insert(f.name.clone(), value);
        }

        let overrides = match overrides {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(self.invalid("*", &format!("expected an object of fields, got {other}")));
            }
        };
        for (name, value) in overrides {
            self.validate_field(&name, &value)?;
            fields.insert(name, value);
        }
        Ok(fields)
    }

    fn invalid(&self, field: &str, message: &str) -> EcsError {
        EcsError::InvalidField {
            kind: self.def.name.clone(),
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Declared component kinds and enum types.
#[derive(Debug, Default)]
pub struct Registry {
    kinds: HashMap<KindId, Arc<ComponentKind>>,
    enums: HashMap<String, EnumDef>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an enum type for use by later component fields.
    pub fn register_enum(&mut self, def: EnumDef) -> Result<(), EcsError> {
        match self.enums.get(&def.name) {
            Some(existing) if *existing != def => {
                Err(EcsError::Schema(SchemaError::DuplicateType(def.name)))
            }
            Some(_) => Ok(()),
            None => {
                debug!(name = %def.name, variants = def.variants.len(), "registered enum");
                self.enums.insert(def.name.clone(), def);
                Ok(())
            }
        }
    }

    /// Register a component kind. Registering an identical declaration again
    /// returns the existing id.
    pub fn register_kind(&mut self, def: ComponentDef) -> Result<KindId, EcsError> {
        let id = KindId::from_name(&def.name);
        if let Some(existing) = self.kinds.get(&id) {
            if existing.name() != def.name {
                return Err(EcsError::KindIdCollision {
                    name: def.name,
                    existing: existing.name().to_string(),
                });
            }
            if existing.def.same_schema(&def) {
                return Ok(id);
            }
            return Err(EcsError::DuplicateKind(def.name));
        }

        let mut enums = BTreeMap::new();
        for field in &def.fields {
            for name in field.ty.named_types() {
                let e = self.enums.get(name).ok_or_else(|| {
                    EcsError::Schema(SchemaError::UnknownType(format!(
                        "{}.{} references unknown type '{name}'",
                        def.name, field.name
                    )))
                })?;
                enums.insert(e.name.clone(), e.clone());
            }
        }

        let kind = ComponentKind { id, def, enums };
        for field in &kind.def.fields {
            if let Some(default) = &field.default {
                kind.validate_field(&field.name, default)?;
            }
        }

        info!(kind = %kind.def.name, fields = kind.def.fields.len(), "registered component kind");
        self.kinds.insert(id, Arc::new(kind));
        Ok(id)
    }

    /// Register every enum and component in a resolved schema. Components
    /// are registered in name order.
    pub fn register_schema(&mut self, schema: &Schema) -> Result<Vec<KindId>, EcsError> {
        schema.validate()?;
        let mut enum_names: Vec<&String> = schema.enums.keys().collect();
        enum_names.sort();
        for name in enum_names {
            if let Some(def) = schema.enums.get(name) {
                self.register_enum(def.clone())?;
            }
        }
        let mut ids = Vec::new();
        for name in schema.component_names() {
            if let Some(def) = schema.get_component(name) {
                ids.push(self.register_kind(def.clone())?);
            }
        }
        Ok(ids)
    }

    /// Resolve a kind name to its id.
    pub fn kind_of(&self, name: &str) -> Result<KindId, EcsError> {
        let id = KindId::from_name(name);
        match self.kinds.get(&id) {
            Some(kind) if kind.name() == name => Ok(id),
            _ => Err(EcsError::UnknownKind(name.to_string())),
        }
    }

    pub fn get(&self, id: KindId) -> Option<&Arc<ComponentKind>> {
        self.kinds.get(&id)
    }

    pub(crate) fn kind(&self, id: KindId) -> Result<&Arc<ComponentKind>, EcsError> {
        self.kinds
            .get(&id)
            .ok_or_else(|| EcsError::UnknownKind(format!("{id:?}")))
    }

    /// Display name for a kind id, falling back to the raw id.
    pub(crate) fn name_of(&self, id: KindId) -> String {
        self.kinds
            .get(&id)
            .map(|k| k.name().to_string())
            .unwrap_or_else(|| format!("{id:?}"))
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ComponentKind>> {
        self.kinds.values()
    }
}
