//! Component instances and the typed view over them.
//!
//! Component data is schema-defined rather than a Rust type, so an instance
//! stores its fields as `serde_json::Value`s and checks every write against
//! its kind. Rust code that prefers a struct implements [`TypedComponent`]
//! and goes through serde.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::EcsError;
use crate::kind::{ComponentKind, KindId};

/// A Rust struct that maps onto a registered component kind by name.
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use relm_ecs::TypedComponent;
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Velocity {
///     dx: f32,
///     dy: f32,
/// }
///
/// impl TypedComponent for Velocity {
///     fn kind_name() -> &'static str { "velocity" }
/// }
/// ```
pub trait TypedComponent: Serialize + DeserializeOwned {
    fn kind_name() -> &'static str;

    fn kind_id() -> KindId {
        KindId::from_name(Self::kind_name())
    }
}

/// One component attached to one entity.
#[derive(Debug, Clone)]
pub struct Component {
    kind: Arc<ComponentKind>,
    fields: Map<String, Value>,
}

impl Component {
    pub(crate) fn new(kind: Arc<ComponentKind>, fields: Map<String, Value>) -> Self {
        Self { kind, fields }
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub fn kind_id(&self) -> KindId {
        self.kind.id()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(Value::as_bool)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Replace one field. The value must match the field's declared type.
    pub fn set(&mut self, field: &str, value: Value) -> Result<(), EcsError> {
        self.kind.validate_field(field, &value)?;
        self.fields.insert(field.to_string(), value);
        Ok(())
    }

    /// Replace several fields at once. Nothing is written if any is invalid.
    pub fn set_all(&mut self, fields: Map<String, Value>) -> Result<(), EcsError> {
        for (name, value) in &fields {
            self.kind.validate_field(name, value)?;
        }
        self.fields.extend(fields);
        Ok(())
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, EcsError> {
        Ok(serde_json::from_value(self.to_value())?)
    }
}
