/// Resolved schema: merges definitions from any number of parsed files into
/// one set the runtime registers.
use crate::ast::*;
use crate::parser::Parser;
use crate::value::validate_value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("parse error: {0}")]
    Parse(#[from] crate::parser::ParseError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("duplicate type: {0}")]
    DuplicateType(String),
    #[error("duplicate system: {0}")]
    DuplicateSystem(String),
    #[error("unknown type referenced: {0}")]
    UnknownType(String),
    #[error("invalid default for '{component}.{field}': {message}")]
    InvalidDefault {
        component: String,
        field: String,
        message: String,
    },
    #[error("system '{system}' has unknown group '{group}'")]
    UnknownGroup { system: String, group: String },
}

/// A resolved schema containing all definitions.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Component kinds, keyed by name.
    pub components: HashMap<String, ComponentDef>,
    /// Enum types, keyed by name.
    pub enums: HashMap<String, EnumDef>,
    /// System declarations, keyed by name.
    pub systems: HashMap<String, SystemDef>,
    /// Loaded packages (namespace:name -> version).
    pub packages: HashMap<String, Option<String>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a `.relm` file and merge its definitions into this schema.
    pub fn load_file(&mut self, path: &Path) -> Result<(), SchemaError> {
        let source = std::fs::read_to_string(path)?;
        self.load_source(&source)
    }

    /// Load every `.relm` file in `dir`, in file name order.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, SchemaError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "relm") {
                paths.push(path);
            }
        }
        paths.sort();
        for path in &paths {
            self.load_file(path)?;
        }
        Ok(paths.len())
    }

    /// Parse a source string and merge its definitions.
    pub fn load_source(&mut self, source: &str) -> Result<(), SchemaError> {
        let file = Parser::parse(source)?;
        let pkg_key = format!("{}:{}", file.package.namespace, file.package.name);
        self.merge_items(&file.items)?;
        self.packages.insert(pkg_key, file.package.version);
        Ok(())
    }

    /// Merge items. The same definition may appear in several files; a
    /// conflicting one is an error.
    pub fn merge_items(&mut self, items: &[TopLevelItem]) -> Result<(), SchemaError> {
        for item in items {
            match item {
                TopLevelItem::Enum(e) => match self.enums.get(&e.name) {
                    Some(existing) if existing != e => {
                        return Err(SchemaError::DuplicateType(e.name.clone()));
                    }
                    Some(_) => {}
                    None => {
                        self.enums.insert(e.name.clone(), e.clone());
                    }
                },
                TopLevelItem::Component(c) => match self.components.get(&c.name) {
                    Some(existing) if !existing.same_schema(c) => {
                        return Err(SchemaError::DuplicateType(c.name.clone()));
                    }
                    Some(_) => {}
                    None => {
                        self.components.insert(c.name.clone(), c.clone());
                    }
                },
                TopLevelItem::System(s) => match self.systems.get(&s.name) {
                    Some(existing) if existing != s => {
                        return Err(SchemaError::DuplicateSystem(s.name.clone()));
                    }
                    Some(_) => {}
                    None => {
                        self.systems.insert(s.name.clone(), s.clone());
                    }
                },
            }
        }
        Ok(())
    }

    pub fn get_component(&self, name: &str) -> Option<&ComponentDef> {
        self.components.get(name)
    }

    pub fn get_system(&self, name: &str) -> Option<&SystemDef> {
        self.systems.get(name)
    }

    /// Component names in sorted order, for deterministic registration.
    pub fn component_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.components.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// The enum definitions a component's fields reference.
    pub fn enums_for(&self, component: &ComponentDef) -> BTreeMap<String, EnumDef> {
        component
            .fields
            .iter()
            .flat_map(|f| f.ty.named_types())
            .filter_map(|name| self.enums.get(name))
            .map(|e| (e.name.clone(), e.clone()))
            .collect()
    }

    /// Check that every referenced type exists, every default fits its field,
    /// and every system references known components and groups.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for comp in self.components.values() {
            for field in &comp.fields {
                self.validate_type_expr(&field.ty)?;
                if let Some(default) = &field.default {
                    validate_value(default, &field.ty, &self.enums).map_err(|message| {
                        SchemaError::InvalidDefault {
                            component: comp.name.clone(),
                            field: field.name.clone(),
                            message,
                        }
                    })?;
                }
            }
        }

        for sys in self.systems.values() {
            if let Some(group) = &sys.group {
                if !GROUP_NAMES.contains(&group.as_str()) {
                    return Err(SchemaError::UnknownGroup {
                        system: sys.name.clone(),
                        group: group.clone(),
                    });
                }
            }
            for query in &sys.queries {
                for name in query.referenced() {
                    if !self.components.contains_key(name) {
                        return Err(SchemaError::UnknownType(format!(
                            "system '{}' query '{}' references unknown component '{}'",
                            sys.name, query.name, name
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn validate_type_expr(&self, ty: &TypeExpr) -> Result<(), SchemaError> {
        match ty {
            TypeExpr::Map(k, _) if **k != TypeExpr::prim("string") => Err(
                SchemaError::UnknownType(format!("map keys must be string, got {k:?}")),
            ),
            _ => {
                for name in ty.named_types() {
                    if !self.enums.contains_key(name) {
                        return Err(SchemaError::UnknownType(name.to_string()));
                    }
                }
                Ok(())
            }
        }
    }

    /// Serialize the schema to a JSON description for external tooling.
    pub fn to_json(&self) -> serde_json::Value {
        let mut components: Vec<&ComponentDef> = self.components.values().collect();
        components.sort_by(|a, b| a.name.cmp(&b.name));
        let mut systems: Vec<&SystemDef> = self.systems.values().collect();
        systems.sort_by(|a, b| a.name.cmp(&b.name));

        serde_json::json!({
            "components": components.iter().map(|c| {
                serde_json::json!({
                    "name": c.name,
                    "is_tag": c.is_tag(),
                    "editor": c.editor,
                    "fields": c.fields.iter().map(|f| {
                        serde_json::json!({
                            "name": f.name,
                            "type": f.ty,
                            "default": f.default,
                            "editor": f.editor,
                        })
                    }).collect::<Vec<_>>(),
                })
            }).collect::<Vec<_>>(),
            "enums": self.enums,
            "systems": systems.iter().map(|s| {
                serde_json::json!({
                    "name": s.name,
                    "group": s.group,
                    "offset": s.offset,
                    "queries": s.queries.iter().map(|q| {
                        serde_json::json!({
                            "name": q.name,
                            "require": q.require,
                            "exclude": q.exclude,
                            "modified": q.modified,
                        })
                    }).collect::<Vec<_>>(),
                })
            }).collect::<Vec<_>>(),
            "packages": self.packages,
        })
    }
}
