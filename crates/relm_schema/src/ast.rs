/// Abstract syntax tree types for the relm declaration language.
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Top-level file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub package: PackageDecl,
    pub items: Vec<TopLevelItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDecl {
    pub namespace: String,
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TopLevelItem {
    Enum(EnumDef),
    Component(ComponentDef),
    System(SystemDef),
}

// ---------------------------------------------------------------------------
// Type expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TypeExpr {
    /// A primitive: bool, u8, u16, u32, u64, i8, i16, i32, i64, f32, f64, string, bytes
    Primitive(String),
    /// A named enum type
    Named(String),
    /// list<T>
    List(Box<TypeExpr>),
    /// option<T>
    Option(Box<TypeExpr>),
    /// set<T>
    Set(Box<TypeExpr>),
    /// map<K, V>
    Map(Box<TypeExpr>, Box<TypeExpr>),
    /// tuple<T1, T2, ...>
    Tuple(Vec<TypeExpr>),
}

impl TypeExpr {
    /// Shorthand for a primitive type, e.g. `TypeExpr::prim("f32")`.
    pub fn prim(name: &str) -> Self {
        TypeExpr::Primitive(name.to_string())
    }

    pub fn named(name: &str) -> Self {
        TypeExpr::Named(name.to_string())
    }

    pub fn list(inner: TypeExpr) -> Self {
        TypeExpr::List(Box::new(inner))
    }

    pub fn option(inner: TypeExpr) -> Self {
        TypeExpr::Option(Box::new(inner))
    }

    /// Visit every enum name this type mentions.
    pub fn named_types(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_named(&mut out);
        out
    }

    fn collect_named<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TypeExpr::Primitive(_) => {}
            TypeExpr::Named(n) => out.push(n),
            TypeExpr::List(inner) | TypeExpr::Option(inner) | TypeExpr::Set(inner) => {
                inner.collect_named(out)
            }
            TypeExpr::Map(k, v) => {
                k.collect_named(out);
                v.collect_named(out);
            }
            TypeExpr::Tuple(types) => {
                for t in types {
                    t.collect_named(out);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Enum
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub variants: Vec<String>,
}

// ---------------------------------------------------------------------------
// Component (kind declaration)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    /// Opaque metadata for the world editor. Never read by the runtime.
    pub editor: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeExpr,
    /// Explicit default; `None` means the type's zero value.
    pub default: Option<Value>,
    pub editor: Option<Value>,
}

impl ComponentDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            editor: None,
        }
    }

    /// Append a field that defaults to its type's zero value.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
            default: None,
            editor: None,
        });
        self
    }

    /// Append a field with an explicit default.
    #[must_use]
    pub fn field_with_default(
        mut self,
        name: impl Into<String>,
        ty: TypeExpr,
        default: Value,
    ) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
            default: Some(default),
            editor: None,
        });
        self
    }

    /// Attach editor metadata to the most recently added field, or to the
    /// component itself when it has no fields yet.
    #[must_use]
    pub fn editor(mut self, meta: Value) -> Self {
        match self.fields.last_mut() {
            Some(field) => field.editor = Some(meta),
            None => self.editor = Some(meta),
        }
        self
    }

    /// A component without fields is a zero-sized tag.
    pub fn is_tag(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Structural equality ignoring editor metadata.
    pub fn same_schema(&self, other: &ComponentDef) -> bool {
        self.name == other.name
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.name == b.name && a.ty == b.ty && a.default == b.default)
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemDef {
    pub name: String,
    /// One of `initialization`, `simulation`, `presentation`.
    pub group: Option<String>,
    pub offset: i32,
    pub queries: Vec<QueryDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryDef {
    pub name: String,
    pub require: Vec<String>,
    pub exclude: Vec<String>,
    pub modified: Vec<String>,
}

impl QueryDef {
    /// Every component name the query mentions.
    pub fn referenced(&self) -> impl Iterator<Item = &String> {
        self.require
            .iter()
            .chain(&self.exclude)
            .chain(&self.modified)
    }
}

pub const GROUP_NAMES: [&str; 3] = ["initialization", "simulation", "presentation"];
