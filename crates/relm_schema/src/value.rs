/// Field value validation and zero values for declared types.
///
/// Component data is carried as `serde_json::Value`; these helpers check a
/// value against its declared [`TypeExpr`] and produce the zero value used
/// when a field has no explicit default.
use crate::ast::{EnumDef, TypeExpr};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Resolves enum names referenced by [`TypeExpr::Named`].
pub trait EnumLookup {
    fn enum_def(&self, name: &str) -> Option<&EnumDef>;
}

impl EnumLookup for HashMap<String, EnumDef> {
    fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.get(name)
    }
}

impl EnumLookup for BTreeMap<String, EnumDef> {
    fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.get(name)
    }
}

/// Check `value` against `ty`. The error string describes the first mismatch.
pub fn validate_value(value: &Value, ty: &TypeExpr, enums: &impl EnumLookup) -> Result<(), String> {
    match ty {
        TypeExpr::Primitive(p) => validate_primitive(value, p),
        TypeExpr::Named(name) => {
            let def = enums
                .enum_def(name)
                .ok_or_else(|| format!("unknown type '{name}'"))?;
            let case = value
                .as_str()
                .ok_or_else(|| format!("expected {name} case name"))?;
            if def.variants.iter().any(|v| v == case) {
                Ok(())
            } else {
                Err(format!("'{case}' is not a case of {name}"))
            }
        }
        TypeExpr::List(inner) => {
            let arr = value.as_array().ok_or("expected array")?;
            for (i, item) in arr.iter().enumerate() {
                validate_value(item, inner, enums).map_err(|e| format!("[{i}]: {e}"))?;
            }
            Ok(())
        }
        TypeExpr::Set(inner) => {
            let arr = value.as_array().ok_or("expected array for set")?;
            for (i, item) in arr.iter().enumerate() {
                validate_value(item, inner, enums).map_err(|e| format!("[{i}]: {e}"))?;
                if arr[..i].contains(item) {
                    return Err(format!("[{i}]: duplicate set element"));
                }
            }
            Ok(())
        }
        TypeExpr::Option(inner) => {
            if value.is_null() {
                Ok(())
            } else {
                validate_value(value, inner, enums)
            }
        }
        TypeExpr::Map(_, v) => {
            let obj = value.as_object().ok_or("expected object for map")?;
            for (key, item) in obj {
                validate_value(item, v, enums).map_err(|e| format!("[{key}]: {e}"))?;
            }
            Ok(())
        }
        TypeExpr::Tuple(types) => {
            let arr = value.as_array().ok_or("expected array for tuple")?;
            if arr.len() != types.len() {
                return Err(format!(
                    "tuple has {} elements, expected {}",
                    arr.len(),
                    types.len()
                ));
            }
            for (i, (item, t)) in arr.iter().zip(types).enumerate() {
                validate_value(item, t, enums).map_err(|e| format!(".{i}: {e}"))?;
            }
            Ok(())
        }
    }
}

fn validate_primitive(value: &Value, prim: &str) -> Result<(), String> {
    let in_range = |lo: i64, hi: u64| -> Result<(), String> {
        if let Some(n) = value.as_u64() {
            return if n <= hi {
                Ok(())
            } else {
                Err(format!("{n} out of range for {prim}"))
            };
        }
        if let Some(n) = value.as_i64() {
            return if n >= lo {
                Ok(())
            } else {
                Err(format!("{n} out of range for {prim}"))
            };
        }
        Err(format!("expected integer for {prim}"))
    };

    match prim {
        "bool" => value.as_bool().map(|_| ()).ok_or_else(|| "expected bool".into()),
        "u8" => in_range(0, u8::MAX as u64),
        "u16" => in_range(0, u16::MAX as u64),
        "u32" => in_range(0, u32::MAX as u64),
        "u64" => in_range(0, u64::MAX),
        "i8" => in_range(i8::MIN as i64, i8::MAX as u64),
        "i16" => in_range(i16::MIN as i64, i16::MAX as u64),
        "i32" => in_range(i32::MIN as i64, i32::MAX as u64),
        "i64" => in_range(i64::MIN, i64::MAX as u64),
        "f32" | "f64" => value
            .as_number()
            .map(|_| ())
            .ok_or_else(|| "expected number".into()),
        "string" => value.as_str().map(|_| ()).ok_or_else(|| "expected string".into()),
        "bytes" => {
            let arr = value.as_array().ok_or("expected array for bytes")?;
            if arr.iter().all(|b| b.as_u64().is_some_and(|n| n <= 255)) {
                Ok(())
            } else {
                Err("bytes must be integers in 0..=255".into())
            }
        }
        other => Err(format!("unknown primitive '{other}'")),
    }
}

/// The zero value for `ty`. Enums take their first case.
pub fn default_value(ty: &TypeExpr, enums: &impl EnumLookup) -> Value {
    match ty {
        TypeExpr::Primitive(p) => match p.as_str() {
            "bool" => Value::Bool(false),
            "f32" | "f64" => Value::from(0.0),
            "string" => Value::String(String::new()),
            "bytes" => Value::Array(Vec::new()),
            _ => Value::from(0),
        },
        TypeExpr::Named(name) => enums
            .enum_def(name)
            .and_then(|e| e.variants.first())
            .map(|v| Value::String(v.clone()))
            .unwrap_or(Value::Null),
        TypeExpr::List(_) | TypeExpr::Set(_) => Value::Array(Vec::new()),
        TypeExpr::Option(_) => Value::Null,
        TypeExpr::Map(_, _) => Value::Object(Map::new()),
        TypeExpr::Tuple(types) => {
            Value::Array(types.iter().map(|t| default_value(t, enums)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn enums() -> HashMap<String, EnumDef> {
        let mut m = HashMap::new();
        m.insert(
            "shape".to_string(),
            EnumDef {
                name: "shape".into(),
                variants: vec!["box".into(), "sphere".into()],
            },
        );
        m
    }

    #[test]
    fn test_integer_ranges() {
        let e = enums();
        assert!(validate_value(&json!(255), &TypeExpr::prim("u8"), &e).is_ok());
        assert!(validate_value(&json!(256), &TypeExpr::prim("u8"), &e).is_err());
        assert!(validate_value(&json!(-1), &TypeExpr::prim("u32"), &e).is_err());
        assert!(validate_value(&json!(-128), &TypeExpr::prim("i8"), &e).is_ok());
        assert!(validate_value(&json!(1.5), &TypeExpr::prim("i32"), &e).is_err());
        assert!(validate_value(&json!(1.5), &TypeExpr::prim("f32"), &e).is_ok());
    }

    #[test]
    fn test_enum_cases() {
        let e = enums();
        let ty = TypeExpr::named("shape");
        assert!(validate_value(&json!("sphere"), &ty, &e).is_ok());
        let err = validate_value(&json!("cone"), &ty, &e).unwrap_err();
        assert!(err.contains("not a case"));
        assert!(validate_value(&json!("x"), &TypeExpr::named("missing"), &e).is_err());
    }

    #[test]
    fn test_nested_containers() {
        let e = enums();
        let ty = TypeExpr::list(TypeExpr::Tuple(vec![
            TypeExpr::prim("f32"),
            TypeExpr::prim("string"),
        ]));
        assert!(validate_value(&json!([[1.0, "a"], [2, "b"]]), &ty, &e).is_ok());
        let err = validate_value(&json!([[1.0, "a"], [2, 3]]), &ty, &e).unwrap_err();
        assert!(err.starts_with("[1]"));
    }

    #[test]
    fn test_option_and_set() {
        let e = enums();
        let opt = TypeExpr::option(TypeExpr::prim("u64"));
        assert!(validate_value(&Value::Null, &opt, &e).is_ok());
        assert!(validate_value(&json!(7), &opt, &e).is_ok());
        assert!(validate_value(&json!("7"), &opt, &e).is_err());

        let set = TypeExpr::Set(Box::new(TypeExpr::prim("u8")));
        assert!(validate_value(&json!([1, 2]), &set, &e).is_ok());
        assert!(validate_value(&json!([1, 1]), &set, &e).is_err());
    }

    #[test]
    fn test_zero_values() {
        let e = enums();
        assert_eq!(default_value(&TypeExpr::prim("bool"), &e), json!(false));
        assert_eq!(default_value(&TypeExpr::prim("u16"), &e), json!(0));
        assert_eq!(default_value(&TypeExpr::prim("f64"), &e), json!(0.0));
        assert_eq!(default_value(&TypeExpr::named("shape"), &e), json!("box"));
        let tuple = TypeExpr::Tuple(vec![TypeExpr::prim("f32"); 3]);
        assert_eq!(default_value(&tuple, &e), json!([0.0, 0.0, 0.0]));
        // Zero values always validate.
        assert!(validate_value(&default_value(&tuple, &e), &tuple, &e).is_ok());
    }
}
