//! Schema introspection: default value trees and object shapes.
//!
//! Pure functions of the schema. Defaults must reproduce exactly what the
//! parser accepts as "nothing provided", so nested wrapper combinations
//! (`optional(default(..))`, refined objects, ...) are honored recursively.
//!
//! Two asymmetries:
//! - a union's *field* default comes from its first option, whatever it is;
//!   a union's *object* default comes from its first object option.
//! - `optional(default(x))` yields `x`, but `optional(effect(default(x)))`
//!   yields nothing (the default is only seen directly under `optional`).
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::warn;

use crate::schema::Schema;

// ------------------------------- Defaults --------------------------------- //

/// Default for a single field. `None` means "absent": the field is left out
/// of the enclosing default object.
pub fn default_for_field(schema: &Schema) -> anyhow::Result<Option<Value>> {
    let value = match schema {
        Schema::Boolean => Some(Value::Bool(false)),
        Schema::Number { .. } => Some(Value::from(0)),
        Schema::String { .. } => Some(Value::String(String::new())),
        Schema::Array { .. } => Some(Value::Array(Vec::new())),
        Schema::Record { .. } => Some(Value::Object(Map::new())),
        Schema::Tuple { elements } => {
            let mut out = Vec::with_capacity(elements.len());
            for el in elements {
                // an absent tuple slot still occupies its position
                out.push(default_for_field(el)?.unwrap_or(Value::Null));
            }
            Some(Value::Array(out))
        }
        Schema::Default { provider, .. } => Some(provider.get()?),
        Schema::Effect { inner, .. } => default_for_field(inner)?,
        Schema::Optional { inner } => match inner.as_ref() {
            Schema::Default { provider, .. } => Some(provider.get()?),
            _ => None,
        },
        Schema::Union { options } => match options.first() {
            Some(first) => default_for_field(first)?,
            None => {
                warn!("default_for_field: union without options");
                None
            }
        },
        Schema::Object { .. } | Schema::Intersection { .. } => Some(Value::Object(default_object(schema)?)),
    };
    Ok(value)
}

/// Default object for an object-like schema. Never fails on shape problems:
/// unexpected variants produce a warning and an empty object.
pub fn default_object(schema: &Schema) -> anyhow::Result<Map<String, Value>> {
    match schema {
        Schema::Record { .. } => Ok(Map::new()),
        Schema::Effect { inner, .. } => default_object(inner),
        Schema::Intersection { left, right } => {
            let mut out = default_object(left)?;
            for (k, v) in default_object(right)? {
                out.insert(k, v);
            }
            Ok(out)
        }
        Schema::Union { options } => {
            match options.iter().find(|o| matches!(o, Schema::Object { .. })) {
                Some(obj) => default_object(obj),
                None => {
                    warn!("default_object: no object found in union, returning empty object");
                    Ok(Map::new())
                }
            }
        }
        Schema::Object { fields } => {
            let mut out = Map::new();
            for (name, field) in fields {
                if let Some(v) = default_for_field(field)? {
                    out.insert(name.clone(), v);
                }
            }
            Ok(out)
        }
        other => {
            warn!(kind = other.kind(), "default_object: expected object schema");
            Ok(Map::new())
        }
    }
}

// -------------------------------- Shapes ---------------------------------- //

/// Borrowed field mapping of an object-like schema.
pub type ShapeRef<'s> = IndexMap<&'s str, &'s Schema>;

/// Strip refinement/transform wrappers.
pub fn strip_effects(mut schema: &Schema) -> &Schema {
    while let Schema::Effect { inner, .. } = schema {
        schema = inner.as_ref();
    }
    schema
}

/// Effects stripped; a union collapses to its first object-like option.
pub fn normalize(schema: &Schema) -> &Schema {
    let schema = strip_effects(schema);
    if let Schema::Union { options } = schema {
        if let Some(obj) = options.iter().map(strip_effects).find(|o| is_object_like(o)) {
            return obj;
        }
    }
    schema
}

/// True for schemas whose values become nested form nodes.
pub fn is_object_like(schema: &Schema) -> bool {
    matches!(schema, Schema::Object { .. } | Schema::Intersection { .. })
}

/// Field mapping after normalization; intersections merge both sides
/// (right wins on collisions). `None` when the schema has no fields.
pub fn shape_of(schema: &Schema) -> Option<ShapeRef<'_>> {
    match normalize(schema) {
        Schema::Object { fields } => Some(fields.iter().map(|(k, s)| (k.as_str(), s)).collect()),
        Schema::Intersection { left, right } => {
            let mut out = shape_of(left).unwrap_or_default();
            out.extend(shape_of(right).unwrap_or_default());
            Some(out)
        }
        _ => None,
    }
}

/// The field schema is an `Optional` wrapper itself; a refined or
/// transformed optional does not count.
pub fn is_optional(schema: &Schema) -> bool {
    matches!(schema, Schema::Optional { .. })
}

// ------------------------------- Tests ------------------------------------ //
