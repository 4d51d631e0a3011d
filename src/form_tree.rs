//! The form tree: a value tree where every leaf carries its current error.
//!
//! Nesting mirrors the schema's object nesting exactly. A schema field that
//! is object-like (object, intersection, union resolving to an object, with
//! effects looked through) becomes a `Node`; every other field, including
//! arrays, tuples, records and optional/default-wrapped objects, is a
//! `Leaf` holding its whole value.
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::introspect::{is_object_like, normalize, shape_of};
use crate::schema::{PathSegment, Schema};

// ------------------------------- Types ------------------------------------ //

/// `{value, error}` pair. `value: None` is a field that was materialized by
/// path assignment but never given a value; `error` is empty when clean.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FormField {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub error: String,
}

impl FormField {
    pub fn new(value: Value) -> Self { Self { value: Some(value), error: String::new() } }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FormTree {
    Leaf(FormField),
    Node(FormFields),
}

/// Root (and every nested level) of a form.
pub type FormFields = IndexMap<String, FormTree>;

impl FormTree {
    pub fn as_leaf(&self) -> Option<&FormField> {
        match self {
            FormTree::Leaf(f) => Some(f),
            FormTree::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&FormFields> {
        match self {
            FormTree::Node(n) => Some(n),
            FormTree::Leaf(_) => None,
        }
    }

    /// Leaf → its value; node → recursively unwrapped object.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            FormTree::Leaf(f) => f.value.clone(),
            FormTree::Node(children) => Some(Value::Object(to_json(children))),
        }
    }
}

// ------------------------------- Builder ---------------------------------- //

/// Wrap every value of `object` according to `schema`. Keys unknown to the
/// schema are kept as plain leaves. Defaults are never consulted.
pub fn build(object: &Map<String, Value>, schema: &Schema) -> FormFields {
    let shape = shape_of(schema).unwrap_or_default();
    object
        .iter()
        .map(|(key, value)| {
            let field_schema = shape.get(key.as_str()).copied();
            let tree = match (field_schema, value) {
                (Some(fs), Value::Object(nested)) if is_object_like(normalize(fs)) => {
                    FormTree::Node(build(nested, fs))
                }
                _ => FormTree::Leaf(FormField::new(value.clone())),
            };
            (key.clone(), tree)
        })
        .collect()
}

// ------------------------------- Walkers ---------------------------------- //

/// Plain value tree for validation. Leaves without a value are left out,
/// exactly like absent fields.
pub fn to_json(fields: &FormFields) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, tree) in fields {
        if let Some(v) = tree.to_value() {
            out.insert(key.clone(), v);
        }
    }
    out
}

pub fn for_each_leaf_mut(fields: &mut FormFields, f: &mut impl FnMut(&mut FormField)) {
    for tree in fields.values_mut() {
        match tree {
            FormTree::Leaf(leaf) => f(leaf),
            FormTree::Node(children) => for_each_leaf_mut(children, f),
        }
    }
}

pub fn clear_errors(fields: &mut FormFields) {
    for_each_leaf_mut(fields, &mut |leaf| leaf.error.clear());
}

/// Every leaf with its key path, depth-first in field order.
pub fn leaves(fields: &FormFields) -> Vec<(Vec<&str>, &FormField)> {
    fn go<'a>(fields: &'a FormFields, prefix: &mut Vec<&'a str>, out: &mut Vec<(Vec<&'a str>, &'a FormField)>) {
        for (key, tree) in fields {
            prefix.push(key);
            match tree {
                FormTree::Leaf(leaf) => out.push((prefix.clone(), leaf)),
                FormTree::Node(children) => go(children, prefix, out),
            }
            prefix.pop();
        }
    }
    let mut out = Vec::new();
    go(fields, &mut Vec::new(), &mut out);
    out
}

/// Follow `path` through nested nodes as far as it goes and return the leaf
/// it ends on (trailing segments below a leaf, e.g. array indexes, are
/// ignored). A path that stops on a node lands on that node's first leaf.
/// `None` when the path leaves the tree or the node has no leaves.
pub fn deepest_leaf_mut<'t>(fields: &'t mut FormFields, path: &[PathSegment]) -> Option<&'t mut FormField> {
    let Some((head, rest)) = path.split_first() else { return first_leaf_mut(fields) };
    let PathSegment::Key(head) = head else { return None };
    match fields.get_mut(head.as_str())? {
        FormTree::Leaf(leaf) => Some(leaf),
        FormTree::Node(children) => deepest_leaf_mut(children, rest),
    }
}

/// First leaf in field order, depth-first.
pub fn first_leaf_mut(fields: &mut FormFields) -> Option<&mut FormField> {
    fields.values_mut().find_map(|tree| match tree {
        FormTree::Leaf(leaf) => Some(leaf),
        FormTree::Node(children) => first_leaf_mut(children),
    })
}

// ------------------------------- Tests ------------------------------------ //
