//! Field paths and their resolution against a live form.
//!
//! Resolution walks the form and the schema side by side. A segment missing
//! from the form is only acceptable when the schema declares it optional;
//! in mutating mode it is then materialized as an empty leaf.
use tracing::trace;

use crate::error::FormError;
use crate::form_tree::{FormField, FormFields, FormTree};
use crate::introspect::{is_optional, shape_of, ShapeRef};
use crate::schema::Schema;

/// `"name"`, `"a.b.c"` or an explicit list of segments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldPath {
    Text(String),
    Segments(Vec<String>),
}

impl FieldPath {
    pub fn segments(&self, separator: char) -> Vec<String> {
        match self {
            FieldPath::Text(s) => s.split(separator).map(str::to_string).collect(),
            FieldPath::Segments(xs) => xs.clone(),
        }
    }

    pub fn display(&self, separator: char) -> String {
        match self {
            FieldPath::Text(s) => s.clone(),
            FieldPath::Segments(xs) => xs.join(&separator.to_string()),
        }
    }
}

impl From<&str> for FieldPath {
    fn from(s: &str) -> Self { FieldPath::Text(s.to_string()) }
}

impl From<String> for FieldPath {
    fn from(s: String) -> Self { FieldPath::Text(s) }
}

impl From<Vec<String>> for FieldPath {
    fn from(xs: Vec<String>) -> Self { FieldPath::Segments(xs) }
}

impl From<&[&str]> for FieldPath {
    fn from(xs: &[&str]) -> Self { FieldPath::Segments(xs.iter().map(|s| s.to_string()).collect()) }
}

impl<const N: usize> From<[&str; N]> for FieldPath {
    fn from(xs: [&str; N]) -> Self { FieldPath::Segments(xs.iter().map(|s| s.to_string()).collect()) }
}

// ------------------------------ Resolution -------------------------------- //

/// Mutable lookup; creates `{value: None, error: ""}` for absent optional
/// fields on the way.
pub(crate) fn resolve_mut<'t>(
    fields: &'t mut FormFields,
    schema: &Schema,
    segments: &[String],
    shown: &str,
) -> Result<&'t mut FormTree, FormError> {
    let fail = || FormError::PathResolution { path: shown.to_string() };
    let mut shape: Option<ShapeRef<'_>> = shape_of(schema);
    let mut level = fields;

    for (i, seg) in segments.iter().enumerate() {
        let field_schema = shape.as_ref().and_then(|s| s.get(seg.as_str()).copied());
        if !level.contains_key(seg.as_str()) {
            match field_schema {
                Some(fs) if is_optional(fs) => {
                    trace!(path = shown, field = seg.as_str(), "materializing optional field");
                    level.insert(seg.clone(), FormTree::Leaf(FormField::default()));
                }
                _ => return Err(fail()),
            }
        }
        let entry = level.get_mut(seg.as_str()).ok_or_else(fail)?;
        if i + 1 == segments.len() {
            return Ok(entry);
        }
        match entry {
            FormTree::Node(children) => level = children,
            FormTree::Leaf(_) => return Err(fail()),
        }
        shape = field_schema.and_then(shape_of);
    }
    Err(fail())
}

/// Read-only lookup; never materializes anything.
pub(crate) fn resolve<'t>(fields: &'t FormFields, segments: &[String], shown: &str) -> Result<&'t FormTree, FormError> {
    let fail = || FormError::PathResolution { path: shown.to_string() };
    let (last, init) = segments.split_last().ok_or_else(fail)?;
    let mut level = fields;
    for seg in init {
        match level.get(seg.as_str()) {
            Some(FormTree::Node(children)) => level = children,
            _ => return Err(fail()),
        }
    }
    level.get(last.as_str()).ok_or_else(fail)
}
