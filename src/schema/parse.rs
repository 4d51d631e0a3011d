//! Parsing: walk a value against a schema, collecting issues.
//!
//! Every sub-parse ends in one of three states:
//! - valid:   no issues, value usable
//! - dirty:   issues recorded (failed checks), value still structurally usable,
//!            so refinements on enclosing values keep running
//! - aborted: structural mismatch (wrong type, missing value); enclosing
//!            refinements and transforms are skipped
//!
//! Only failures raised by user closures (default providers, transforms)
//! escape as `ParseError::Engine`; everything else is an `Issue`.
use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;

use super::{Effect, Schema};

// ------------------------------- Issues ----------------------------------- //

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => f.write_str(k),
            PathSegment::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(k: &str) -> Self { PathSegment::Key(k.to_string()) }
}

impl From<String> for PathSegment {
    fn from(k: String) -> Self { PathSegment::Key(k) }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self { PathSegment::Index(i) }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Issue {
    pub path: Vec<PathSegment>,
    pub message: String,
}

/// Structured validation failure: every issue found, in discovery order.
#[derive(Clone, Debug, Default, PartialEq, Error)]
#[error("validation failed with {} issue(s)", .issues.len())]
pub struct ValidationFailure {
    pub issues: Vec<Issue>,
}

/// Issues grouped by top-level field, plus the whole-object ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlattenedErrors {
    pub field_errors: IndexMap<String, Vec<String>>,
    pub form_errors: Vec<String>,
}

impl ValidationFailure {
    pub fn flatten(&self) -> FlattenedErrors {
        let mut out = FlattenedErrors::default();
        for issue in &self.issues {
            match issue.path.first() {
                None => out.form_errors.push(issue.message.clone()),
                Some(head) => out
                    .field_errors
                    .entry(head.to_string())
                    .or_default()
                    .push(issue.message.clone()),
            }
        }
        out
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Invalid(#[from] ValidationFailure),
    /// Not a validation outcome: a default provider or transform failed.
    #[error(transparent)]
    Engine(anyhow::Error),
}

// ------------------------------- Cursor ----------------------------------- //

#[derive(Default)]
struct Cursor {
    path: Vec<PathSegment>,
    issues: Vec<Issue>,
}

impl Cursor {
    fn report(&mut self, message: impl Into<String>) {
        self.issues.push(Issue { path: self.path.clone(), message: message.into() });
    }

    fn report_at(&mut self, rel: &[PathSegment], message: impl Into<String>) {
        let mut path = self.path.clone();
        path.extend(rel.iter().cloned());
        self.issues.push(Issue { path, message: message.into() });
    }

    fn descend<T>(&mut self, seg: PathSegment, f: impl FnOnce(&mut Self) -> T) -> T {
        self.path.push(seg);
        let out = f(self);
        self.path.pop();
        out
    }

    /// Fresh issue buffer at the same location (for trying union options).
    fn fork(&self) -> Self { Self { path: self.path.clone(), issues: Vec::new() } }
}

enum Parsed {
    Valid(Option<Value>),
    Dirty(Option<Value>),
    Aborted,
}

impl Parsed {
    fn dirty_if(flag: bool, value: Option<Value>) -> Self {
        if flag { Parsed::Dirty(value) } else { Parsed::Valid(value) }
    }
}

// -------------------------------- Entry ----------------------------------- //

pub(super) fn run(schema: &Schema, input: Option<&Value>) -> Result<Option<Value>, ParseError> {
    let mut cx = Cursor::default();
    let parsed = walk(schema, input, &mut cx).map_err(ParseError::Engine)?;
    match parsed {
        Parsed::Valid(v) if cx.issues.is_empty() => Ok(v),
        _ => Err(ParseError::Invalid(ValidationFailure { issues: cx.issues })),
    }
}

fn type_name(v: Option<&Value>) -> &'static str {
    match v {
        None => "undefined",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}

fn mismatch(expected: &str, input: Option<&Value>, cx: &mut Cursor) -> Parsed {
    match input {
        None => cx.report("Required"),
        Some(_) => cx.report(format!("Expected {expected}, received {}", type_name(input))),
    }
    Parsed::Aborted
}

// -------------------------------- Walk ------------------------------------ //

fn walk(schema: &Schema, input: Option<&Value>, cx: &mut Cursor) -> anyhow::Result<Parsed> {
    let parsed = match schema {
        Schema::Boolean => match input {
            Some(v @ Value::Bool(_)) => Parsed::Valid(Some(v.clone())),
            _ => mismatch("boolean", input, cx),
        },
        Schema::Number { checks } => match input {
            Some(v @ Value::Number(n)) => {
                let x = n.as_f64().unwrap_or(f64::NAN);
                let before = cx.issues.len();
                for msg in checks.iter().filter_map(|c| c.run(x)) { cx.report(msg); }
                Parsed::dirty_if(cx.issues.len() > before, Some(v.clone()))
            }
            _ => mismatch("number", input, cx),
        },
        Schema::String { checks } => match input {
            Some(v @ Value::String(s)) => {
                let before = cx.issues.len();
                for msg in checks.iter().filter_map(|c| c.run(s)) { cx.report(msg); }
                Parsed::dirty_if(cx.issues.len() > before, Some(v.clone()))
            }
            _ => mismatch("string", input, cx),
        },
        Schema::Array { element, checks } => match input {
            Some(Value::Array(xs)) => walk_array(element, checks, xs, cx)?,
            _ => mismatch("array", input, cx),
        },
        Schema::Tuple { elements } => match input {
            Some(Value::Array(xs)) => walk_tuple(elements, xs, cx)?,
            _ => mismatch("array", input, cx),
        },
        Schema::Object { fields } => match input {
            Some(Value::Object(map)) => {
                walk_fields(fields.iter().map(|(k, s)| (k.as_str(), s)), map, cx)?
            }
            _ => mismatch("object", input, cx),
        },
        Schema::Record { value } => match input {
            Some(Value::Object(map)) => {
                walk_fields(map.keys().map(|k| (k.as_str(), value.as_ref())), map, cx)?
            }
            _ => mismatch("object", input, cx),
        },
        Schema::Union { options } => walk_union(options, input, cx)?,
        Schema::Intersection { left, right } => {
            let l = walk(left, input, cx)?;
            let r = walk(right, input, cx)?;
            match (l, r) {
                (Parsed::Aborted, _) | (_, Parsed::Aborted) => Parsed::Aborted,
                (l, r) => {
                    let dirty = matches!(l, Parsed::Dirty(_)) || matches!(r, Parsed::Dirty(_));
                    match merge(into_value(l), into_value(r)) {
                        Some(v) => Parsed::dirty_if(dirty, v),
                        None => {
                            cx.report("Intersection results could not be merged");
                            Parsed::Aborted
                        }
                    }
                }
            }
        }
        Schema::Optional { inner } => match input {
            None => Parsed::Valid(None),
            Some(_) => walk(inner, input, cx)?,
        },
        Schema::Default { inner, provider } => match input {
            None => {
                let fallback = provider.get()?;
                walk(inner, Some(&fallback), cx)?
            }
            Some(_) => walk(inner, input, cx)?,
        },
        Schema::Effect { inner, effect } => match walk(inner, input, cx)? {
            Parsed::Aborted => Parsed::Aborted,
            Parsed::Valid(v) => apply_effect(effect, false, v, cx)?,
            Parsed::Dirty(v) => apply_effect(effect, true, v, cx)?,
        },
    };
    Ok(parsed)
}

/// Refinements see dirty values too; transforms only clean ones.
fn apply_effect(effect: &Effect, dirty: bool, value: Option<Value>, cx: &mut Cursor) -> anyhow::Result<Parsed> {
    match effect {
        Effect::Refine(refinement) => {
            let subject = value.clone().unwrap_or(Value::Null);
            if refinement.rule.holds(&subject) {
                Ok(Parsed::dirty_if(dirty, value))
            } else {
                cx.report_at(&refinement.path, refinement.message.clone());
                Ok(Parsed::Dirty(value))
            }
        }
        Effect::Transform(_) if dirty => Ok(Parsed::Dirty(value)),
        Effect::Transform(t) => Ok(Parsed::Valid(value.map(|v| t.apply(v)).transpose()?)),
    }
}

fn into_value(p: Parsed) -> Option<Value> {
    match p {
        Parsed::Valid(v) | Parsed::Dirty(v) => v,
        Parsed::Aborted => None,
    }
}

fn walk_array(
    element: &Schema,
    checks: &[super::ArrayCheck],
    xs: &[Value],
    cx: &mut Cursor,
) -> anyhow::Result<Parsed> {
    let before = cx.issues.len();
    for msg in checks.iter().filter_map(|c| c.run(xs.len())) { cx.report(msg); }

    let mut aborted = false;
    let mut out = Vec::with_capacity(xs.len());
    for (i, x) in xs.iter().enumerate() {
        match cx.descend(PathSegment::Index(i), |cx| walk(element, Some(x), cx))? {
            Parsed::Aborted => aborted = true,
            p => out.push(into_value(p).unwrap_or(Value::Null)),
        }
    }
    if aborted { return Ok(Parsed::Aborted); }
    Ok(Parsed::dirty_if(cx.issues.len() > before, Some(Value::Array(out))))
}

fn walk_tuple(elements: &[Schema], xs: &[Value], cx: &mut Cursor) -> anyhow::Result<Parsed> {
    let n = elements.len();
    if xs.len() < n {
        cx.report(format!("Array must contain at least {n} element(s)"));
        return Ok(Parsed::Aborted);
    }
    let before = cx.issues.len();
    if xs.len() > n {
        cx.report(format!("Array must contain at most {n} element(s)"));
    }

    let mut aborted = false;
    let mut out = Vec::with_capacity(n);
    for (i, schema) in elements.iter().enumerate() {
        match cx.descend(PathSegment::Index(i), |cx| walk(schema, xs.get(i), cx))? {
            Parsed::Aborted => aborted = true,
            p => out.push(into_value(p).unwrap_or(Value::Null)),
        }
    }
    if aborted { return Ok(Parsed::Aborted); }
    Ok(Parsed::dirty_if(cx.issues.len() > before, Some(Value::Array(out))))
}

/// Shared by object (declared keys) and record (present keys). Unknown keys
/// are not copied to the output.
fn walk_fields<'s, I>(fields: I, map: &Map<String, Value>, cx: &mut Cursor) -> anyhow::Result<Parsed>
where
    I: Iterator<Item = (&'s str, &'s Schema)>,
{
    let before = cx.issues.len();
    let mut aborted = false;
    let mut out = Map::new();
    for (key, schema) in fields {
        let parsed = cx.descend(PathSegment::Key(key.to_string()), |cx| walk(schema, map.get(key), cx))?;
        match parsed {
            Parsed::Aborted => aborted = true,
            p => {
                if let Some(v) = into_value(p) {
                    out.insert(key.to_string(), v);
                }
            }
        }
    }
    if aborted { return Ok(Parsed::Aborted); }
    Ok(Parsed::dirty_if(cx.issues.len() > before, Some(Value::Object(out))))
}

/// First clean option wins; otherwise the first option that only failed
/// checks; otherwise a single "Invalid input".
fn walk_union(options: &[Schema], input: Option<&Value>, cx: &mut Cursor) -> anyhow::Result<Parsed> {
    let mut first_dirty: Option<(Cursor, Option<Value>)> = None;
    for option in options {
        let mut attempt = cx.fork();
        match walk(option, input, &mut attempt)? {
            Parsed::Valid(v) if attempt.issues.is_empty() => return Ok(Parsed::Valid(v)),
            Parsed::Aborted => {}
            p => {
                if first_dirty.is_none() {
                    first_dirty = Some((attempt, into_value(p)));
                }
            }
        }
    }
    match first_dirty {
        Some((attempt, v)) => {
            cx.issues.extend(attempt.issues);
            Ok(Parsed::Dirty(v))
        }
        None => {
            cx.report("Invalid input");
            Ok(Parsed::Aborted)
        }
    }
}

fn merge(a: Option<Value>, b: Option<Value>) -> Option<Option<Value>> {
    match (a, b) {
        (None, None) => Some(None),
        (Some(a), Some(b)) => merge_values(a, b).map(Some),
        _ => None,
    }
}

fn merge_values(a: Value, b: Value) -> Option<Value> {
    if a == b {
        return Some(a);
    }
    match (a, b) {
        (Value::Object(mut left), Value::Object(right)) => {
            for (k, rv) in right {
                let merged = match left.remove(&k) {
                    Some(lv) => merge_values(lv, rv)?,
                    None => rv,
                };
                left.insert(k, merged);
            }
            Some(Value::Object(left))
        }
        (Value::Array(left), Value::Array(right)) if left.len() == right.len() => {
            let merged: Option<Vec<Value>> =
                left.into_iter().zip(right).map(|(l, r)| merge_values(l, r)).collect();
            merged.map(Value::Array)
        }
        _ => None,
    }
}

// ------------------------------- Tests ------------------------------------ //
