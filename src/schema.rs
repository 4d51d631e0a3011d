//! Closed schema description (shape + defaults + validation rules).
//!
//! A `Schema` is a self-describing tree over a fixed set of variants:
//! containers (object, array, tuple, record), combinators (union,
//! intersection), wrappers (optional, default, effect) and primitives.
//! Schemas are immutable once built and cheap to share behind an `Arc`;
//! the form engine only ever reads them.
//!
//! The builder API reads left-to-right the way schema literals are usually
//! written:
//!
//! ```
//! use schema_form::schema::Schema;
//!
//! let user = Schema::object([
//!     ("username", Schema::string().min(3)),
//!     ("age", Schema::number().min(18).message("User is too young").max(99)),
//!     ("nickname", Schema::string().optional()),
//! ]);
//! ```
pub mod checks;
pub mod parse;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

pub use checks::{ArrayCheck, ArrayRule, Check, NumberCheck, NumberRule, StringCheck, StringRule};
pub use parse::{FlattenedErrors, Issue, ParseError, PathSegment, ValidationFailure};

/// Ordered field mapping of an object schema.
pub type Shape = IndexMap<String, Schema>;

type ProviderFn = dyn Fn() -> anyhow::Result<Value> + Send + Sync;
type PredicateFn = dyn Fn(&Value) -> bool + Send + Sync;
type TransformFn = dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync;

// ------------------------------- Variants --------------------------------- //

#[derive(Clone, Debug)]
pub enum Schema {
    Object { fields: Shape },
    Array { element: Box<Schema>, checks: Vec<ArrayCheck> },
    Tuple { elements: Vec<Schema> },
    Record { value: Box<Schema> },
    Union { options: Vec<Schema> },
    Intersection { left: Box<Schema>, right: Box<Schema> },
    Optional { inner: Box<Schema> },
    Default { inner: Box<Schema>, provider: DefaultProvider },
    /// Refinement or transform; transparent for shape purposes.
    Effect { inner: Box<Schema>, effect: Effect },
    Boolean,
    Number { checks: Vec<NumberCheck> },
    String { checks: Vec<StringCheck> },
}

/// Where a `Default` wrapper gets its value from.
#[derive(Clone)]
pub enum DefaultProvider {
    Value(Value),
    Fn(Arc<ProviderFn>),
}

impl DefaultProvider {
    pub fn get(&self) -> anyhow::Result<Value> {
        match self {
            DefaultProvider::Value(v) => Ok(v.clone()),
            DefaultProvider::Fn(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultProvider::Value(v) => f.debug_tuple("Value").field(v).finish(),
            DefaultProvider::Fn(_) => f.write_str("Fn(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Effect {
    Refine(Refinement),
    Transform(Transform),
}

/// A whole-value predicate with the message (and optional issue path) it
/// reports on failure. An empty `path` reports at the refined value itself,
/// which for a top-level object makes it a form-level error.
#[derive(Clone, Debug)]
pub struct Refinement {
    pub rule: Rule,
    pub message: String,
    pub path: Vec<PathSegment>,
}

#[derive(Clone)]
pub enum Rule {
    Predicate(Arc<PredicateFn>),
    /// Both named fields of an object hold equal values (absent == absent).
    FieldsEqual(String, String),
    /// The value is exactly `true`.
    IsTrue,
}

impl Rule {
    pub fn holds(&self, value: &Value) -> bool {
        match self {
            Rule::Predicate(f) => f(value),
            Rule::FieldsEqual(a, b) => value.get(a) == value.get(b),
            Rule::IsTrue => value == &Value::Bool(true),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Predicate(_) => f.write_str("Predicate(..)"),
            Rule::FieldsEqual(a, b) => f.debug_tuple("FieldsEqual").field(a).field(b).finish(),
            Rule::IsTrue => f.write_str("IsTrue"),
        }
    }
}

#[derive(Clone)]
pub struct Transform(pub Arc<TransformFn>);

impl Transform {
    pub fn apply(&self, value: Value) -> anyhow::Result<Value> { (self.0)(value) }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Transform(..)") }
}

// ------------------------------ Constructors ------------------------------ //

impl Schema {
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Schema)>,
        K: Into<String>,
    {
        Schema::Object { fields: fields.into_iter().map(|(k, s)| (k.into(), s)).collect() }
    }
    pub fn array(element: Schema) -> Self {
        Schema::Array { element: Box::new(element), checks: Vec::new() }
    }
    pub fn tuple(elements: impl IntoIterator<Item = Schema>) -> Self {
        Schema::Tuple { elements: elements.into_iter().collect() }
    }
    pub fn record(value: Schema) -> Self { Schema::Record { value: Box::new(value) } }
    pub fn union(options: impl IntoIterator<Item = Schema>) -> Self {
        Schema::Union { options: options.into_iter().collect() }
    }
    pub fn boolean() -> Self { Schema::Boolean }
    pub fn number() -> Self { Schema::Number { checks: Vec::new() } }
    pub fn string() -> Self { Schema::String { checks: Vec::new() } }

    // --- wrappers ---

    pub fn optional(self) -> Self { Schema::Optional { inner: Box::new(self) } }

    pub fn default(self, value: Value) -> Self {
        Schema::Default { inner: Box::new(self), provider: DefaultProvider::Value(value) }
    }

    pub fn default_with<F>(self, provider: F) -> Self
    where
        F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Schema::Default { inner: Box::new(self), provider: DefaultProvider::Fn(Arc::new(provider)) }
    }

    pub fn and(self, right: Schema) -> Self {
        Schema::Intersection { left: Box::new(self), right: Box::new(right) }
    }

    pub fn refine<F>(self, predicate: F, message: impl Into<String>) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.refine_rule(Rule::Predicate(Arc::new(predicate)), message, Vec::new())
    }

    /// Like [`Schema::refine`], but reports the issue at `path` relative to
    /// the refined value (e.g. pin a cross-field check onto one field).
    pub fn refine_at<F, P, S>(self, predicate: F, message: impl Into<String>, path: P) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
        P: IntoIterator<Item = S>,
        S: Into<PathSegment>,
    {
        let path = path.into_iter().map(Into::into).collect();
        self.refine_rule(Rule::Predicate(Arc::new(predicate)), message, path)
    }

    pub fn refine_rule(self, rule: Rule, message: impl Into<String>, path: Vec<PathSegment>) -> Self {
        Schema::Effect {
            inner: Box::new(self),
            effect: Effect::Refine(Refinement { rule, message: message.into(), path }),
        }
    }

    pub fn transform<F>(self, f: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Schema::Effect { inner: Box::new(self), effect: Effect::Transform(Transform(Arc::new(f))) }
    }

    // --- checks ---

    /// Lower bound: string length, number value or array length.
    pub fn min<N: Into<f64>>(self, n: N) -> Self {
        let n = n.into();
        self.push_check("min", StringRule::Min(n as usize), NumberRule::Min(n), ArrayRule::Min(n as usize))
    }

    /// Upper bound: string length, number value or array length.
    pub fn max<N: Into<f64>>(self, n: N) -> Self {
        let n = n.into();
        self.push_check("max", StringRule::Max(n as usize), NumberRule::Max(n), ArrayRule::Max(n as usize))
    }

    pub fn length(self, n: usize) -> Self { self.with_string_rule("length", StringRule::Length(n)) }
    pub fn email(self) -> Self { self.with_string_rule("email", StringRule::Email) }
    pub fn regex(self, pattern: Regex) -> Self { self.with_string_rule("regex", StringRule::Regex(pattern)) }
    pub fn int(self) -> Self { self.with_number_rule("int", NumberRule::Int) }
    pub fn positive(self) -> Self { self.with_number_rule("positive", NumberRule::Positive) }
    pub fn nonempty(self) -> Self { self.with_array_rule("nonempty", ArrayRule::Min(1)) }

    /// Replace the message of the most recently added check.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        let message = Some(message.into());
        let slot = match &mut self {
            Schema::String { checks } => checks.last_mut().map(|c| &mut c.message),
            Schema::Number { checks } => checks.last_mut().map(|c| &mut c.message),
            Schema::Array { checks, .. } => checks.last_mut().map(|c| &mut c.message),
            _ => None,
        };
        match slot {
            Some(slot) => *slot = message,
            None => tracing::warn!(kind = self.kind(), "message(): no check to attach a message to"),
        }
        self
    }

    fn push_check(self, name: &str, s: StringRule, n: NumberRule, a: ArrayRule) -> Self {
        match self {
            Schema::String { .. } => self.with_string_rule(name, s),
            Schema::Number { .. } => self.with_number_rule(name, n),
            Schema::Array { .. } => self.with_array_rule(name, a),
            other => {
                tracing::warn!(check = name, kind = other.kind(), "size check on a schema without a size ignored");
                other
            }
        }
    }

    fn with_string_rule(mut self, name: &str, rule: StringRule) -> Self {
        match &mut self {
            Schema::String { checks } => checks.push(Check::new(rule)),
            other => tracing::warn!(check = name, kind = other.kind(), "string check on non-string schema ignored"),
        }
        self
    }

    fn with_number_rule(mut self, name: &str, rule: NumberRule) -> Self {
        match &mut self {
            Schema::Number { checks } => checks.push(Check::new(rule)),
            other => tracing::warn!(check = name, kind = other.kind(), "number check on non-number schema ignored"),
        }
        self
    }

    fn with_array_rule(mut self, name: &str, rule: ArrayRule) -> Self {
        match &mut self {
            Schema::Array { checks, .. } => checks.push(Check::new(rule)),
            other => tracing::warn!(check = name, kind = other.kind(), "array check on non-array schema ignored"),
        }
        self
    }

    // --- introspection helpers ---

    /// Short variant name, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Schema::Object { .. } => "object",
            Schema::Array { .. } => "array",
            Schema::Tuple { .. } => "tuple",
            Schema::Record { .. } => "record",
            Schema::Union { .. } => "union",
            Schema::Intersection { .. } => "intersection",
            Schema::Optional { .. } => "optional",
            Schema::Default { .. } => "default",
            Schema::Effect { .. } => "effect",
            Schema::Boolean => "boolean",
            Schema::Number { .. } => "number",
            Schema::String { .. } => "string",
        }
    }

    /// Validate `input`, returning the parsed output (unknown object keys
    /// stripped, defaults filled in, transforms applied).
    pub fn parse(&self, input: &Value) -> Result<Value, ParseError> {
        Ok(self.parse_optional(Some(input))?.unwrap_or(Value::Null))
    }

    /// Same as [`Schema::parse`] but accepts an absent input; an absent
    /// output means the schema accepted "no value" (e.g. `optional`).
    pub fn parse_optional(&self, input: Option<&Value>) -> Result<Option<Value>, ParseError> {
        parse::run(self, input)
    }
}

// ------------------------------- Tests ------------------------------------ //
