//! JSON schema documents → `Schema`.
//!
//! ```json
//! { "type": "object", "fields": {
//!     "username": { "type": "string", "min": 3 },
//!     "age":      { "type": "number", "min": 18, "messages": { "min": "User is too young" } },
//!     "bio":      { "type": "optional", "inner": { "type": "string" } }
//! } }
//! ```
//!
//! Closure refinements and transforms have no document form; cross-field
//! equality and "must be true" do (`{"type": "refine", "rule": ...}`).
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::schema::{PathSegment, Rule, Schema};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read schema document '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("at JSON path {path} → {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

// ------------------------------- Document --------------------------------- //

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaDoc {
    Object {
        #[serde(default)]
        fields: IndexMap<String, SchemaDoc>,
    },
    Array {
        element: Box<SchemaDoc>,
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
        #[serde(default)]
        nonempty: bool,
        #[serde(default)]
        messages: Messages,
    },
    Tuple {
        elements: Vec<SchemaDoc>,
    },
    Record {
        value: Box<SchemaDoc>,
    },
    Union {
        options: Vec<SchemaDoc>,
    },
    Intersection {
        left: Box<SchemaDoc>,
        right: Box<SchemaDoc>,
    },
    Optional {
        inner: Box<SchemaDoc>,
    },
    Default {
        inner: Box<SchemaDoc>,
        value: Value,
    },
    Refine {
        inner: Box<SchemaDoc>,
        rule: RuleDoc,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        path: Vec<String>,
    },
    Boolean,
    Number {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        #[serde(default)]
        int: bool,
        #[serde(default)]
        positive: bool,
        #[serde(default)]
        messages: Messages,
    },
    String {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
        #[serde(default)]
        length: Option<usize>,
        #[serde(default)]
        email: bool,
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default)]
        messages: Messages,
    },
}

/// Check name (`"min"`, `"email"`, ...) → custom message.
pub type Messages = IndexMap<String, String>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDoc {
    FieldsEqual([String; 2]),
    IsTrue,
}

// ------------------------------- Loading ---------------------------------- //

/// Deserialize with JSON-path context in error messages.
pub fn from_str(src: &str) -> Result<Schema, DocumentError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    let doc: SchemaDoc = serde_path_to_error::deserialize(de).map_err(|err| DocumentError::Parse {
        path: err.path().to_string(),
        source: err.into_inner(),
    })?;
    doc.into_schema()
}

pub fn load(path: &Path) -> Result<Schema, DocumentError> {
    let src = std::fs::read_to_string(path).map_err(|source| DocumentError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    from_str(&src)
}

impl SchemaDoc {
    pub fn into_schema(self) -> Result<Schema, DocumentError> {
        let schema = match self {
            SchemaDoc::Object { fields } => {
                let mut out = Vec::with_capacity(fields.len());
                for (name, doc) in fields {
                    out.push((name, doc.into_schema()?));
                }
                Schema::object(out)
            }
            SchemaDoc::Array { element, min, max, nonempty, messages } => {
                let mut s = Schema::array(element.into_schema()?);
                if let Some(n) = min { s = with_message(s.min(n as f64), &messages, "min"); }
                if let Some(n) = max { s = with_message(s.max(n as f64), &messages, "max"); }
                if nonempty { s = with_message(s.nonempty(), &messages, "nonempty"); }
                s
            }
            SchemaDoc::Tuple { elements } => {
                Schema::tuple(elements.into_iter().map(SchemaDoc::into_schema).collect::<Result<Vec<_>, _>>()?)
            }
            SchemaDoc::Record { value } => Schema::record(value.into_schema()?),
            SchemaDoc::Union { options } => {
                Schema::union(options.into_iter().map(SchemaDoc::into_schema).collect::<Result<Vec<_>, _>>()?)
            }
            SchemaDoc::Intersection { left, right } => left.into_schema()?.and(right.into_schema()?),
            SchemaDoc::Optional { inner } => inner.into_schema()?.optional(),
            SchemaDoc::Default { inner, value } => inner.into_schema()?.default(value),
            SchemaDoc::Refine { inner, rule, message, path } => {
                let rule = match rule {
                    RuleDoc::FieldsEqual([a, b]) => Rule::FieldsEqual(a, b),
                    RuleDoc::IsTrue => Rule::IsTrue,
                };
                let path = path.into_iter().map(PathSegment::Key).collect();
                inner.into_schema()?.refine_rule(rule, message.unwrap_or_else(|| "Invalid input".to_string()), path)
            }
            SchemaDoc::Boolean => Schema::boolean(),
            SchemaDoc::Number { min, max, int, positive, messages } => {
                let mut s = Schema::number();
                if let Some(n) = min { s = with_message(s.min(n), &messages, "min"); }
                if let Some(n) = max { s = with_message(s.max(n), &messages, "max"); }
                if int { s = with_message(s.int(), &messages, "int"); }
                if positive { s = with_message(s.positive(), &messages, "positive"); }
                s
            }
            SchemaDoc::String { min, max, length, email, pattern, messages } => {
                let mut s = Schema::string();
                if let Some(n) = min { s = with_message(s.min(n as f64), &messages, "min"); }
                if let Some(n) = max { s = with_message(s.max(n as f64), &messages, "max"); }
                if let Some(n) = length { s = with_message(s.length(n), &messages, "length"); }
                if email { s = with_message(s.email(), &messages, "email"); }
                if let Some(pattern) = pattern {
                    let rx = Regex::new(&pattern).map_err(|source| DocumentError::Pattern { pattern, source })?;
                    s = with_message(s.regex(rx), &messages, "pattern");
                }
                s
            }
        };
        Ok(schema)
    }
}

fn with_message(schema: Schema, messages: &Messages, check: &str) -> Schema {
    match messages.get(check) {
        Some(m) => schema.message(m.clone()),
        None => schema,
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::default_object;
    use serde_json::json;

    const USER: &str = r#"{
        "type": "object",
        "fields": {
            "username": { "type": "string", "min": 3 },
            "displayName": { "type": "optional", "inner": { "type": "string", "min": 3 } },
            "age": { "type": "number", "min": 18, "max": 99,
                     "messages": { "min": "User is too young", "max": "User is too old" } },
            "tags": { "type": "array", "element": { "type": "string" }, "nonempty": true },
            "role": { "type": "default", "inner": { "type": "string" }, "value": "member" }
        }
    }"#;

    #[test]
    fn loads_user_document() {
        let schema = from_str(USER).unwrap();
        assert_eq!(
            Value::Object(default_object(&schema).unwrap()),
            json!({"username": "", "age": 0, "tags": [], "role": "member"})
        );
        let err = schema.parse(&json!({"username": "abc", "age": 5, "tags": ["x"]})).unwrap_err();
        let crate::schema::ParseError::Invalid(failure) = err else { panic!("expected validation failure") };
        assert_eq!(failure.flatten().field_errors["age"], vec!["User is too young"]);
    }

    #[test]
    fn refine_document_reports_form_level_message() {
        let schema = from_str(r#"{
            "type": "refine",
            "inner": { "type": "object", "fields": {
                "password": { "type": "string" },
                "confirmPassword": { "type": "string" }
            } },
            "rule": { "fields_equal": ["password", "confirmPassword"] },
            "message": "confirm!"
        }"#).unwrap();
        let Err(crate::schema::ParseError::Invalid(failure)) =
            schema.parse(&json!({"password": "a", "confirmPassword": "b"}))
        else {
            panic!("expected validation failure")
        };
        assert_eq!(failure.flatten().form_errors, vec!["confirm!"]);
    }

    #[test]
    fn is_true_rule() {
        let schema = from_str(r#"{"type": "refine", "inner": {"type": "boolean"}, "rule": "is_true"}"#).unwrap();
        assert!(schema.parse(&json!(true)).is_ok());
        assert!(schema.parse(&json!(false)).is_err());
    }

    #[test]
    fn bad_document_is_a_parse_error() {
        let err = from_str(r#"{"type": "object", "fields": {"a": {"type": "strnig"}}}"#).unwrap_err();
        assert!(matches!(err, DocumentError::Parse { .. }));
        assert!(err.to_string().starts_with("at JSON path "));
        assert!(err.to_string().contains("strnig"), "{err}");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(from_str("{\"type\": "), Err(DocumentError::Parse { .. })));
    }

    #[test]
    fn bad_pattern_is_reported() {
        let err = from_str(r#"{"type": "string", "pattern": "("}"#).unwrap_err();
        assert!(matches!(err, DocumentError::Pattern { .. }));
    }
}
