//! The form engine: schema + reactive cells + path-based mutation.
//!
//! Construction derives (or takes) the initial value tree, mirrors it into a
//! form tree, stores it in host cells and runs one validation pass whose
//! messages are then wiped, so `valid` reflects the starting data while no
//! error text is shown yet.
//!
//! Every public operation mutates a copy of the live tree in place and writes
//! it back once; observers see a single update per call. The engine is not
//! meant to be shared between concurrent callers.
pub mod path;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::FormError;
use crate::form_tree::{self, FormFields, FormTree};
use crate::introspect::default_object;
use crate::reactive::ReactiveHost;
use crate::schema::{ParseError, Schema, ValidationFailure};

pub use path::FieldPath;

// ------------------------------- Options ---------------------------------- //

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormOptions {
    /// Separator for textual paths (`"user.age"`).
    pub path_separator: char,
    /// Run the validate + clear-errors pass during construction.
    pub validate_on_init: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self { path_separator: '.', validate_on_init: true }
    }
}

// -------------------------------- Engine ---------------------------------- //

pub struct FormEngine<H: ReactiveHost> {
    host: H,
    schema: Arc<Schema>,
    options: FormOptions,
    form: H::Cell<FormFields>,
    valid: H::Cell<bool>,
    form_errors: H::Cell<Vec<String>>,
    initial_fields: FormFields,
}

impl<H: ReactiveHost> FormEngine<H> {
    pub fn new(
        host: H,
        schema: impl Into<Arc<Schema>>,
        initial_data: Option<Map<String, Value>>,
    ) -> Result<Self, FormError> {
        Self::with_options(host, schema, initial_data, FormOptions::default())
    }

    pub fn with_options(
        host: H,
        schema: impl Into<Arc<Schema>>,
        initial_data: Option<Map<String, Value>>,
        options: FormOptions,
    ) -> Result<Self, FormError> {
        let schema = schema.into();
        let initial_value = match initial_data {
            Some(data) => data,
            None => default_object(&schema).map_err(FormError::Defaults)?,
        };
        let initial_fields = form_tree::build(&initial_value, &schema);

        let valid = host.create(false);
        let form_errors = host.create(Vec::new());
        let form = host.create(initial_fields.clone());

        let engine = Self { host, schema, options, form, valid, form_errors, initial_fields };
        if engine.options.validate_on_init {
            engine.validate()?;
            engine.clear_errors();
        }
        Ok(engine)
    }

    // --- cells & accessors ---

    pub fn form(&self) -> &H::Cell<FormFields> { &self.form }
    pub fn valid(&self) -> &H::Cell<bool> { &self.valid }
    pub fn form_errors(&self) -> &H::Cell<Vec<String>> { &self.form_errors }
    pub fn schema(&self) -> &Schema { &self.schema }
    pub fn options(&self) -> &FormOptions { &self.options }

    pub fn fields(&self) -> FormFields { self.host.get(&self.form) }
    pub fn is_valid(&self) -> bool { self.host.get(&self.valid) }
    pub fn errors(&self) -> Vec<String> { self.host.get(&self.form_errors) }

    // --- operations ---

    /// Set the value of the leaf at `path`. Absent optional fields are
    /// created on the way; anything else missing is an error and leaves the
    /// form untouched.
    pub fn assign(&self, path: impl Into<FieldPath>, value: Value) -> Result<(), FormError> {
        let path = path.into();
        let shown = path.display(self.options.path_separator);
        let segments = path.segments(self.options.path_separator);

        let mut fields = self.host.get(&self.form);
        match path::resolve_mut(&mut fields, &self.schema, &segments, &shown)? {
            FormTree::Leaf(leaf) => leaf.value = Some(value),
            FormTree::Node(_) => return Err(FormError::NotAField { path: shown }),
        }
        trace!(path = %shown, "assigned");
        self.host.set(&self.form, fields);
        Ok(())
    }

    /// Node or leaf at `path`, without touching the form.
    pub fn get_field_by_path(&self, path: impl Into<FieldPath>) -> Result<FormTree, FormError> {
        let path = path.into();
        let shown = path.display(self.options.path_separator);
        let fields = self.host.get(&self.form);
        path::resolve(&fields, &path.segments(self.options.path_separator), &shown).cloned()
    }

    /// Back to the snapshot taken at construction (values and errors).
    pub fn clear(&self) {
        self.host.set(&self.form, self.initial_fields.clone());
    }

    /// Drop every field and form-level error message; `valid` is kept.
    pub fn clear_errors(&self) {
        self.host.set(&self.form_errors, Vec::new());
        let mut fields = self.host.get(&self.form);
        form_tree::clear_errors(&mut fields);
        self.host.set(&self.form, fields);
    }

    pub fn to_json(&self) -> Map<String, Value> {
        form_tree::to_json(&self.host.get(&self.form))
    }

    /// Validate the current values. Validation failures are absorbed into
    /// the form (first message per field, cross-field messages into
    /// `form_errors`) and reported as `Ok(false)`; any other schema failure
    /// marks the form invalid and is returned.
    pub fn validate(&self) -> Result<bool, FormError> {
        let mut fields = self.host.get(&self.form);
        form_tree::clear_errors(&mut fields);

        let (valid, form_errors, outcome) = match self.schema.parse(&Value::Object(form_tree::to_json(&fields))) {
            Ok(_) => {
                debug!("form valid");
                (true, Vec::new(), Ok(true))
            }
            Err(ParseError::Invalid(failure)) => {
                debug!(issues = failure.issues.len(), "form invalid");
                let form_errors = distribute(&mut fields, &failure);
                (false, form_errors, Ok(false))
            }
            Err(ParseError::Engine(e)) => (false, Vec::new(), Err(FormError::Engine(e))),
        };
        self.host.set(&self.form, fields);
        self.host.set(&self.form_errors, form_errors);
        self.host.set(&self.valid, valid);
        outcome
    }
}

/// Spread field messages over the (freshly cleared) tree and return the
/// form-level ones. Only the first message reaching a leaf sticks; an issue
/// on a nested form as a whole (e.g. its refinement) goes to its first leaf.
fn distribute(fields: &mut FormFields, failure: &ValidationFailure) -> Vec<String> {
    let flat = failure.flatten();
    for (name, messages) in &flat.field_errors {
        match fields.get_mut(name.as_str()) {
            Some(FormTree::Leaf(leaf)) => leaf.error = messages.first().cloned().unwrap_or_default(),
            Some(FormTree::Node(children)) => {
                let nested = failure
                    .issues
                    .iter()
                    .filter(|i| i.path.first().is_some_and(|head| head.to_string() == *name));
                for issue in nested {
                    match form_tree::deepest_leaf_mut(children, &issue.path[1..]) {
                        Some(leaf) if leaf.error.is_empty() => leaf.error = issue.message.clone(),
                        Some(_) => {}
                        None => debug!(field = %name, message = %issue.message, "no leaf for nested issue"),
                    }
                }
            }
            None => debug!(field = %name, "validation message for a field not in the form"),
        }
    }
    flat.form_errors
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form_tree::FormField;
    use crate::reactive::LocalHost;
    use crate::schema::Rule;
    use serde_json::json;

    type Engine = FormEngine<LocalHost>;

    fn data(v: Value) -> Option<Map<String, Value>> {
        match v {
            Value::Object(m) => Some(m),
            other => panic!("expected object, got {other}"),
        }
    }

    fn user_schema() -> Schema {
        Schema::object([
            ("username", Schema::string().min(3)),
            ("displayName", Schema::string().min(3).optional()),
            ("age", Schema::number().min(18).message("User is too young").max(99).message("User is too old")),
        ])
    }

    fn user_schema_valid() -> Schema {
        Schema::object([
            ("username", Schema::string().min(3).default(json!("John"))),
            ("displayName", Schema::string().min(3).default(json!("John"))),
            ("age", Schema::number().min(18).max(99).default(json!(36))),
        ])
    }

    fn json_form(engine: &Engine) -> Value { serde_json::to_value(engine.fields()).unwrap() }

    // --- construction ---

    #[test]
    fn empty_schema_is_valid() {
        let e = Engine::new(LocalHost, Schema::Object { fields: Default::default() }, None).unwrap();
        assert!(e.is_valid());
    }

    #[test]
    fn schema_valid_with_its_defaults_starts_valid() {
        assert!(Engine::new(LocalHost, user_schema_valid(), None).unwrap().is_valid());
    }

    #[test]
    fn defaults_mixed_with_bare_optionals_start_valid() {
        let s = Schema::object([
            ("a", Schema::string().min(3).optional()),
            ("b", Schema::number().default(json!(1))),
            ("c", Schema::boolean().optional()),
        ]);
        let e = Engine::new(LocalHost, s, None).unwrap();
        assert!(e.is_valid());
        assert_eq!(json_form(&e), json!({"b": {"value": 1, "error": ""}}));
    }

    #[test]
    fn defaults_that_fail_start_invalid_without_error_text() {
        let e = Engine::new(LocalHost, user_schema(), None).unwrap();
        assert!(!e.is_valid());
        assert_eq!(
            json_form(&e),
            json!({"username": {"value": "", "error": ""}, "age": {"value": 0, "error": ""}})
        );
        assert!(e.errors().is_empty());
    }

    #[test]
    fn initial_data_decides_initial_validity() {
        let bad = Engine::new(LocalHost, user_schema(), data(json!({"username": "a", "age": 2}))).unwrap();
        assert!(!bad.is_valid());
        let good = Engine::new(LocalHost, user_schema(), data(json!({"username": "aaa", "age": 20}))).unwrap();
        assert!(good.is_valid());
        let bad_optional = Engine::new(
            LocalHost,
            user_schema(),
            data(json!({"username": "John", "displayName": "", "age": 20})),
        )
        .unwrap();
        assert!(!bad_optional.is_valid());
        let good_optional = Engine::new(
            LocalHost,
            user_schema(),
            data(json!({"username": "John", "displayName": "John", "age": 20})),
        )
        .unwrap();
        assert!(good_optional.is_valid());
    }

    #[test]
    fn failing_default_provider_is_a_construction_error() {
        let s = Schema::object([("n", Schema::number().default_with(|| anyhow::bail!("no source")))]);
        assert!(matches!(Engine::new(LocalHost, s, None), Err(FormError::Defaults(_))));
    }

    #[test]
    fn validate_on_init_can_be_skipped() {
        let opts = FormOptions { validate_on_init: false, ..FormOptions::default() };
        let e = Engine::with_options(LocalHost, user_schema_valid(), None, opts).unwrap();
        assert!(!e.is_valid());
        assert!(e.validate().unwrap());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: FormOptions = serde_json::from_value(json!({"pathSeparator": "/"})).unwrap();
        assert_eq!(opts, FormOptions { path_separator: '/', validate_on_init: true });
    }

    // --- field kinds ---

    #[test]
    fn boolean_field() {
        let s = Schema::object([("valid", Schema::boolean().refine_rule(Rule::IsTrue, "Must be valid", vec![]))]);
        let e = Engine::new(LocalHost, s, None).unwrap();
        assert_eq!(json_form(&e), json!({"valid": {"value": false, "error": ""}}));
        assert!(!e.is_valid());
        e.assign("valid", json!(true)).unwrap();
        assert!(e.validate().unwrap());
        assert_eq!(json_form(&e), json!({"valid": {"value": true, "error": ""}}));
    }

    #[test]
    fn array_field() {
        let e = Engine::new(LocalHost, Schema::object([("tags", Schema::array(Schema::string()).min(3))]), None).unwrap();
        assert_eq!(json_form(&e), json!({"tags": {"value": [], "error": ""}}));
        assert!(!e.is_valid());
        e.assign("tags", json!(["a", "b", "c"])).unwrap();
        assert!(e.validate().unwrap());
    }

    #[test]
    fn tuple_field() {
        let s = Schema::object([(
            "signal",
            Schema::tuple([Schema::string(), Schema::boolean(), Schema::number().min(1)]),
        )]);
        let e = Engine::new(LocalHost, s, None).unwrap();
        assert_eq!(json_form(&e), json!({"signal": {"value": ["", false, 0], "error": ""}}));
        assert!(!e.is_valid());
        e.assign("signal", json!(["", false, 2])).unwrap();
        assert!(e.validate().unwrap());
    }

    #[test]
    fn nested_object_field() {
        let s = Schema::object([(
            "user",
            Schema::object([("name", Schema::string().min(1)), ("age", Schema::number().min(1))]),
        )]);
        let e = Engine::new(LocalHost, s, None).unwrap();
        assert_eq!(
            json_form(&e),
            json!({"user": {"name": {"value": "", "error": ""}, "age": {"value": 0, "error": ""}}})
        );
        assert!(!e.is_valid());

        e.assign("user.name", json!("a")).unwrap();
        e.assign(["user", "age"], json!(1)).unwrap();
        assert!(e.validate().unwrap());
        assert_eq!(
            json_form(&e),
            json!({"user": {"name": {"value": "a", "error": ""}, "age": {"value": 1, "error": ""}}})
        );
    }

    #[test]
    fn nested_assign_touches_only_the_target() {
        let s = Schema::object([("user", Schema::object([("name", Schema::string()), ("age", Schema::number())]))]);
        let e = Engine::new(LocalHost, s, data(json!({"user": {"name": "Ann", "age": 30}}))).unwrap();
        e.assign("user.age", json!(1)).unwrap();
        assert_eq!(e.to_json(), data(json!({"user": {"name": "Ann", "age": 1}})).unwrap());
    }

    // --- optional fields ---

    fn post_schema() -> Schema {
        Schema::object([
            ("title", Schema::string().min(3)),
            ("slug", Schema::string().min(3).message("3!").optional()),
        ])
    }

    #[test]
    fn missing_optional_field_is_fine() {
        let e = Engine::new(LocalHost, post_schema(), None).unwrap();
        assert_eq!(json_form(&e), json!({"title": {"value": "", "error": ""}}));
        e.assign("title", json!("Hello")).unwrap();
        assert!(e.validate().unwrap());
    }

    #[test]
    fn optional_field_is_materialized_on_assign() {
        let e = Engine::new(LocalHost, post_schema(), None).unwrap();
        e.assign("title", json!("yes")).unwrap();
        e.assign("slug", json!("yes")).unwrap();
        assert!(e.validate().unwrap());
        assert_eq!(
            e.get_field_by_path("slug").unwrap(),
            FormTree::Leaf(FormField::new(json!("yes")))
        );
    }

    #[test]
    fn invalid_optional_field_gets_its_message() {
        let e = Engine::new(LocalHost, post_schema(), None).unwrap();
        e.assign("title", json!("Hello")).unwrap();
        e.assign("slug", json!("no")).unwrap();
        assert!(!e.validate().unwrap());
        assert_eq!(
            json_form(&e),
            json!({"title": {"value": "Hello", "error": ""}, "slug": {"value": "no", "error": "3!"}})
        );
        assert!(!e.is_valid());
    }

    #[test]
    fn undeclared_path_fails_and_leaves_form_untouched() {
        let e = Engine::new(LocalHost, post_schema(), None).unwrap();
        let before = e.fields();
        let version = e.form().version();
        let err = e.assign("nope.deeper", json!(1)).unwrap_err();
        assert!(matches!(err, FormError::PathResolution { ref path } if path == "nope.deeper"));
        assert_eq!(e.fields(), before);
        assert_eq!(e.form().version(), version);
    }

    #[test]
    fn assigning_to_a_node_is_rejected() {
        let s = Schema::object([("user", Schema::object([("name", Schema::string())]))]);
        let e = Engine::new(LocalHost, s, None).unwrap();
        assert!(matches!(e.assign("user", json!({})), Err(FormError::NotAField { .. })));
    }

    // --- validation ---

    #[test]
    fn cross_field_refinement_fills_form_errors() {
        let s = Schema::object([
            ("password", Schema::string().min(3).message("3!")),
            ("confirmPassword", Schema::string().min(3).message("3!")),
        ])
        .refine(|v| v["password"] == v["confirmPassword"], "confirm!");
        let e = Engine::new(LocalHost, s, None).unwrap();
        assert!(!e.is_valid());

        e.assign("password", json!("123")).unwrap();
        e.assign("confirmPassword", json!("321")).unwrap();
        assert!(!e.validate().unwrap());
        assert_eq!(e.errors(), vec!["confirm!"]);
        assert!(!e.is_valid());

        e.assign("confirmPassword", json!("123")).unwrap();
        assert!(e.validate().unwrap());
        assert!(e.errors().is_empty());
        assert!(e.is_valid());
    }

    #[test]
    fn only_first_message_per_field() {
        let s = Schema::object([("code", Schema::string().min(5).message("too short").email().message("not an email"))]);
        let e = Engine::new(LocalHost, s, data(json!({"code": "ab"}))).unwrap();
        e.validate().unwrap();
        assert_eq!(e.get_field_by_path("code").unwrap().as_leaf().unwrap().error, "too short");
    }

    #[test]
    fn stale_errors_do_not_survive_a_new_run() {
        let e = Engine::new(LocalHost, user_schema(), None).unwrap();
        assert!(!e.validate().unwrap());
        assert_ne!(e.get_field_by_path("username").unwrap().as_leaf().unwrap().error, "");
        e.assign("username", json!("long enough")).unwrap();
        e.validate().unwrap();
        assert_eq!(e.get_field_by_path("username").unwrap().as_leaf().unwrap().error, "");
        assert_eq!(e.get_field_by_path("age").unwrap().as_leaf().unwrap().error, "User is too young");
    }

    #[test]
    fn nested_messages_land_on_nested_leaves() {
        let s = Schema::object([(
            "user",
            Schema::object([("name", Schema::string().min(2)), ("age", Schema::number().min(18).message("adult"))]),
        )]);
        let e = Engine::new(LocalHost, s, data(json!({"user": {"name": "Bo", "age": 3}}))).unwrap();
        assert!(!e.validate().unwrap());
        let user = e.get_field_by_path("user").unwrap();
        let user = user.as_node().unwrap();
        assert_eq!(user["age"].as_leaf().unwrap().error, "adult");
        assert_eq!(user["name"].as_leaf().unwrap().error, "");
    }

    #[test]
    fn engine_failures_are_raised_and_mark_invalid() {
        let s = Schema::object([("n", Schema::number())]).transform(|v| {
            if v["n"] == json!(13) { anyhow::bail!("unlucky") } else { Ok(v) }
        });
        let e = Engine::new(LocalHost, s, None).unwrap();
        assert!(e.is_valid());
        e.assign("n", json!(13)).unwrap();
        assert!(matches!(e.validate(), Err(FormError::Engine(_))));
        assert!(!e.is_valid());
    }

    #[test]
    fn refinement_on_nested_form_reaches_its_first_leaf() {
        let s = Schema::object([(
            "user",
            Schema::object([("pw", Schema::string()), ("confirm", Schema::string())])
                .refine(|v| v["pw"] == v["confirm"], "mismatch"),
        )]);
        let e = Engine::new(LocalHost, s, None).unwrap();
        assert!(e.is_valid());
        e.assign("user.pw", json!("a")).unwrap();
        assert!(!e.validate().unwrap());
        assert!(e.errors().is_empty());
        assert_eq!(
            json_form(&e),
            json!({"user": {
                "pw": {"value": "a", "error": "mismatch"},
                "confirm": {"value": "", "error": ""},
            }})
        );
    }

    #[test]
    fn refine_at_nested_form_path_is_shown() {
        let s = Schema::object([("user", Schema::object([("name", Schema::string())]))])
            .refine_at(|v| v["user"]["name"] != json!("root"), "reserved", ["user"]);
        let e = Engine::new(LocalHost, s, data(json!({"user": {"name": "root"}}))).unwrap();
        assert!(!e.validate().unwrap());
        let user = e.get_field_by_path("user").unwrap();
        assert_eq!(user.as_node().unwrap()["name"].as_leaf().unwrap().error, "reserved");
    }

    // --- clearing ---

    #[test]
    fn clear_errors_is_idempotent_and_keeps_validity() {
        let e = Engine::new(LocalHost, user_schema(), None).unwrap();
        e.validate().unwrap();
        e.clear_errors();
        let once = (e.fields(), e.errors(), e.is_valid());
        e.clear_errors();
        assert_eq!((e.fields(), e.errors(), e.is_valid()), once);
        assert!(!e.is_valid());
    }

    #[test]
    fn clear_restores_initial_snapshot() {
        let e = Engine::new(LocalHost, post_schema(), None).unwrap();
        let initial = e.fields();
        e.assign("title", json!("changed")).unwrap();
        e.assign("slug", json!("x")).unwrap();
        e.validate().unwrap();
        e.clear();
        assert_eq!(e.fields(), initial);
    }

    // --- reactivity ---

    #[test]
    fn one_write_per_operation() {
        let e = Engine::new(LocalHost, post_schema(), None).unwrap();
        let v0 = e.form().version();
        let valid0 = e.valid().version();
        let errors0 = e.form_errors().version();

        e.assign("title", json!("abc")).unwrap();
        assert_eq!(e.form().version(), v0 + 1);
        assert!(e.validate().unwrap());
        assert_eq!(e.form().version(), v0 + 2);
        assert_eq!(e.valid().version(), valid0 + 1);
        assert_eq!(e.form_errors().version(), errors0 + 1);

        e.clear();
        assert_eq!(e.form().version(), v0 + 3);
        assert!(!e.validate().unwrap());
        assert_eq!(e.form().version(), v0 + 4);
        assert_eq!(e.valid().version(), valid0 + 2);
        assert_eq!(e.form_errors().version(), errors0 + 2);

        e.clear_errors();
        assert_eq!(e.form().version(), v0 + 5);
        assert_eq!(e.valid().version(), valid0 + 2);
    }

    #[test]
    fn subscribers_see_assignments() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let e = Engine::new(LocalHost, post_schema(), None).unwrap();
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        e.form().subscribe(move |f: &FormFields| {
            *sink.borrow_mut() = f["title"].as_leaf().and_then(|l| l.value.clone());
        });
        e.assign("title", json!("live")).unwrap();
        assert_eq!(*seen.borrow(), Some(json!("live")));
    }

    #[test]
    fn custom_path_separator() {
        let s = Schema::object([("user", Schema::object([("name", Schema::string())]))]);
        let opts = FormOptions { path_separator: '/', ..FormOptions::default() };
        let e = Engine::with_options(LocalHost, s, None, opts).unwrap();
        e.assign("user/name", json!("x")).unwrap();
        assert_eq!(e.to_json(), data(json!({"user": {"name": "x"}})).unwrap());
    }
}
