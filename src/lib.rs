//! Reactive, schema-driven forms.
//!
//! A [`Schema`] describes the data; [`FormEngine`] derives defaults from it,
//! mirrors the value tree into a form tree of `{value, error}` leaves held in
//! host-provided reactive cells, and keeps those cells in sync as fields are
//! assigned, validated and cleared.
pub mod cli;
pub mod document;
pub mod engine;
pub mod error;
pub mod form_tree;
pub mod introspect;
pub mod reactive;
pub mod schema;

pub use engine::{FieldPath, FormEngine, FormOptions};
pub use error::FormError;
pub use form_tree::{FormField, FormFields, FormTree};
pub use introspect::{default_for_field, default_object};
pub use reactive::{LocalHost, ReactiveHost, Signal};
pub use schema::Schema;
