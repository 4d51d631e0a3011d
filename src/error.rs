use thiserror::Error;

/// Failures the form engine raises to its caller. Validation failures are
/// not among them: they end up in the reactive state instead.
#[derive(Debug, Error)]
pub enum FormError {
    /// A path segment exists neither in the live form nor (as an optional
    /// field) in the schema.
    #[error("failed to assign form field \"{path}\"")]
    PathResolution { path: String },

    #[error("form field \"{path}\" is a nested form, not a value field")]
    NotAField { path: String },

    #[error("failed to derive schema defaults: {0:#}")]
    Defaults(anyhow::Error),

    /// Anything from the schema engine that is not a validation failure.
    #[error(transparent)]
    Engine(anyhow::Error),
}
