//! Error types with fix suggestions
//!
//! Codes are grouped by the phase that raises them:
//! - BIND-01x: templates and arguments
//! - BIND-02x: registration (configuration, shapes, converters, rule sets)
//! - BIND-03x: invocation (binding data, invariants, replay)
//! - BIND-04x: backend, runtime and config files

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Failure reported by a storage backend through the capability interface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("resource '{resource}' not found")]
    NotFound { resource: String },

    #[error("resource '{resource}' already exists")]
    Conflict { resource: String },

    #[error("transient backend failure: {0}")]
    Transient(String),

    #[error("backend failure: {0}")]
    Fatal(String),
}

impl BackendError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[derive(Error, Debug)]
pub enum BindError {
    // ─────────────────────────────────────────────────────────────
    // Templates and arguments (BIND-010 to BIND-012)
    // ─────────────────────────────────────────────────────────────
    #[error("BIND-010: Template parse error at position {position}: {details}")]
    TemplateParse { position: usize, details: String },

    #[error("BIND-011: Invalid argument '{name}': {reason}")]
    ArgumentInvalid { name: String, reason: String },

    #[error("BIND-012: '{operation}' is not supported for {target}")]
    NotSupported { operation: String, target: String },

    // ─────────────────────────────────────────────────────────────
    // Registration (BIND-020 to BIND-024)
    // ─────────────────────────────────────────────────────────────
    #[error("BIND-020: Missing configuration '{setting}': {reason}")]
    ConfigurationMissing { setting: String, reason: String },

    #[error("BIND-021: Parameter '{parameter}' of type '{param_type}' cannot be bound: {reason}")]
    InvalidParameterShape {
        parameter: String,
        param_type: String,
        reason: String,
    },

    #[error("BIND-022: No converter registered from '{from}' to '{to}'")]
    NoConverterFound {
        from: &'static str,
        to: &'static str,
    },

    #[error(
        "BIND-023: Rules '{first}' and '{second}' both claim fallback for attribute '{attribute}'"
    )]
    DuplicateFallback {
        attribute: &'static str,
        first: &'static str,
        second: &'static str,
    },

    #[error("BIND-024: No binding registry for attribute '{attribute}'")]
    UnknownAttribute { attribute: &'static str },

    // ─────────────────────────────────────────────────────────────
    // Invocation (BIND-030 to BIND-034)
    // ─────────────────────────────────────────────────────────────
    #[error("BIND-030: No value for '{{{token}}}' in binding data")]
    BindingDataMissing { token: String },

    #[error("BIND-031: Invariant violated: {details}")]
    InvariantViolation { details: String },

    #[error("BIND-032: Invalid invoke string: {details}")]
    InvalidInvokeString { details: String },

    #[error("BIND-033: Expected argument of type '{expected}', found '{actual}'")]
    TypeMismatch {
        actual: &'static str,
        expected: &'static str,
    },

    #[error("BIND-034: Function '{function}' failed: {source}")]
    FunctionFailed {
        function: String,
        #[source]
        source: anyhow::Error,
    },

    // ─────────────────────────────────────────────────────────────
    // Backend and runtime (BIND-040 to BIND-044)
    // ─────────────────────────────────────────────────────────────
    #[error("BIND-040: Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("BIND-041: Invocation cancelled")]
    Cancelled,

    #[error("BIND-042: YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("BIND-043: Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("BIND-044: IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BindError {
    /// True when the backend reported the target resource as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BindError::Backend(e) if e.is_not_found())
    }

    pub(crate) fn shape(
        parameter: impl Into<String>,
        param_type: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        BindError::InvalidParameterShape {
            parameter: parameter.into(),
            param_type: param_type.to_string(),
            reason: reason.into(),
        }
    }
}

impl FixSuggestion for BindError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            BindError::TemplateParse { .. } => {
                Some("Check template syntax: {name} or {name.field}, escape braces as {{ and }}")
            }
            BindError::ArgumentInvalid { .. } => Some("Provide a value for the named argument"),
            BindError::NotSupported { .. } => {
                Some("Use a field policy that supports this resolution")
            }
            BindError::ConfigurationMissing { .. } => {
                Some("Define the setting the attribute names, or set a binding option default")
            }
            BindError::InvalidParameterShape { .. } => {
                Some("Use a record with a string 'id' field, or set the table/collection name")
            }
            BindError::NoConverterFound { .. } => {
                Some("Register a converter with ConverterManager::add_converter before binding")
            }
            BindError::DuplicateFallback { .. } => {
                Some("Mark exactly one rule as fallback for each attribute kind")
            }
            BindError::UnknownAttribute { .. } => {
                Some("Register the extension for this attribute kind on the host")
            }
            BindError::BindingDataMissing { .. } => {
                Some("Ensure the trigger provides the token, or fix its spelling")
            }
            BindError::InvariantViolation { .. } => {
                Some("Do not change the 'id' of a bound record; write a new record instead")
            }
            BindError::InvalidInvokeString { .. } => {
                Some("Pass an invoke string produced by invoke_strings()")
            }
            BindError::TypeMismatch { .. } => {
                Some("Read the argument with the type declared at registration")
            }
            BindError::FunctionFailed { .. } => None,
            BindError::Backend(_) => Some("Check backend availability and credentials"),
            BindError::Cancelled => None,
            BindError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            BindError::Serialization(_) => {
                Some("Ensure the record type round-trips through JSON")
            }
            BindError::Io(_) => Some("Check file path and permissions"),
        }
    }
}
