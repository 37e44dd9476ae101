//! Error types for relmap operations.

use std::fmt;

/// The primary error type for all relmap operations.
#[derive(Debug)]
pub enum Error {
    /// Configuration-time errors (invalid table, duplicate binding, ...).
    ///
    /// These are raised while building mappings and are always fail-fast:
    /// a misconfigured mapping is never handed back to the caller.
    Config(ConfigError),
    /// Value conversion errors (row value does not fit the property type).
    Type(TypeError),
    /// Structural misuse of a mapping at runtime (e.g. asking a flat
    /// collection mapping for its per-property column export).
    Unsupported(UnsupportedError),
}

/// A configuration-time error.
#[derive(Debug)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
}

/// The category of configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// Table declared without any primary-key column.
    MissingPrimaryKey,
    /// Identifier column absent from the table or not part of its key.
    MissingIdentifier,
    /// Same column registered twice on one table.
    DuplicateColumn,
    /// Same column bound to more than one property.
    DuplicateBinding,
    /// A constructor-supplied property whose column the bean factory does
    /// not consume: the property would silently never be populated.
    UnbackedConstructorBinding,
    /// Anything else rejected at build time.
    Invalid,
}

/// A value conversion error.
#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

/// A structurally unsupported operation.
#[derive(Debug)]
pub struct UnsupportedError {
    pub operation: &'static str,
    pub detail: String,
}

impl Error {
    /// Build a configuration error.
    pub fn config(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            kind,
            message: message.into(),
        })
    }

    /// Build an unsupported-operation error.
    pub fn unsupported(operation: &'static str, detail: impl Into<String>) -> Self {
        Error::Unsupported(UnsupportedError {
            operation,
            detail: detail.into(),
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "configuration error: {}", e),
            Error::Type(e) => write!(f, "type error: {}", e),
            Error::Unsupported(e) => write!(f, "unsupported operation: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(col) => write!(
                f,
                "expected {} but got {} (column '{}')",
                self.expected, self.actual, col
            ),
            None => write!(f, "expected {} but got {}", self.expected, self.actual),
        }
    }
}

impl fmt::Display for UnsupportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.detail)
    }
}

impl std::error::Error for Error {}
impl std::error::Error for ConfigError {}
impl std::error::Error for TypeError {}
impl std::error::Error for UnsupportedError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<TypeError> for Error {
    fn from(e: TypeError) -> Self {
        Error::Type(e)
    }
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;
