//! Error types for the diff and SQL-generation pipeline.

/// Errors that can occur while diffing models or generating SQL.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// A required argument was missing, or an identifier was empty.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A pairing or operation references an object that does not exist
    /// in the source or target database model.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The SQL generator encountered an operation or expression it
    /// cannot render.
    #[error("unhandled operation: {0}")]
    UnhandledOperation(String),

    /// The selected dialect does not implement the requested operation.
    #[error("the {dialect} dialect does not support {operation}")]
    UnsupportedDialect {
        /// Dialect name.
        dialect: &'static str,
        /// The operation the dialect cannot render.
        operation: &'static str,
    },
}

/// Result type for diff and generation operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
