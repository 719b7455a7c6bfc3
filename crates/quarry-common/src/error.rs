//! Quarry Error - Unified Error Types
//!
//! Error handling for all dashboard operations. Categorizes errors by where
//! they originate (configuration, connection, query, identifier validation,
//! export) so callers can decide whether to degrade a widget or block a page.
//!
//! Key Features:
//! - Domain-specific error variants for precise error handling
//! - Stable machine-readable codes for API error bodies
//! - Seamless integration with std::io::Error
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Unified error type for all Quarry operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuarryError {
    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("connection error: {0}")]
    Connection(String),

    #[error("{0}")]
    Query(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("read-only mode: only SELECT statements are allowed")]
    ReadOnly,

    // Export errors
    #[error("export error: {0}")]
    Export(String),

    // Request errors
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    // IO errors
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for QuarryError {
    fn from(err: std::io::Error) -> Self {
        QuarryError::Io(err.to_string())
    }
}

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for Quarry operations.
pub type Result<T> = std::result::Result<T, QuarryError>;

// =============================================================================
// Error Codes
// =============================================================================

impl QuarryError {
    /// Stable machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            QuarryError::Configuration(_) => "CONFIGURATION_ERROR",
            QuarryError::Connection(_) => "CONNECTION_ERROR",
            QuarryError::Query(_) => "QUERY_ERROR",
            QuarryError::UnknownTable(_) => "UNKNOWN_TABLE",
            QuarryError::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            QuarryError::ReadOnly => "READ_ONLY",
            QuarryError::Export(_) => "EXPORT_ERROR",
            QuarryError::NotFound(_) => "NOT_FOUND",
            QuarryError::BadRequest(_) => "BAD_REQUEST",
            QuarryError::Unauthorized => "UNAUTHORIZED",
            QuarryError::Io(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_shows_driver_text_verbatim() {
        let err = QuarryError::Query("division by zero".to_string());
        assert_eq!(err.to_string(), "division by zero");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "secrets.toml");
        let err: QuarryError = io.into();
        assert_eq!(err.code(), "IO_ERROR");
    }
}
