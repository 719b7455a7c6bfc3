//! Quarry Common - Shared Types and Utilities
//!
//! Foundational types, error handling, and configuration used across all
//! Quarry dashboard components. Provides the tabular value model that flows
//! from the database layer through analytics into exports.
//!
//! Key Features:
//! - Unified error type with HTTP-facing classification
//! - Tabular result model (values, columns, result sets)
//! - Catalog descriptors (tables, columns, indexes, database stats)
//! - Configuration loading from TOML secrets files and environment variables
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use error::{QuarryError, Result};
pub use types::*;
