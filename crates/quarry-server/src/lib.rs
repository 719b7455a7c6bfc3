//! Quarry Server - Analytics Dashboard over HTTP
//!
//! Password-gated web dashboard over one PostgreSQL schema. Serves an
//! embedded browser shell and a JSON API of page view models: database
//! overview, table browser, custom SQL and advanced analytics.
//!
//! Key Features:
//! - Credential check with plaintext, SHA-256 or Argon2 secrets
//! - Bearer-token sessions with per-session history and datasets
//! - Per-IP login rate limiting
//! - CSV, XLSX and JSON downloads
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod assets;
pub mod auth;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod pages;
pub mod router;
pub mod session;
pub mod state;

pub use auth::{AuthResponse, LoginRequest, SessionInfo};
pub use config::ServerConfig;
pub use router::create_router;
pub use session::{SessionContext, SessionStore};
pub use state::AppState;
