//! Quarry Config - Configuration Structures
//!
//! Configuration types for the dashboard. Values are layered: built-in
//! defaults, then an optional TOML secrets file, then environment variables.
//! Command-line flags are applied on top by the server binary.
//!
//! Key Features:
//! - Database connection settings (host, port, credentials, schema)
//! - Application login credentials (plaintext, SHA-256 or Argon2 secret)
//! - Dashboard tuning (read-only mode, cache TTLs, highlight table)
//! - Startup validation of required database settings
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::error::QuarryError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Database Configuration
// =============================================================================

/// Connection settings for the external PostgreSQL database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub name: String,
    pub schema: String,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: String::new(),
            password: String::new(),
            name: String::new(),
            schema: "public".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    /// Check that the settings without defaults were supplied.
    pub fn validate(&self) -> crate::Result<()> {
        let mut missing = Vec::new();
        if self.user.trim().is_empty() {
            missing.push("DB_USER");
        }
        if self.name.trim().is_empty() {
            missing.push("DB_NAME");
        }
        if self.schema.trim().is_empty() {
            missing.push("DB_SCHEMA");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(QuarryError::Configuration(format!(
                "missing database settings: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// =============================================================================
// Auth Configuration
// =============================================================================

/// How the configured application password is stored.
#[derive(Debug, Clone, PartialEq)]
pub enum PasswordSecret {
    Plain(String),
    /// Lowercase hex SHA-256 digest of the password.
    Sha256Hex(String),
    /// Argon2 PHC string.
    Argon2(String),
}

/// The single dashboard login.
#[derive(Debug, Clone, PartialEq)]
pub struct AppCredentials {
    pub username: String,
    pub secret: PasswordSecret,
}

/// Raw auth settings as they appear in the secrets file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub password_sha256: Option<String>,
    pub password_argon2: Option<String>,
}

impl AuthConfig {
    /// Resolve the configured credentials. Returns `None` when the username
    /// or every password form is missing. Argon2 wins over SHA-256, which
    /// wins over plaintext.
    pub fn credentials(&self) -> Option<AppCredentials> {
        let username = non_empty(self.username.as_deref())?;
        let secret = if let Some(phc) = non_empty(self.password_argon2.as_deref()) {
            PasswordSecret::Argon2(phc)
        } else if let Some(hex) = non_empty(self.password_sha256.as_deref()) {
            PasswordSecret::Sha256Hex(hex.to_ascii_lowercase())
        } else {
            PasswordSecret::Plain(non_empty(self.password.as_deref())?)
        };
        Some(AppCredentials { username, secret })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

// =============================================================================
// Dashboard Configuration
// =============================================================================

/// Behavioural settings of the dashboard itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub read_only: bool,
    pub metadata_ttl_secs: u64,
    pub data_ttl_secs: u64,
    pub highlight_table: String,
    pub highlight_label: String,
    pub highlight_date_column: String,
    pub highlight_category_column: String,
    /// Login attempts per minute per client address; 0 disables the limit.
    pub login_rate_limit: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            read_only: true,
            metadata_ttl_secs: 300,
            data_ttl_secs: 60,
            highlight_table: "chat_feedback".to_string(),
            highlight_label: "Feedback".to_string(),
            highlight_date_column: "created_at".to_string(),
            highlight_category_column: "feedback_type".to_string(),
            login_rate_limit: 10,
        }
    }
}

impl DashboardConfig {
    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_secs)
    }

    pub fn data_ttl(&self) -> Duration {
        Duration::from_secs(self.data_ttl_secs)
    }
}

// =============================================================================
// Combined Configuration
// =============================================================================

/// Everything the dashboard reads at startup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct QuarryConfig {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub dashboard: DashboardConfig,
}

impl QuarryConfig {
    /// Load configuration from a TOML secrets file.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| QuarryError::Configuration(e.to_string()))
    }

    /// Load the layered configuration: defaults, the optional secrets file,
    /// then the process environment.
    pub fn load(secrets: Option<&Path>) -> crate::Result<Self> {
        let mut config = match secrets {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override settings from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = &mut self.database;
        set_string(&lookup, "DB_HOST", &mut db.host);
        set_parsed(&lookup, "DB_PORT", &mut db.port)?;
        set_string(&lookup, "DB_USER", &mut db.user);
        set_string(&lookup, "DB_PASSWORD", &mut db.password);
        set_string(&lookup, "DB_NAME", &mut db.name);
        set_string(&lookup, "DB_SCHEMA", &mut db.schema);
        set_parsed(&lookup, "DB_CONNECT_TIMEOUT_SECS", &mut db.connect_timeout_secs)?;

        let auth = &mut self.auth;
        set_optional(&lookup, "APP_USERNAME", &mut auth.username);
        set_optional(&lookup, "APP_PASSWORD", &mut auth.password);
        set_optional(&lookup, "APP_PASSWORD_SHA256", &mut auth.password_sha256);
        set_optional(&lookup, "APP_PASSWORD_ARGON2", &mut auth.password_argon2);

        let dash = &mut self.dashboard;
        if let Some(raw) = lookup("QUARRY_READ_ONLY") {
            dash.read_only = parse_bool("QUARRY_READ_ONLY", &raw)?;
        }
        set_parsed(&lookup, "QUARRY_METADATA_TTL_SECS", &mut dash.metadata_ttl_secs)?;
        set_parsed(&lookup, "QUARRY_DATA_TTL_SECS", &mut dash.data_ttl_secs)?;
        set_string(&lookup, "QUARRY_HIGHLIGHT_TABLE", &mut dash.highlight_table);
        set_string(&lookup, "QUARRY_HIGHLIGHT_LABEL", &mut dash.highlight_label);
        set_string(&lookup, "QUARRY_HIGHLIGHT_DATE_COLUMN", &mut dash.highlight_date_column);
        set_string(
            &lookup,
            "QUARRY_HIGHLIGHT_CATEGORY_COLUMN",
            &mut dash.highlight_category_column,
        );
        set_parsed(&lookup, "QUARRY_LOGIN_RATE_LIMIT", &mut dash.login_rate_limit)?;
        Ok(())
    }
}

fn set_string<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, target: &mut String) {
    if let Some(value) = lookup(key) {
        *target = value;
    }
}

fn set_optional<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, target: &mut Option<String>) {
    if let Some(value) = lookup(key) {
        *target = Some(value);
    }
}

fn set_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> crate::Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| QuarryError::Configuration(format!("invalid value for {key}: {raw}")))?;
    }
    Ok(())
}

fn parse_bool(key: &str, raw: &str) -> crate::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(QuarryError::Configuration(format!(
            "invalid value for {key}: {raw}"
        ))),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = QuarryConfig::default();
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.schema, "public");
        assert!(config.dashboard.read_only);
        assert_eq!(config.dashboard.metadata_ttl_secs, 300);
        assert_eq!(config.dashboard.data_ttl_secs, 60);
        assert_eq!(config.dashboard.highlight_table, "chat_feedback");
        assert!(config.auth.credentials().is_none());
    }

    #[test]
    fn test_missing_database_settings_rejected() {
        let err = DatabaseConfig::default().validate().unwrap_err();
        assert!(matches!(err, QuarryError::Configuration(ref m) if m.contains("DB_USER") && m.contains("DB_NAME")));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = QuarryConfig::default();
        config
            .apply_env(env(&[
                ("DB_HOST", "db.internal"),
                ("DB_PORT", "6543"),
                ("DB_USER", "analyst"),
                ("DB_NAME", "warehouse"),
                ("APP_USERNAME", "admin"),
                ("APP_PASSWORD", "hunter2"),
                ("QUARRY_READ_ONLY", "false"),
            ]))
            .unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 6543);
        assert!(config.database.validate().is_ok());
        assert!(!config.dashboard.read_only);
        let creds = config.auth.credentials().unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.secret, PasswordSecret::Plain("hunter2".into()));
    }

    #[test]
    fn test_invalid_port_is_configuration_error() {
        let mut config = QuarryConfig::default();
        let err = config.apply_env(env(&[("DB_PORT", "not-a-port")])).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_secret_precedence() {
        let auth = AuthConfig {
            username: Some("admin".into()),
            password: Some("plain".into()),
            password_sha256: Some("ABCDEF".into()),
            password_argon2: None,
        };
        assert_eq!(
            auth.credentials().unwrap().secret,
            PasswordSecret::Sha256Hex("abcdef".into())
        );

        let no_password = AuthConfig {
            username: Some("admin".into()),
            ..Default::default()
        };
        assert!(no_password.credentials().is_none());
    }

    #[test]
    fn test_secrets_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[database]\nhost = \"pg\"\nuser = \"reader\"\nname = \"analytics\"\n\n[auth]\nusername = \"ops\"\npassword = \"s3cret\"\n\n[dashboard]\ndata_ttl_secs = 30"
        )
        .unwrap();

        let mut config = QuarryConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database.host, "pg");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.dashboard.data_ttl_secs, 30);
        assert_eq!(config.dashboard.metadata_ttl_secs, 300);

        config.apply_env(env(&[("DB_HOST", "override")])).unwrap();
        assert_eq!(config.database.host, "override");
        assert_eq!(config.auth.credentials().unwrap().username, "ops");
    }
}
