//! Quarry Authentication
//!
//! Credential check for the single dashboard login and session token
//! generation. The configured password may be stored as plaintext, as a
//! SHA-256 hex digest, or as an Argon2 PHC string.
//!
//! Key Features:
//! - Exact username match with constant-time comparison
//! - Plaintext, SHA-256 and Argon2 password verification
//! - Cryptographically secure 256-bit session tokens
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use argon2::{password_hash::PasswordHash, Argon2, PasswordVerifier};
use quarry_common::config::{AppCredentials, PasswordSecret};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// =============================================================================
// Request / Response Types
// =============================================================================

/// Login request.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Authentication response.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: Option<String>,
    pub username: Option<String>,
    pub expires_in_secs: Option<u64>,
    pub error: Option<String>,
}

impl AuthResponse {
    pub fn success(token: String, username: String, expires_in_secs: u64) -> Self {
        Self {
            token: Some(token),
            username: Some(username),
            expires_in_secs: Some(expires_in_secs),
            error: None,
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            token: None,
            username: None,
            expires_in_secs: None,
            error: Some(message.to_string()),
        }
    }
}

/// Details of the session behind a token.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub username: String,
    pub selected_table: Option<String>,
    pub read_only: bool,
}

// =============================================================================
// Credential Check
// =============================================================================

/// True exactly when both values are non-empty, the username matches and
/// the password verifies against the configured secret. Always false when
/// no credentials are configured.
pub fn check_credentials(
    credentials: Option<&AppCredentials>,
    username: &str,
    password: &str,
) -> bool {
    let Some(credentials) = credentials else {
        return false;
    };
    if username.is_empty() || password.is_empty() {
        return false;
    }
    if !constant_time_eq(username.as_bytes(), credentials.username.as_bytes()) {
        return false;
    }

    match &credentials.secret {
        PasswordSecret::Plain(expected) => {
            constant_time_eq(password.as_bytes(), expected.as_bytes())
        }
        PasswordSecret::Sha256Hex(expected) => {
            constant_time_eq(sha256_hex(password).as_bytes(), expected.as_bytes())
        }
        PasswordSecret::Argon2(phc) => verify_argon2(password, phc),
    }
}

/// Lowercase hex SHA-256 digest of a password.
pub fn sha256_hex(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Verify a password against an Argon2 PHC string. Malformed hashes never
/// verify.
fn verify_argon2(password: &str, phc: &str) -> bool {
    let parsed_hash = match PasswordHash::new(phc) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// =============================================================================
// Tokens
// =============================================================================

/// Generate a random 256-bit session token, hex encoded.
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};

    fn creds(secret: PasswordSecret) -> AppCredentials {
        AppCredentials {
            username: "analyst".to_string(),
            secret,
        }
    }

    #[test]
    fn test_plain_password() {
        let c = creds(PasswordSecret::Plain("hunter2".into()));
        assert!(check_credentials(Some(&c), "analyst", "hunter2"));
        assert!(!check_credentials(Some(&c), "analyst", "hunter3"));
        assert!(!check_credentials(Some(&c), "Analyst", "hunter2"));
        assert!(!check_credentials(Some(&c), "analyst", "hunter2 "));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hunter2", b"hunter2"));
        assert!(constant_time_eq(b"", b""));
        assert!(!constant_time_eq(b"hunter2", b"hunter3"));
        assert!(!constant_time_eq(b"hunter", b"hunter2"));
        assert!(!constant_time_eq(b"hunter2", b"hunter"));
        assert!(!constant_time_eq(b"", b"h"));

        let c = creds(PasswordSecret::Plain("hunter2".into()));
        assert!(!check_credentials(Some(&c), "analyst", "hunter"));
        assert!(!check_credentials(Some(&c), "analyst", ""));
        assert!(!check_credentials(Some(&c), "analys", "hunter2"));
    }

    #[test]
    fn test_sha256_password() {
        let digest = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";
        assert_eq!(sha256_hex("password"), digest);

        let c = creds(PasswordSecret::Sha256Hex(digest.into()));
        assert!(check_credentials(Some(&c), "analyst", "password"));
        assert!(!check_credentials(Some(&c), "analyst", digest));
    }

    #[test]
    fn test_argon2_password() {
        let salt = SaltString::generate(&mut OsRng);
        let phc = Argon2::default()
            .hash_password(b"s3cret!", &salt)
            .unwrap()
            .to_string();

        let c = creds(PasswordSecret::Argon2(phc));
        assert!(check_credentials(Some(&c), "analyst", "s3cret!"));
        assert!(!check_credentials(Some(&c), "analyst", "s3cret"));

        let broken = creds(PasswordSecret::Argon2("not-a-phc-string".into()));
        assert!(!check_credentials(Some(&broken), "analyst", "s3cret!"));
    }

    #[test]
    fn test_empty_and_unconfigured() {
        let c = creds(PasswordSecret::Plain("".into()));
        assert!(!check_credentials(Some(&c), "analyst", ""));
        assert!(!check_credentials(Some(&c), "", ""));
        assert!(!check_credentials(None, "analyst", "hunter2"));
    }

    #[test]
    fn test_token_generation() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
