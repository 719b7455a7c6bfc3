//! Quarry Assets
//!
//! The browser shell served at `/`. It renders the JSON view models of the
//! API with Plotly.js and keeps the session token in `sessionStorage`.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

/// Single-page dashboard shell.
pub const INDEX_HTML: &str = include_str!("../static/index.html");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_references_api() {
        assert!(INDEX_HTML.starts_with("<!DOCTYPE html>"));
        assert!(INDEX_HTML.contains("/api/v1/auth/login"));
        assert!(INDEX_HTML.contains("plotly"));
    }
}
