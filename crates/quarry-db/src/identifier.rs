//! Quarry Identifier - SQL Identifier Handling
//!
//! Table and schema names cannot be bound as parameters, so they are
//! checked against an allow-list and then quoted before interpolation.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use quarry_common::{QuarryError, Result};

/// Quote an identifier, doubling embedded double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quoted `schema.table` reference.
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Reject names containing NUL, which PostgreSQL never accepts.
pub fn validate_ident(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('\0') {
        return Err(QuarryError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Ensure a table name is one the catalog listed.
pub fn ensure_known_table(table: &str, allowed: &[String]) -> Result<()> {
    validate_ident(table)?;
    if allowed.iter().any(|t| t == table) {
        Ok(())
    } else {
        Err(QuarryError::UnknownTable(table.to_string()))
    }
}

/// Ensure the requested schema is the configured one.
pub fn ensure_schema(schema: &str, configured: &str) -> Result<()> {
    validate_ident(schema)?;
    if schema == configured {
        Ok(())
    } else {
        Err(QuarryError::InvalidIdentifier(format!("schema {schema}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(qualified_name("public", "Order Items"), "\"public\".\"Order Items\"");
    }

    #[test]
    fn test_allow_list() {
        let allowed = vec!["orders".to_string(), "users".to_string()];
        assert!(ensure_known_table("orders", &allowed).is_ok());
        assert_eq!(
            ensure_known_table("orders; DROP TABLE users", &allowed),
            Err(QuarryError::UnknownTable("orders; DROP TABLE users".into()))
        );
        assert!(matches!(
            ensure_known_table("", &allowed),
            Err(QuarryError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_schema_must_match() {
        assert!(ensure_schema("public", "public").is_ok());
        assert!(ensure_schema("pg_catalog", "public").is_err());
    }
}
