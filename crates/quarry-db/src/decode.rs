//! Quarry Decode - Text Protocol Value Decoding
//!
//! Rows of ad-hoc queries arrive in PostgreSQL's text format. Column types
//! come from the prepared statement; each cell is parsed according to its
//! type. Values that do not parse fall back to text.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use quarry_common::Value;

/// Decode one text-format cell given its PostgreSQL type name.
pub fn decode_text(type_name: &str, raw: Option<&str>) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };

    let decoded = match type_name {
        "bool" => match raw {
            "t" | "true" => Some(Value::Bool(true)),
            "f" | "false" => Some(Value::Bool(false)),
            _ => None,
        },
        "int2" | "int4" | "int8" | "oid" => raw.parse::<i64>().ok().map(Value::Int),
        "float4" | "float8" | "numeric" => parse_float(raw).map(Value::Float),
        "date" => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().map(Value::Date),
        "timestamp" => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(Value::Timestamp),
        "timestamptz" => parse_timestamptz(raw).map(Value::Timestamp),
        "json" | "jsonb" => serde_json::from_str(raw).ok().map(Value::Json),
        _ => None,
    };

    decoded.unwrap_or_else(|| Value::Text(raw.to_string()))
}

fn parse_float(raw: &str) -> Option<f64> {
    match raw {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => raw.parse().ok(),
    }
}

/// Parse `2024-03-01 12:00:00.5+05:30` style text, normalized to UTC.
fn parse_timestamptz(raw: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z")
        .ok()
        .map(|dt| dt.naive_utc())
}
