//! Quarry Utils - Utility Functions
//!
//! Formatting helpers shared by the page renderer and exports.
//!
//! Key Features:
//! - Human-readable memory sizes
//! - Thousands-separated counts for metric tiles
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

// =============================================================================
// Size Formatting
// =============================================================================

/// Render a byte count for memory tiles: plain bytes below 1 KB, otherwise
/// the largest binary unit with two decimals, e.g. `"1.50 KB"`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = UNITS[0];
    for &next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{:.2} {}", value, unit)
}

// =============================================================================
// Count Formatting
// =============================================================================

/// Format a count with comma thousands separators, e.g. `1,234,567`.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
