//! Quarry Theme - Chart Styling
//!
//! Dashboard colours and the Plotly layout every figure starts from.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde_json::{json, Value as Json};

pub const NAVY: &str = "#000080";
pub const RED: &str = "#DC143C";
pub const ASH: &str = "#F5F5F5";
pub const LIGHT_NAVY: &str = "#4169E1";
pub const DARK_RED: &str = "#B91C3C";
pub const MEDIUM_ASH: &str = "#D3D3D3";
pub const WHITE: &str = "#FFFFFF";

/// Discrete colour sequence for categorical traces.
pub const PALETTE: [&str; 10] = [
    RED, NAVY, LIGHT_NAVY, DARK_RED, "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7",
    "#DDA0DD",
];

/// Continuous scale for heatmaps, red through white to navy.
pub fn diverging_scale() -> Json {
    json!([[0.0, RED], [0.5, WHITE], [1.0, NAVY]])
}

/// Sequential scale for single-hue gradients.
pub fn sequential_scale() -> Json {
    json!([[0.0, ASH], [1.0, NAVY]])
}

/// Colour for the `i`-th series.
pub fn color(i: usize) -> &'static str {
    PALETTE[i % PALETTE.len()]
}

/// Base layout with the dashboard title styling and axes.
pub fn base_layout(title: &str) -> Json {
    json!({
        "title": {
            "text": title,
            "font": {"size": 20, "color": NAVY, "family": "Arial, sans-serif"},
            "x": 0.5,
            "xanchor": "center"
        },
        "plot_bgcolor": WHITE,
        "paper_bgcolor": WHITE,
        "font": {"family": "Arial, sans-serif", "size": 12, "color": "#333333"},
        "xaxis": {"gridcolor": MEDIUM_ASH, "linecolor": MEDIUM_ASH, "zeroline": false},
        "yaxis": {"gridcolor": MEDIUM_ASH, "linecolor": MEDIUM_ASH, "zeroline": false},
        "legend": {"bgcolor": "rgba(255,255,255,0.8)", "bordercolor": MEDIUM_ASH, "borderwidth": 1},
        "margin": {"l": 60, "r": 30, "t": 70, "b": 60},
        "colorway": PALETTE,
        "hoverlabel": {"bgcolor": WHITE, "font": {"color": NAVY}}
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_cycles() {
        assert_eq!(color(0), RED);
        assert_eq!(color(1), NAVY);
        assert_eq!(color(10), RED);
    }

    #[test]
    fn test_base_layout() {
        let layout = base_layout("Top 10 Tables");
        assert_eq!(layout["title"]["text"], "Top 10 Tables");
        assert_eq!(layout["title"]["font"]["color"], NAVY);
        assert_eq!(layout["colorway"].as_array().unwrap().len(), 10);
    }
}
