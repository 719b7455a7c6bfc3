//! Quarry Analytics - Derived Aggregates, Charts and Exports
//!
//! Everything the dashboard computes from a loaded result set without going
//! back to the database: profiling, filters, descriptive statistics, chart
//! figures and downloadable files.
//!
//! Key Features:
//! - Column profiling and category counts
//! - In-memory range, multi-select and date filters
//! - Quantiles, IQR outliers, correlations and daily trends
//! - Themed Plotly figures
//! - CSV, XLSX and JSON export
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod charts;
pub mod dataset;
pub mod export;
pub mod filter;
pub mod stats;
pub mod theme;

pub use charts::{build as build_chart, ChartKind, ChartSpec, Figure};
pub use export::{ExportFile, ExportFormat};
pub use filter::{apply_filters, derive_controls, Filter, FilterControl};
pub use stats::AggregateFunction;
