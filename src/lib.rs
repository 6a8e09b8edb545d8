//! Spend Analyzer - transaction CSV analysis and static chart generation
//!
//! Data flows one way: `DataLoader` reads and cleans a CSV file, `DataAnalyzer`
//! derives summary tables from it, and `DataVisualizer` renders those tables
//! as PNG, JPEG or SVG charts.

pub mod charts;
pub mod cli;
pub mod config;
pub mod data;
pub mod stats;

pub use charts::{ChartOptions, DataVisualizer, Figure, VizError};
pub use cli::{run, Args, Report};
pub use config::Settings;
pub use data::{DataLoader, LoaderError};
pub use stats::{AnalyzerError, DataAnalyzer, Frequency};
