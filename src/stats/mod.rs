//! Stats module - derived tables and statistical helpers

mod analyzer;
mod calculator;

pub use analyzer::{AnalyzerError, DataAnalyzer, Frequency};
pub use calculator::{AmountStats, BoxStats, StatsCalculator};
