//! Settings Module
//! Defaults for loading, segmentation and chart output, optionally read from JSON.

use crate::charts::{ChartStyle, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Columns every input file must provide.
pub const DEFAULT_REQUIRED_COLUMNS: [&str; 4] = ["date", "category", "amount", "customer_id"];

/// User settings shared by the loader, analyzer and visualizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub required_columns: Vec<String>,
    /// Figure size in inches (width, height)
    pub figsize: (f64, f64),
    pub style: ChartStyle,
    pub color: String,
    pub dpi: u32,
    pub format: ImageFormat,
    pub n_segments: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            required_columns: DEFAULT_REQUIRED_COLUMNS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            figsize: (10.0, 6.0),
            style: ChartStyle::Ggplot,
            color: "steelblue".to_string(),
            dpi: 300,
            format: ImageFormat::Png,
            n_segments: 3,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file. Keys not present keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Parse a "width,height" figure size.
    pub fn parse_figsize(value: &str) -> Option<(f64, f64)> {
        let (w, h) = value.split_once(',')?;
        let w: f64 = w.trim().parse().ok()?;
        let h: f64 = h.trim().parse().ok()?;
        (w > 0.0 && h > 0.0).then_some((w, h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"dpi": 120, "style": "classic", "format": "svg"}}"#).unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.dpi, 120);
        assert_eq!(settings.style, ChartStyle::Classic);
        assert_eq!(settings.format, ImageFormat::Svg);
        assert_eq!(settings.required_columns.len(), 4);
        assert_eq!(settings.figsize, (10.0, 6.0));
    }

    #[test]
    fn test_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        assert!(matches!(
            Settings::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_figsize() {
        assert_eq!(Settings::parse_figsize("12, 8"), Some((12.0, 8.0)));
        assert_eq!(Settings::parse_figsize("12x8"), None);
        assert_eq!(Settings::parse_figsize("0,8"), None);
    }
}
