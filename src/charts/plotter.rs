//! Chart Plotter Module
//! Turns analysis tables into `Figure`s and optionally saves them.

use crate::charts::renderer::{Figure, NamedSeries, Plot};
use crate::charts::style::{parse_color, ChartStyle, Colormap, PALETTE};
use crate::data::{DataProcessor, ProcessorError};
use crate::stats::StatsCalculator;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// DPI used when the caller does not pick one.
pub const DEFAULT_DPI: u32 = 300;
pub const DEFAULT_COLOR: &str = "steelblue";

#[derive(Error, Debug)]
pub enum VizError {
    #[error("Nothing to plot: {0}")]
    EmptyData(String),
    #[error("Column not found: {0}")]
    UnknownColumn(String),
    #[error("Unknown colour: {0}")]
    UnknownColor(String),
    #[error("Unknown colormap: {0}")]
    UnknownColormap(String),
    #[error("Unknown chart style: {0} (expected ggplot or classic)")]
    UnknownStyle(String),
    #[error("Unsupported image format: {0:?} (expected png, jpg or svg)")]
    UnsupportedFormat(String),
    #[error("Invalid chart input: {0}")]
    InvalidData(String),
    #[error("Rendering failed: {0}")]
    Render(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error(transparent)]
    Processing(#[from] ProcessorError),
}

/// Options shared by every chart.
#[derive(Debug, Clone, Default)]
pub struct ChartOptions {
    pub title: Option<String>,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    /// Colour name or `#rrggbb`; defaults to steelblue.
    pub color: Option<String>,
    /// Overrides the visualizer's figure size (inches).
    pub figsize: Option<(f64, f64)>,
    pub save_path: Option<PathBuf>,
    pub dpi: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct BarOptions {
    /// Sort a single series by descending value.
    pub sort_values: bool,
    pub horizontal: bool,
}

impl Default for BarOptions {
    fn default() -> Self {
        Self {
            sort_values: true,
            horizontal: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineOptions {
    pub marker: bool,
    pub grid: bool,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self {
            marker: true,
            grid: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PieOptions {
    /// Degrees counter-clockwise from the positive x axis.
    pub start_angle: f64,
    pub shadow: bool,
    /// Radial offset per slice as a fraction of the radius; empty for none.
    pub explode: Vec<f64>,
}

impl Default for PieOptions {
    fn default() -> Self {
        Self {
            start_angle: 90.0,
            shadow: false,
            explode: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeatmapOptions {
    pub cmap: String,
    pub annotate: bool,
    pub decimals: usize,
    /// Cell border width in points.
    pub linewidth: f64,
}

impl Default for HeatmapOptions {
    fn default() -> Self {
        Self {
            cmap: "coolwarm".to_string(),
            annotate: true,
            decimals: 2,
            linewidth: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistogramOptions {
    pub bins: usize,
    pub kde: bool,
    /// Column to bin; the first numeric column when absent.
    pub column: Option<String>,
}

impl Default for HistogramOptions {
    fn default() -> Self {
        Self {
            bins: 10,
            kde: true,
            column: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoxOptions {
    pub vertical: bool,
}

impl Default for BoxOptions {
    fn default() -> Self {
        Self { vertical: true }
    }
}

#[derive(Debug, Clone)]
pub struct ScatterOptions {
    pub alpha: f64,
    /// Marker area in points squared.
    pub size: f64,
}

impl Default for ScatterOptions {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            size: 50.0,
        }
    }
}

/// Labels and numeric series pulled out of an analysis table.
#[derive(Debug, Clone, PartialEq)]
struct FrameData {
    labels: Vec<String>,
    series: Vec<NamedSeries>,
}

impl FrameData {
    /// The first non-numeric column gives the labels (row numbers when there
    /// is none); every numeric column becomes a series.
    fn from_frame(df: &DataFrame) -> Result<Self, VizError> {
        let mut labels = None;
        let mut series = Vec::new();
        for column in df.get_columns() {
            if DataProcessor::is_numeric(column.dtype()) {
                series.push(NamedSeries {
                    name: column.name().to_string(),
                    values: nan_filled(column)?,
                });
            } else if labels.is_none() {
                labels = Some(
                    DataProcessor::strings(column)?
                        .into_iter()
                        .map(|v| v.unwrap_or_default())
                        .collect::<Vec<_>>(),
                );
            }
        }

        if series.is_empty() || df.height() == 0 {
            return Err(VizError::EmptyData("no numeric values in table".to_string()));
        }
        let labels = labels.unwrap_or_else(|| (0..df.height()).map(|i| i.to_string()).collect());
        Ok(Self { labels, series })
    }

    /// Reorder rows by descending value of the first series; NaN sorts last.
    fn sort_descending(&mut self) {
        let Some(first) = self.series.first() else {
            return;
        };
        let mut order: Vec<usize> = (0..self.labels.len()).collect();
        order.sort_by(|&a, &b| {
            let (va, vb) = (first.values[a], first.values[b]);
            match (va.is_nan(), vb.is_nan()) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) => vb.total_cmp(&va),
            }
        });
        self.labels = order.iter().map(|&i| self.labels[i].clone()).collect();
        for s in &mut self.series {
            s.values = order.iter().map(|&i| s.values[i]).collect();
        }
    }
}

fn nan_filled(column: &Column) -> Result<Vec<f64>, VizError> {
    Ok(DataProcessor::floats(column)?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, VizError> {
    let column = df
        .column(name)
        .map_err(|_| VizError::UnknownColumn(name.to_string()))?;
    if !DataProcessor::is_numeric(column.dtype()) {
        return Err(VizError::InvalidData(format!("column '{}' is not numeric", name)));
    }
    nan_filled(column)
}

/// Creates charts from analysis results.
#[derive(Debug, Clone)]
pub struct DataVisualizer {
    figsize: (f64, f64),
    style: ChartStyle,
}

impl Default for DataVisualizer {
    fn default() -> Self {
        Self::new((10.0, 6.0), ChartStyle::Ggplot)
    }
}

impl DataVisualizer {
    pub fn new(figsize: (f64, f64), style: ChartStyle) -> Self {
        Self { figsize, style }
    }

    /// Bar chart of every numeric column against the label column.
    pub fn bar_chart(&self, data: &DataFrame, opts: &ChartOptions, bar: &BarOptions) -> Result<Figure, VizError> {
        let mut frame = FrameData::from_frame(data)?;
        let single = frame.series.len() == 1;
        if single && bar.sort_values {
            frame.sort_descending();
        }
        let colors = self.series_colors(opts, frame.series.len())?;
        let plot = Plot::Bar {
            labels: frame.labels,
            series: frame.series,
            colors,
            horizontal: bar.horizontal,
            value_labels: single,
        };
        let figure = self.figure(opts, None, Some("Amount"), plot);
        self.finish(figure, opts)
    }

    /// Line chart over the label column, one line per numeric column.
    pub fn line_chart(&self, data: &DataFrame, opts: &ChartOptions, line: &LineOptions) -> Result<Figure, VizError> {
        let frame = FrameData::from_frame(data)?;
        let colors = self.series_colors(opts, frame.series.len())?;
        let plot = Plot::Line {
            labels: frame.labels,
            series: frame.series,
            colors,
            marker: line.marker,
            grid: line.grid,
        };
        let figure = self.figure(opts, Some("Date"), Some("Amount"), plot);
        self.finish(figure, opts)
    }

    /// Pie chart of the first numeric column.
    pub fn pie_chart(&self, data: &DataFrame, opts: &ChartOptions, pie: &PieOptions) -> Result<Figure, VizError> {
        let FrameData { labels, mut series } = FrameData::from_frame(data)?;
        if series.len() > 1 {
            log::debug!("Pie chart uses '{}' and ignores {} other columns", series[0].name, series.len() - 1);
        }
        let values = series.swap_remove(0).values;
        if !values.iter().any(|v| v.is_finite() && *v > 0.0) {
            return Err(VizError::InvalidData("pie chart needs at least one positive value".to_string()));
        }
        if values.iter().any(|v| v.is_finite() && *v < 0.0) {
            return Err(VizError::InvalidData("pie chart values must not be negative".to_string()));
        }
        if !pie.explode.is_empty() && pie.explode.len() != values.len() {
            return Err(VizError::InvalidData(format!(
                "explode has {} entries for {} slices",
                pie.explode.len(),
                values.len()
            )));
        }
        let plot = Plot::Pie {
            labels,
            values,
            start_angle: pie.start_angle,
            shadow: pie.shadow,
            explode: pie.explode.clone(),
        };
        let mut figure = self.figure(opts, None, None, plot);
        figure.xlabel = None;
        figure.ylabel = None;
        self.finish(figure, opts)
    }

    /// Matrix heatmap: label column gives rows, numeric columns give columns.
    ///
    /// Without an explicit figure size the figure grows with the matrix:
    /// `(max(8, 0.8 * columns), max(6, 0.8 * rows))`.
    pub fn heatmap(&self, data: &DataFrame, opts: &ChartOptions, heat: &HeatmapOptions) -> Result<Figure, VizError> {
        let cmap: Colormap = heat.cmap.parse()?;
        let frame = FrameData::from_frame(data)?;
        let columns: Vec<String> = frame.series.iter().map(|s| s.name.clone()).collect();
        let values: Vec<Vec<f64>> = (0..frame.labels.len())
            .map(|i| frame.series.iter().map(|s| s.values[i]).collect())
            .collect();

        let figsize = opts.figsize.unwrap_or_else(|| Self::heatmap_size(columns.len(), frame.labels.len()));
        let plot = Plot::Heatmap {
            rows: frame.labels,
            columns,
            values,
            cmap,
            annotate: heat.annotate,
            decimals: heat.decimals,
            linewidth: heat.linewidth,
        };
        let mut figure = self.figure(opts, None, None, plot);
        figure.figsize = figsize;
        self.finish(figure, opts)
    }

    pub fn heatmap_size(n_columns: usize, n_rows: usize) -> (f64, f64) {
        (
            (n_columns as f64 * 0.8).max(8.0),
            (n_rows as f64 * 0.8).max(6.0),
        )
    }

    /// Histogram of one numeric column with an optional KDE curve.
    pub fn histogram(&self, data: &DataFrame, opts: &ChartOptions, hist: &HistogramOptions) -> Result<Figure, VizError> {
        if hist.bins == 0 {
            return Err(VizError::InvalidData("histogram needs at least one bin".to_string()));
        }
        let values = match &hist.column {
            Some(name) => numeric_column(data, name)?,
            None => {
                let frame = FrameData::from_frame(data)?;
                frame.series.into_iter().next().map(|s| s.values).unwrap_or_default()
            }
        };
        if !values.iter().any(|v| v.is_finite()) {
            return Err(VizError::EmptyData("histogram column has no values".to_string()));
        }
        let plot = Plot::Histogram {
            values,
            bins: hist.bins,
            color: self.color(opts)?,
            kde: hist.kde,
        };
        let figure = self.figure(opts, None, Some("Frequency"), plot);
        self.finish(figure, opts)
    }

    /// One box per numeric column.
    pub fn box_plot(&self, data: &DataFrame, opts: &ChartOptions, boxes: &BoxOptions) -> Result<Figure, VizError> {
        let frame = FrameData::from_frame(data)?;
        let mut labels = Vec::new();
        let mut stats = Vec::new();
        for s in &frame.series {
            if let Some(summary) = StatsCalculator::box_stats(&s.values) {
                labels.push(s.name.clone());
                stats.push(summary);
            }
        }
        if stats.is_empty() {
            return Err(VizError::EmptyData("no values for box plot".to_string()));
        }
        let plot = Plot::Box {
            labels,
            stats,
            color: self.color(opts)?,
            vertical: boxes.vertical,
        };
        let figure = self.figure(opts, None, None, plot);
        self.finish(figure, opts)
    }

    /// Scatter of two numeric columns.
    pub fn scatter_plot(
        &self,
        data: &DataFrame,
        x: &str,
        y: &str,
        opts: &ChartOptions,
        scatter: &ScatterOptions,
    ) -> Result<Figure, VizError> {
        let xs = numeric_column(data, x)?;
        let ys = numeric_column(data, y)?;
        if !xs.iter().zip(&ys).any(|(a, b)| a.is_finite() && b.is_finite()) {
            return Err(VizError::EmptyData(format!("no complete ({}, {}) pairs", x, y)));
        }
        let plot = Plot::Scatter {
            x: xs,
            y: ys,
            color: self.color(opts)?,
            alpha: scatter.alpha,
            size: scatter.size,
        };
        let figure = self.figure(opts, Some(x), Some(y), plot);
        self.finish(figure, opts)
    }

    /// Create `dir` and any missing parents; succeeds if it already exists.
    pub fn create_output_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf, VizError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(dir.to_path_buf())
    }

    fn color(&self, opts: &ChartOptions) -> Result<plotters::style::RGBColor, VizError> {
        parse_color(opts.color.as_deref().unwrap_or(DEFAULT_COLOR))
    }

    /// The chosen colour for a single series, the palette for several.
    fn series_colors(&self, opts: &ChartOptions, n: usize) -> Result<Vec<plotters::style::RGBColor>, VizError> {
        if n == 1 {
            Ok(vec![self.color(opts)?])
        } else {
            Ok((0..n).map(|i| PALETTE[i % PALETTE.len()]).collect())
        }
    }

    fn figure(&self, opts: &ChartOptions, xlabel: Option<&str>, ylabel: Option<&str>, plot: Plot) -> Figure {
        Figure {
            title: opts.title.clone(),
            xlabel: opts.xlabel.clone().or_else(|| xlabel.map(str::to_string)),
            ylabel: opts.ylabel.clone().or_else(|| ylabel.map(str::to_string)),
            figsize: opts.figsize.unwrap_or(self.figsize),
            style: self.style,
            plot,
        }
    }

    fn finish(&self, figure: Figure, opts: &ChartOptions) -> Result<Figure, VizError> {
        if let Some(path) = &opts.save_path {
            figure.save(path, opts.dpi.unwrap_or(DEFAULT_DPI))?;
            log::info!("Saved {} chart to {}", figure.plot.kind(), path.display());
        }
        Ok(figure)
    }
}
