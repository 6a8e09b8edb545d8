//! Command-line interface definitions and the analysis driver

use crate::charts::{
    BarOptions, BoxOptions, ChartOptions, ChartStyle, DataVisualizer, Figure, HeatmapOptions, HistogramOptions,
    ImageFormat, LineOptions, PieOptions, ScatterOptions,
};
use crate::config::{ConfigError, Settings};
use crate::data::{DataLoader, DataProcessor};
use crate::stats::{DataAnalyzer, Frequency};
use chrono::Local;
use clap::{Parser, ValueEnum};
use log::{info, warn};
use polars::prelude::DataFrame;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Analyses the driver can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnalysisKind {
    Summary,
    TimeSeries,
    Distribution,
    TopCategories,
    CustomerSegments,
    CustomerMetrics,
    Correlation,
}

impl AnalysisKind {
    /// Name as typed on the command line, also used for output file names.
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisKind::Summary => "summary",
            AnalysisKind::TimeSeries => "time-series",
            AnalysisKind::Distribution => "distribution",
            AnalysisKind::TopCategories => "top-categories",
            AnalysisKind::CustomerSegments => "customer-segments",
            AnalysisKind::CustomerMetrics => "customer-metrics",
            AnalysisKind::Correlation => "correlation",
        }
    }

    /// Title case, e.g. "Top Categories".
    pub fn title(self) -> String {
        self.as_str()
            .split('-')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Chart kinds the driver can draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlotKind {
    Bar,
    Line,
    Pie,
    Heatmap,
    Histogram,
    Box,
    Scatter,
}

/// Analyze transaction CSV files and chart the results
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the CSV file to analyze
    pub file: PathBuf,

    /// Type of analysis to perform
    #[arg(short, long, value_enum, default_value_t = AnalysisKind::Summary)]
    pub analysis: AnalysisKind,

    /// Column to group by for analysis
    #[arg(short, long)]
    pub groupby: Option<String>,

    /// Number of top items to show
    #[arg(short = 'n', long, default_value_t = 5)]
    pub n_top: usize,

    /// Number of customer segments [default: 3]
    #[arg(long)]
    pub segments: Option<usize>,

    /// Frequency for time-series analysis (D, W, M, Q or Y)
    #[arg(short, long, default_value = "M", value_parser = parse_choice::<Frequency>)]
    pub frequency: Frequency,

    /// Start date for filtering (YYYY-MM-DD)
    #[arg(long)]
    pub start_date: Option<String>,

    /// End date for filtering (YYYY-MM-DD)
    #[arg(long)]
    pub end_date: Option<String>,

    /// Filter by category (comma-separated for several)
    #[arg(long, value_delimiter = ',')]
    pub category: Vec<String>,

    /// Filter by customer ID (comma-separated for several)
    #[arg(long, value_delimiter = ',')]
    pub customer: Vec<String>,

    /// Type of plot to create
    #[arg(short, long, value_enum, default_value_t = PlotKind::Bar)]
    pub plot: PlotKind,

    /// Column for the x axis (scatter) or the values (histogram)
    #[arg(long)]
    pub x_column: Option<String>,

    /// Column for the y axis in scatter plots
    #[arg(long)]
    pub y_column: Option<String>,

    /// Title for the plot
    #[arg(long)]
    pub title: Option<String>,

    /// Label for the x axis
    #[arg(long)]
    pub xlabel: Option<String>,

    /// Label for the y axis
    #[arg(long)]
    pub ylabel: Option<String>,

    /// Colour for the plot, by name or #rrggbb [default: steelblue]
    #[arg(long)]
    pub color: Option<String>,

    /// Create a horizontal bar chart
    #[arg(long)]
    pub horizontal: bool,

    /// Figure size in inches (width,height) [default: 10,6]
    #[arg(long)]
    pub figsize: Option<String>,

    /// Chart style: ggplot or classic [default: ggplot]
    #[arg(long, value_parser = parse_choice::<ChartStyle>)]
    pub style: Option<ChartStyle>,

    /// Directory to save output files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Format for saving plots: png, jpg or svg [default: png]
    #[arg(long, value_parser = parse_choice::<ImageFormat>)]
    pub format: Option<ImageFormat>,

    /// DPI for saving plots [default: 300]
    #[arg(long)]
    pub dpi: Option<u32>,

    /// Do not display plots, only save them
    #[arg(long)]
    pub no_display: bool,

    /// JSON settings file; explicit flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parse a library type through its `FromStr` impl.
fn parse_choice<T>(value: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|e: T::Err| e.to_string())
}

impl Args {
    /// Settings from `--config` (or defaults) with command-line flags applied on top.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };

        if let Some(value) = &self.figsize {
            settings.figsize = Settings::parse_figsize(value).unwrap_or_else(|| {
                warn!("Invalid figsize '{}'. Using default (10,6).", value);
                (10.0, 6.0)
            });
        }
        if let Some(color) = &self.color {
            settings.color = color.clone();
        }
        if let Some(style) = self.style {
            settings.style = style;
        }
        if let Some(format) = self.format {
            settings.format = format;
        }
        if let Some(dpi) = self.dpi {
            settings.dpi = dpi;
        }
        if let Some(segments) = self.segments {
            settings.n_segments = segments;
        }
        Ok(settings)
    }

    /// Default chart title: "<Analysis> - <file name>".
    pub fn chart_title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        let file_name = self
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{} - {}", self.analysis.title(), file_name)
    }

    /// Axis labels used when the user gave none.
    pub fn default_labels(&self) -> (Option<String>, Option<String>) {
        let (x, y) = match self.plot {
            PlotKind::Bar => (Some(self.groupby.as_deref().unwrap_or("Category")), Some("Amount")),
            PlotKind::Line => (Some("Date"), Some("Amount")),
            PlotKind::Histogram => (Some("Value"), Some("Frequency")),
            PlotKind::Box => (Some("Category"), Some("Value")),
            PlotKind::Pie | PlotKind::Heatmap | PlotKind::Scatter => (None, None),
        };
        (
            self.xlabel.clone().or_else(|| x.map(str::to_string)),
            self.ylabel.clone().or_else(|| y.map(str::to_string)),
        )
    }
}

/// Output file name: `<analysis>_<YYYYmmdd_HHMMSS>.<format>`.
pub fn output_file_name(analysis: AnalysisKind, format: ImageFormat) -> String {
    format!(
        "{}_{}.{}",
        analysis.as_str(),
        Local::now().format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// What a run produced.
#[derive(Debug)]
pub struct Report {
    pub results: DataFrame,
    pub figure: Option<Figure>,
    pub saved_to: Option<PathBuf>,
}

/// Load, filter, analyze and chart according to `args`.
pub fn run(args: &Args) -> anyhow::Result<Report> {
    let settings = args.settings()?;

    let mut loader = DataLoader::with_required_columns(settings.required_columns.clone());
    println!("Loading data from {}...", args.file.display());
    let loaded = loader.load(&args.file)?;
    println!("Loaded {} rows and {} columns.", loaded.height(), loaded.width());

    let data = apply_filters(loader, args)?;
    let analyzer = DataAnalyzer::new(Some(data));
    let (heading, results) = analyze(&analyzer, args, &settings)?;
    println!("\n{}:", heading);
    println!("{}", results);

    if results.height() == 0 {
        warn!("Analysis produced no rows; skipping chart.");
        return Ok(Report {
            results,
            figure: None,
            saved_to: None,
        });
    }

    let visualizer = DataVisualizer::new(settings.figsize, settings.style);
    let save_path = match &args.output {
        Some(dir) => Some(visualizer.create_output_dir(dir)?.join(output_file_name(args.analysis, settings.format))),
        None if !args.no_display => Some(std::env::temp_dir().join(output_file_name(args.analysis, settings.format))),
        None => None,
    };

    let (xlabel, ylabel) = args.default_labels();
    let opts = ChartOptions {
        title: Some(args.chart_title()),
        xlabel,
        ylabel,
        color: Some(settings.color.clone()),
        figsize: None,
        save_path: save_path.clone(),
        dpi: Some(settings.dpi),
    };
    let figure = draw(&visualizer, &results, args, opts)?;
    match &save_path {
        Some(path) if args.output.is_some() => println!("\nCreated {} chart and saved to {}.", figure.plot.kind(), path.display()),
        _ => println!("\nCreated {} chart.", figure.plot.kind()),
    }

    if !args.no_display {
        if let Some(path) = &save_path {
            display(path);
        }
    }

    Ok(Report {
        results,
        figure: Some(figure),
        saved_to: save_path.filter(|_| args.output.is_some()),
    })
}

/// Apply date, category and customer filters in turn; each narrows the previous result.
fn apply_filters(loader: DataLoader, args: &Args) -> anyhow::Result<DataFrame> {
    let mut current = loader;

    if args.start_date.is_some() || args.end_date.is_some() {
        let start = args.start_date.as_deref().map(DataLoader::parse_date_bound).transpose()?;
        let end = args.end_date.as_deref().map(DataLoader::parse_date_bound).transpose()?;
        let filtered = current.filter_by_date_range(start, end)?;
        info!("Filtered by date range: {} rows remaining.", filtered.height());
        current = DataLoader::from_frame(filtered);
    }

    if !args.category.is_empty() {
        let filtered = current.filter_by_category(&args.category)?;
        info!(
            "Filtered by category '{}': {} rows remaining.",
            args.category.join(","),
            filtered.height()
        );
        current = DataLoader::from_frame(filtered);
    }

    if !args.customer.is_empty() {
        let filtered = current.filter_by_customer(&args.customer)?;
        info!(
            "Filtered by customer '{}': {} rows remaining.",
            args.customer.join(","),
            filtered.height()
        );
        current = DataLoader::from_frame(filtered);
    }

    Ok(current.data()?.clone())
}

fn analyze(analyzer: &DataAnalyzer, args: &Args, settings: &Settings) -> anyhow::Result<(String, DataFrame)> {
    let groupby = args.groupby.as_deref();
    Ok(match args.analysis {
        AnalysisKind::Summary => ("Summary Statistics".to_string(), analyzer.summary_statistics(groupby)?),
        AnalysisKind::TimeSeries => (
            format!("Time Series Analysis (Frequency: {})", args.frequency),
            analyzer.time_series(args.frequency, groupby)?,
        ),
        AnalysisKind::Distribution => {
            let by = groupby.unwrap_or("category");
            (
                format!("Spending Distribution by {}", by),
                analyzer.spending_distribution(by)?,
            )
        }
        AnalysisKind::TopCategories => (
            format!("Top {} Spending Categories", args.n_top),
            analyzer.top_spending_categories(args.n_top)?,
        ),
        AnalysisKind::CustomerSegments => (
            "Customer Segments".to_string(),
            analyzer.segment_customers(settings.n_segments)?,
        ),
        AnalysisKind::CustomerMetrics => ("Customer Metrics".to_string(), analyzer.customer_metrics()?),
        AnalysisKind::Correlation => ("Category Correlation".to_string(), analyzer.category_correlation()?),
    })
}

/// Names of the numeric columns of `df`, in order.
fn numeric_columns(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| DataProcessor::is_numeric(c.dtype()))
        .map(|c| c.name().to_string())
        .collect()
}

fn draw(visualizer: &DataVisualizer, results: &DataFrame, args: &Args, opts: ChartOptions) -> anyhow::Result<Figure> {
    let figure = match args.plot {
        PlotKind::Bar => visualizer.bar_chart(
            results,
            &opts,
            &BarOptions {
                horizontal: args.horizontal,
                ..Default::default()
            },
        )?,
        PlotKind::Line => visualizer.line_chart(results, &opts, &LineOptions::default())?,
        PlotKind::Pie => visualizer.pie_chart(results, &opts, &PieOptions::default())?,
        PlotKind::Heatmap => visualizer.heatmap(results, &opts, &HeatmapOptions::default())?,
        PlotKind::Histogram => {
            let column = args
                .x_column
                .clone()
                .filter(|c| results.get_column_index(c).is_some());
            let hist = HistogramOptions {
                column,
                ..Default::default()
            };
            visualizer.histogram(results, &opts, &hist)?
        }
        PlotKind::Box => visualizer.box_plot(results, &opts, &BoxOptions::default())?,
        PlotKind::Scatter => {
            let (x, y) = match (&args.x_column, &args.y_column) {
                (Some(x), Some(y)) => (x.clone(), y.clone()),
                _ => {
                    let numeric = numeric_columns(results);
                    if numeric.len() < 2 {
                        anyhow::bail!(
                            "Scatter plot requires --x-column and --y-column or a result with at least 2 numeric columns."
                        );
                    }
                    (numeric[0].clone(), numeric[1].clone())
                }
            };
            let opts = ChartOptions {
                xlabel: opts.xlabel.clone().or_else(|| Some(x.clone())),
                ylabel: opts.ylabel.clone().or_else(|| Some(y.clone())),
                ..opts
            };
            visualizer.scatter_plot(results, &x, &y, &opts, &ScatterOptions::default())?
        }
    };
    Ok(figure)
}

/// Open the rendered image with the system viewer.
fn display(path: &Path) {
    if let Err(e) = open::that(path) {
        warn!("Could not open {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["spend_analyzer", "data/transactions.csv"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.analysis, AnalysisKind::Summary);
        assert_eq!(args.plot, PlotKind::Bar);
        assert_eq!(args.frequency, Frequency::Month);
        assert_eq!(args.n_top, 5);
        assert!(args.category.is_empty());
        assert!(!args.no_display);

        let settings = args.settings().unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_flags_parse() {
        let args = parse(&[
            "-a",
            "time-series",
            "-f",
            "Q",
            "-p",
            "line",
            "--category",
            "food,travel",
            "--format",
            "svg",
            "--dpi",
            "150",
            "--segments",
            "4",
            "--no-display",
        ]);
        assert_eq!(args.analysis, AnalysisKind::TimeSeries);
        assert_eq!(args.frequency, Frequency::Quarter);
        assert_eq!(args.plot, PlotKind::Line);
        assert_eq!(args.category, vec!["food", "travel"]);

        let settings = args.settings().unwrap();
        assert_eq!(settings.format, ImageFormat::Svg);
        assert_eq!(settings.dpi, 150);
        assert_eq!(settings.n_segments, 4);
    }

    #[test]
    fn test_rejects_unknown_choices() {
        assert!(Args::try_parse_from(["spend_analyzer", "x.csv", "-a", "forecast"]).is_err());
        assert!(Args::try_parse_from(["spend_analyzer", "x.csv", "--format", "pdf"]).is_err());
        assert!(Args::try_parse_from(["spend_analyzer", "x.csv", "-f", "H"]).is_err());
        assert!(Args::try_parse_from(["spend_analyzer", "x.csv", "--style", "seaborn"]).is_err());
    }

    #[test]
    fn test_library_choices_parse_from_text() {
        let args = parse(&["-f", "w", "--style", "classic", "--format", "jpeg"]);
        assert_eq!(args.frequency, Frequency::Week);
        assert_eq!(args.style, Some(ChartStyle::Classic));
        assert_eq!(args.format, Some(ImageFormat::Jpg));
    }

    #[test]
    fn test_invalid_figsize_falls_back() {
        let args = parse(&["--figsize", "wide"]);
        assert_eq!(args.settings().unwrap().figsize, (10.0, 6.0));
        let args = parse(&["--figsize", "12,4.5"]);
        assert_eq!(args.settings().unwrap().figsize, (12.0, 4.5));
    }

    #[test]
    fn test_chart_title() {
        let args = parse(&["-a", "top-categories"]);
        assert_eq!(args.chart_title(), "Top Categories - transactions.csv");
        let args = parse(&["--title", "Mine"]);
        assert_eq!(args.chart_title(), "Mine");
        assert_eq!(AnalysisKind::CustomerSegments.title(), "Customer Segments");
    }

    #[test]
    fn test_default_labels() {
        let args = parse(&["-g", "customer_id"]);
        assert_eq!(
            args.default_labels(),
            (Some("customer_id".to_string()), Some("Amount".to_string()))
        );
        let args = parse(&["-p", "histogram", "--xlabel", "Spend"]);
        assert_eq!(
            args.default_labels(),
            (Some("Spend".to_string()), Some("Frequency".to_string()))
        );
        let args = parse(&["-p", "pie"]);
        assert_eq!(args.default_labels(), (None, None));
    }

    #[test]
    fn test_output_file_name() {
        let name = output_file_name(AnalysisKind::CustomerMetrics, ImageFormat::Jpg);
        assert!(name.starts_with("customer-metrics_"));
        assert!(name.ends_with(".jpg"));
        // customer-metrics_YYYYmmdd_HHMMSS.jpg
        assert_eq!(name.len(), "customer-metrics_".len() + 15 + 4);
    }
}
