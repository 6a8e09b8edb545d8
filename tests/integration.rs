//! Integration tests for Spend Analyzer

use clap::Parser;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use polars::prelude::*;
use pretty_assertions::assert_eq;
use spend_analyzer::charts::{BarOptions, HeatmapOptions, LineOptions, Plot};
use spend_analyzer::data::processor::DataProcessor;
use spend_analyzer::{run, Args, ChartOptions, DataAnalyzer, DataLoader, DataVisualizer, Frequency, LoaderError};
use std::collections::HashSet;
use std::io::Write;
use tempfile::NamedTempFile;

fn fonts_available() -> bool {
    FontDesc::new(FontFamily::SansSerif, 12.0, FontStyle::Normal)
        .box_size("x")
        .is_ok()
}

/// Create a test CSV file with sample transactions
fn create_test_csv() -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "date,category,amount,customer_id,channel").unwrap();

    // C001 - regular shopper
    writeln!(file, "2023-01-05,groceries,82.40,C001,store").unwrap();
    writeln!(file, "2023-01-19,groceries,64.10,C001,store").unwrap();
    writeln!(file, "2023-02-11,electronics,499.99,C001,online").unwrap();
    writeln!(file, "2023-03-02,groceries,71.80,C001,store").unwrap();

    // C002 - occasional big spender
    writeln!(file, "2023-01-22,electronics,1200.00,C002,online").unwrap();
    writeln!(file, "2023-03-15,travel,860.00,C002,online").unwrap();

    // C003 - one purchase only
    writeln!(file, "2023-02-14,clothing,120.00,C003,store").unwrap();

    // C004 - missing amount, imputed on load
    writeln!(file, "2023-02-20,groceries,,C004,store").unwrap();
    writeln!(file, "2023-03-28,clothing,45.50,C004,online").unwrap();

    // C005 - small purchases
    writeln!(file, "2023-01-09,travel,35.00,C005,online").unwrap();
    writeln!(file, "2023-03-30,groceries,22.25,C005,store").unwrap();

    file
}

fn loaded() -> (NamedTempFile, DataLoader) {
    let file = create_test_csv();
    let mut loader = DataLoader::new();
    loader.load(file.path()).unwrap();
    (file, loader)
}

fn strings(df: &DataFrame, name: &str) -> Vec<String> {
    DataProcessor::strings(df.column(name).unwrap())
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap())
        .collect()
}

fn floats(df: &DataFrame, name: &str) -> Vec<f64> {
    DataProcessor::floats(df.column(name).unwrap())
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect()
}

#[test]
fn test_missing_columns_fail_with_names() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "date,value").unwrap();
    writeln!(file, "2023-01-01,4").unwrap();

    let mut loader = DataLoader::new();
    match loader.load(file.path()) {
        Err(LoaderError::MissingColumns(missing)) => {
            assert_eq!(missing, vec!["category", "amount", "customer_id"]);
        }
        other => panic!("expected missing columns, got {:?}", other.map(|df| df.shape())),
    }
}

#[test]
fn test_imputation_preserves_mean() {
    let (_file, loader) = loaded();
    let df = loader.data().unwrap();
    let amounts = floats(df, "amount");
    assert!(amounts.iter().all(|v| v.is_finite()));

    let known = [
        82.40, 64.10, 499.99, 71.80, 1200.00, 860.00, 120.00, 45.50, 35.00, 22.25,
    ];
    let known_mean = known.iter().sum::<f64>() / known.len() as f64;
    let mean = amounts.iter().sum::<f64>() / amounts.len() as f64;
    assert!((mean - known_mean).abs() < 1e-9);
    assert!(loader.warnings().iter().any(|w| w.contains("'amount'")));
}

#[test]
fn test_top_categories_sorted_and_bounded() {
    let (_file, loader) = loaded();
    let analyzer = DataAnalyzer::new(Some(loader.data().unwrap().clone()));

    for n in [1, 3, 10] {
        let top = analyzer.top_spending_categories(n).unwrap();
        assert_eq!(top.height(), n.min(4));
        let totals = floats(&top, "amount");
        assert!(totals.windows(2).all(|w| w[0] >= w[1]));
    }
    let top = analyzer.top_spending_categories(1).unwrap();
    assert_eq!(strings(&top, "category"), vec!["electronics"]);
}

#[test]
fn test_segments_partition_customers() {
    let (_file, loader) = loaded();
    let analyzer = DataAnalyzer::new(Some(loader.data().unwrap().clone()));
    let segments = analyzer.segment_customers(3).unwrap();

    let customers = strings(&segments, "customer_id");
    let unique: HashSet<&String> = customers.iter().collect();
    assert_eq!(unique.len(), customers.len());
    let expected: HashSet<String> = loader.unique_customers().unwrap().into_iter().collect();
    assert_eq!(unique.into_iter().cloned().collect::<HashSet<_>>(), expected);

    // 5 customers, 3 segments: sizes 1, 1, 3
    let labels = strings(&segments, "segment");
    assert_eq!(
        labels,
        vec!["Segment 1", "Segment 2", "Segment 3", "Segment 3", "Segment 3"]
    );

    let again = analyzer.segment_customers(3).unwrap();
    assert!(again.equals(&segments));
}

#[test]
fn test_correlation_matrix_shape() {
    let (_file, loader) = loaded();
    let analyzer = DataAnalyzer::new(Some(loader.data().unwrap().clone()));
    let corr = analyzer.category_correlation().unwrap();

    let names = strings(&corr, "category");
    assert_eq!(names, vec!["clothing", "electronics", "groceries", "travel"]);
    assert_eq!(corr.width(), names.len() + 1);
    for (i, row_name) in names.iter().enumerate() {
        let row = floats(&corr, row_name);
        assert_eq!(row[i], 1.0);
        for (j, col_name) in names.iter().enumerate() {
            let mirrored = floats(&corr, col_name)[i];
            if row[j].is_nan() {
                assert!(mirrored.is_nan());
            } else {
                assert!((row[j] - mirrored).abs() < 1e-12);
            }
        }
    }
}

#[test]
fn test_date_filter_round_trip() {
    let (_file, loader) = loaded();
    let start = DataLoader::parse_date_bound("2023-02-01").unwrap();
    let end = DataLoader::parse_date_bound("2023-02-28").unwrap();

    let filtered = DataLoader::from_frame(loader.filter_by_date_range(Some(start), Some(end)).unwrap());
    let (lo, hi) = filtered.date_range().unwrap().unwrap();
    assert!(lo >= start && hi <= end);
    assert_eq!(filtered.data().unwrap().height(), 3);
}

#[test]
fn test_distribution_example() {
    let df = df!(
        "date" => ["2023-01-01", "2023-01-02", "2023-01-03"],
        "category" => ["A", "A", "B"],
        "amount" => [100.0, 50.0, 30.0],
        "customer_id" => ["C1", "C2", "C1"]
    )
    .unwrap();
    let analyzer = DataAnalyzer::new(Some(df));

    let dist = analyzer.spending_distribution("category").unwrap();
    assert_eq!(strings(&dist, "category"), vec!["A", "B"]);
    assert_eq!(floats(&dist, "amount"), vec![150.0, 30.0]);

    let top = analyzer.top_spending_categories(1).unwrap();
    assert_eq!(floats(&top, "amount"), vec![150.0]);
}

#[test]
fn test_single_purchase_customer_metrics() {
    let (_file, loader) = loaded();
    let analyzer = DataAnalyzer::new(Some(loader.data().unwrap().clone()));
    let metrics = analyzer.customer_metrics().unwrap();

    let ids = strings(&metrics, "customer_id");
    let c003 = ids.iter().position(|id| id == "C003").unwrap();
    assert_eq!(floats(&metrics, "days_active")[c003], 0.0);
    assert_eq!(floats(&metrics, "frequency")[c003], 1.0);
}

#[test]
fn test_analysis_tables_feed_charts() {
    let (_file, loader) = loaded();
    let analyzer = DataAnalyzer::new(Some(loader.data().unwrap().clone()));
    let viz = DataVisualizer::default();
    let opts = ChartOptions::default();

    let monthly = analyzer.time_series(Frequency::Month, None).unwrap();
    let line = viz.line_chart(&monthly, &opts, &LineOptions::default()).unwrap();
    let Plot::Line { labels, .. } = &line.plot else {
        panic!("expected line chart");
    };
    assert_eq!(labels, &vec!["2023-01-31", "2023-02-28", "2023-03-31"]);

    let grouped = analyzer.summary_statistics(Some("category")).unwrap();
    let bar = viz.bar_chart(&grouped, &opts, &BarOptions::default()).unwrap();
    let Plot::Bar { series, .. } = &bar.plot else {
        panic!("expected bar chart");
    };
    assert_eq!(series.len(), 7);

    let corr = analyzer.category_correlation().unwrap();
    let heat = viz.heatmap(&corr, &opts, &HeatmapOptions::default()).unwrap();
    assert_eq!(heat.figsize, (8.0, 6.0));
}

#[test]
fn test_run_without_output_does_not_save() {
    let file = create_test_csv();
    let path = file.path().to_string_lossy().into_owned();
    let args = Args::try_parse_from(["spend_analyzer", path.as_str(), "-a", "distribution", "--no-display"]).unwrap();

    let report = run(&args).unwrap();
    assert_eq!(report.results.height(), 4);
    assert!(report.saved_to.is_none());
    let figure = report.figure.unwrap();
    assert_eq!(figure.xlabel.as_deref(), Some("Category"));
    assert!(figure.title.unwrap().starts_with("Distribution - "));
}

#[test]
fn test_run_applies_filters_in_sequence() {
    let file = create_test_csv();
    let path = file.path().to_string_lossy().into_owned();
    let args = Args::try_parse_from([
        "spend_analyzer",
        path.as_str(),
        "-a",
        "customer-metrics",
        "--category",
        "groceries,travel",
        "--customer",
        "C005",
        "--no-display",
    ])
    .unwrap();

    let report = run(&args).unwrap();
    assert_eq!(strings(&report.results, "customer_id"), vec!["C005"]);
    assert_eq!(floats(&report.results, "amount_count"), vec![2.0]);
}

#[test]
fn test_run_missing_file_fails() {
    let args = Args::try_parse_from(["spend_analyzer", "no/such/file.csv", "--no-display"]).unwrap();
    let err = run(&args).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LoaderError>(),
        Some(LoaderError::FileNotFound(_))
    ));
}

#[test]
fn test_run_saves_chart_to_output_dir() {
    if !fonts_available() {
        return;
    }
    let file = create_test_csv();
    let out = tempfile::tempdir().unwrap();
    let out_dir = out.path().join("charts");
    let path = file.path().to_string_lossy().into_owned();
    let out_str = out_dir.to_string_lossy().into_owned();
    let args = Args::try_parse_from([
        "spend_analyzer",
        path.as_str(),
        "-a",
        "correlation",
        "-p",
        "heatmap",
        "-o",
        out_str.as_str(),
        "--format",
        "svg",
        "--dpi",
        "72",
        "--no-display",
    ])
    .unwrap();

    let report = run(&args).unwrap();
    let saved = report.saved_to.unwrap();
    assert!(saved.starts_with(&out_dir));
    let name = saved.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("correlation_"));
    assert!(name.ends_with(".svg"));
    let svg = std::fs::read_to_string(&saved).unwrap();
    assert!(svg.contains("groceries"));
}
