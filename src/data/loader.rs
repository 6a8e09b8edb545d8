//! CSV Data Loader Module
//! Handles CSV loading, schema validation and filtering using Polars.

use crate::config::DEFAULT_REQUIRED_COLUMNS;
use crate::data::processor::{
    DataProcessor, ProcessorError, CATEGORY_COL, CUSTOMER_COL, DATE_COL,
};
use chrono::NaiveDateTime;
use log::{info, warn};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("No data loaded. Call load() first.")]
    NoData,
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Failed to load CSV: {0}")]
    CsvError(#[from] PolarsError),
    #[error(transparent)]
    Processing(#[from] ProcessorError),
}

/// Loads transaction CSV files and serves filtered views of the loaded table.
pub struct DataLoader {
    df: Option<DataFrame>,
    file_path: Option<PathBuf>,
    required_columns: Vec<String>,
    warnings: Vec<String>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self::with_required_columns(DEFAULT_REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect())
    }

    pub fn with_required_columns(required_columns: Vec<String>) -> Self {
        Self {
            df: None,
            file_path: None,
            required_columns,
            warnings: Vec::new(),
        }
    }

    /// Wrap an already cleaned table, such as the result of an earlier filter,
    /// so further filters narrow it down.
    pub fn from_frame(df: DataFrame) -> Self {
        Self {
            df: Some(df),
            ..Self::new()
        }
    }

    /// Load, validate and clean a CSV file.
    pub fn load(&mut self, file_path: impl AsRef<Path>) -> Result<&DataFrame, LoaderError> {
        let path = file_path.as_ref();
        if !path.is_file() {
            return Err(LoaderError::FileNotFound(path.to_path_buf()));
        }

        let df = LazyCsvReader::new(path)
            .with_infer_schema_length(Some(10000))
            .with_ignore_errors(true)
            .finish()?
            .collect()?;
        info!(
            "Read {} rows and {} columns from {}",
            df.height(),
            df.width(),
            path.display()
        );

        self.warnings.clear();
        self.validate(&df)?;
        let cleaned = DataProcessor::clean(df, &mut self.warnings)?;

        self.file_path = Some(path.to_path_buf());
        self.df = Some(cleaned);
        self.df.as_ref().ok_or(LoaderError::NoData)
    }

    /// Missing columns are fatal; missing values are only reported.
    fn validate(&mut self, df: &DataFrame) -> Result<(), LoaderError> {
        let missing: Vec<String> = self
            .required_columns
            .iter()
            .filter(|c| df.get_column_index(c).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(LoaderError::MissingColumns(missing));
        }

        for name in &self.required_columns {
            let nulls = df.column(name)?.null_count();
            if nulls > 0 {
                let msg = format!(
                    "Missing values in column '{}' ({} rows). These will be handled during cleaning.",
                    name, nulls
                );
                warn!("{}", msg);
                self.warnings.push(msg);
            }
        }
        Ok(())
    }

    /// Parse a filter bound; plain dates resolve to midnight.
    pub fn parse_date_bound(value: &str) -> Result<NaiveDateTime, LoaderError> {
        DataProcessor::parse_datetime(value).ok_or_else(|| LoaderError::InvalidDate(value.to_string()))
    }

    /// Rows whose date lies within `[start, end]`. Missing bounds are open.
    pub fn filter_by_date_range(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<DataFrame, LoaderError> {
        let df = self.get_loaded()?;
        if start.is_none() && end.is_none() {
            return Ok(df.clone());
        }

        let bound = |dt: NaiveDateTime| {
            lit(dt.and_utc().timestamp_millis()).cast(DataType::Datetime(TimeUnit::Milliseconds, None))
        };
        let mut predicate = lit(true);
        if let Some(start) = start {
            predicate = predicate.and(col(DATE_COL).gt_eq(bound(start)));
        }
        if let Some(end) = end {
            predicate = predicate.and(col(DATE_COL).lt_eq(bound(end)));
        }
        let filtered = DataProcessor::with_timestamps(df)?
            .lazy()
            .filter(predicate)
            .collect()?;
        Ok(filtered)
    }

    /// Rows whose category is one of `categories`.
    pub fn filter_by_category<S: AsRef<str>>(&self, categories: &[S]) -> Result<DataFrame, LoaderError> {
        self.filter_by_membership(CATEGORY_COL, categories)
    }

    /// Rows whose customer identifier is one of `customer_ids`.
    pub fn filter_by_customer<S: AsRef<str>>(&self, customer_ids: &[S]) -> Result<DataFrame, LoaderError> {
        self.filter_by_membership(CUSTOMER_COL, customer_ids)
    }

    fn filter_by_membership<S: AsRef<str>>(
        &self,
        column: &str,
        wanted: &[S],
    ) -> Result<DataFrame, LoaderError> {
        let df = self.get_loaded()?;
        let predicate = wanted.iter().fold(lit(false), |any, value| {
            let value: &str = value.as_ref();
            any.or(col(column).cast(DataType::String).eq(lit(value)))
        });
        let filtered = df.clone().lazy().filter(predicate).collect()?;
        Ok(filtered)
    }

    /// Unique categories in order of first appearance.
    pub fn unique_categories(&self) -> Result<Vec<String>, LoaderError> {
        self.unique_values(CATEGORY_COL)
    }

    /// Unique customer identifiers in order of first appearance.
    pub fn unique_customers(&self) -> Result<Vec<String>, LoaderError> {
        self.unique_values(CUSTOMER_COL)
    }

    fn unique_values(&self, column: &str) -> Result<Vec<String>, LoaderError> {
        let df = self.get_loaded()?;
        let unique = df
            .clone()
            .lazy()
            .select([col(column).cast(DataType::String)])
            .filter(col(column).is_not_null())
            .unique_stable(None, UniqueKeepStrategy::First)
            .collect()?;
        Ok(DataProcessor::strings(unique.column(column)?)?
            .into_iter()
            .flatten()
            .collect())
    }

    /// Earliest and latest timestamps; `None` when no date could be parsed.
    pub fn date_range(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, LoaderError> {
        let df = self.get_loaded()?;
        let dates = DataProcessor::timestamps(df.column(DATE_COL)?)?;
        let mut valid = dates.values.into_iter().flatten();
        let Some(first) = valid.next() else {
            return Ok(None);
        };
        Ok(Some(valid.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)))))
    }

    /// Get a reference to the loaded DataFrame.
    pub fn data(&self) -> Result<&DataFrame, LoaderError> {
        self.get_loaded()
    }

    pub fn file_path(&self) -> Option<&PathBuf> {
        self.file_path.as_ref()
    }

    /// Data-quality warnings from the last load.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn get_loaded(&self) -> Result<&DataFrame, LoaderError> {
        self.df.as_ref().ok_or(LoaderError::NoData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", body).unwrap();
        file
    }

    fn sample_csv() -> NamedTempFile {
        create_test_csv(
            "date,category,amount,customer_id,store\n\
             2023-01-01,groceries,100.50,C001,north\n\
             2023-01-02,electronics,250.75,C002,south\n\
             2023-01-03,groceries,75.25,C001,north\n\
             2023-01-04,clothing,125.00,C003,east\n\
             2023-01-05,electronics,300.00,C001,south\n\
             2023-01-06,groceries,50.00,C002,north\n",
        )
    }

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn test_load_sample() {
        let file = sample_csv();
        let mut loader = DataLoader::new();
        let df = loader.load(file.path()).unwrap();

        assert_eq!(df.height(), 6);
        assert!(df.get_column_index("store").is_some());
        assert!(loader.warnings().is_empty());
        assert_eq!(loader.file_path().map(|p| p.as_path()), Some(file.path()));
    }

    #[test]
    fn test_missing_file() {
        let mut loader = DataLoader::new();
        let err = loader.load("definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, LoaderError::FileNotFound(_)));
    }

    #[test]
    fn test_missing_columns_are_named() {
        let file = create_test_csv("date,amount\n2023-01-01,10\n");
        let mut loader = DataLoader::new();
        match loader.load(file.path()) {
            Err(LoaderError::MissingColumns(cols)) => {
                assert_eq!(cols, vec!["category".to_string(), "customer_id".to_string()]);
            }
            other => panic!("expected MissingColumns, got {:?}", other.map(|df| df.shape())),
        }
        assert!(matches!(loader.data(), Err(LoaderError::NoData)));
    }

    #[test]
    fn test_custom_required_columns() {
        let file = create_test_csv("date,amount\n2023-01-01,10\n");
        let mut loader = DataLoader::with_required_columns(vec!["date".into(), "amount".into()]);
        assert_eq!(loader.load(file.path()).unwrap().height(), 1);
    }

    #[test]
    fn test_missing_values_warn_but_load() {
        let file = create_test_csv(
            "date,category,amount,customer_id\n\
             2023-01-01,food,10,C1\n\
             2023-01-02,,oops,C2\n\
             bad-date,food,30,\n",
        );
        let mut loader = DataLoader::new();
        let df = loader.load(file.path()).unwrap();

        assert_eq!(df.column("amount").unwrap().null_count(), 0);
        assert_eq!(df.column("category").unwrap().null_count(), 0);
        assert_eq!(df.column("customer_id").unwrap().null_count(), 0);
        assert!(loader.warnings().iter().any(|w| w.contains("'category'")));
        assert!(loader.warnings().iter().any(|w| w.contains("parsing dates")));
    }

    #[test]
    fn test_filters_require_data() {
        let loader = DataLoader::new();
        assert!(matches!(loader.filter_by_category(&["a"]), Err(LoaderError::NoData)));
        assert!(matches!(loader.filter_by_customer(&["a"]), Err(LoaderError::NoData)));
        assert!(matches!(loader.filter_by_date_range(None, None), Err(LoaderError::NoData)));
        assert!(matches!(loader.unique_categories(), Err(LoaderError::NoData)));
        assert!(matches!(loader.date_range(), Err(LoaderError::NoData)));
    }

    #[test]
    fn test_filter_by_date_range_is_inclusive() {
        let file = sample_csv();
        let mut loader = DataLoader::new();
        loader.load(file.path()).unwrap();

        let filtered = loader.filter_by_date_range(Some(day(2)), Some(day(4))).unwrap();
        assert_eq!(filtered.height(), 3);

        let open_end = loader.filter_by_date_range(Some(day(5)), None).unwrap();
        assert_eq!(open_end.height(), 2);

        // the stored table is untouched
        assert_eq!(loader.data().unwrap().height(), 6);
    }

    #[test]
    fn test_filter_by_category_and_customer() {
        let file = sample_csv();
        let mut loader = DataLoader::new();
        loader.load(file.path()).unwrap();

        assert_eq!(loader.filter_by_category(&["groceries"]).unwrap().height(), 3);
        assert_eq!(
            loader.filter_by_category(&["groceries", "clothing"]).unwrap().height(),
            4
        );
        assert_eq!(loader.filter_by_customer(&["C002"]).unwrap().height(), 2);
        assert_eq!(loader.filter_by_customer(&["nobody"]).unwrap().height(), 0);
        let none: [&str; 0] = [];
        assert_eq!(loader.filter_by_category(&none).unwrap().height(), 0);
    }

    #[test]
    fn test_filters_compare_native_values() {
        let df = DataFrame::new(vec![
            DataProcessor::datetime_column(DATE_COL, &[Some(day(1)), None, Some(day(3))]).unwrap(),
            Column::new(CUSTOMER_COL.into(), [Some(7i64), Some(12), None]),
        ])
        .unwrap();
        let loader = DataLoader::from_frame(df);

        assert_eq!(loader.filter_by_customer(&["12"]).unwrap().height(), 1);
        // rows without a date only survive an unbounded range
        assert_eq!(loader.filter_by_date_range(Some(day(1)), None).unwrap().height(), 2);
        assert_eq!(loader.filter_by_date_range(None, None).unwrap().height(), 3);
        assert_eq!(loader.unique_customers().unwrap(), vec!["7", "12"]);
    }

    #[test]
    fn test_from_frame_chains_filters() {
        let file = sample_csv();
        let mut loader = DataLoader::new();
        loader.load(file.path()).unwrap();

        let groceries = DataLoader::from_frame(loader.filter_by_category(&["groceries"]).unwrap());
        let narrowed = groceries.filter_by_customer(&["C001"]).unwrap();
        assert_eq!(narrowed.height(), 2);
        assert!(groceries.file_path().is_none());
    }

    #[test]
    fn test_accessors() {
        let file = sample_csv();
        let mut loader = DataLoader::new();
        loader.load(file.path()).unwrap();

        assert_eq!(
            loader.unique_categories().unwrap(),
            vec!["groceries", "electronics", "clothing"]
        );
        assert_eq!(loader.unique_customers().unwrap(), vec!["C001", "C002", "C003"]);
        assert_eq!(loader.date_range().unwrap(), Some((day(1), day(6))));
    }

    #[test]
    fn test_parse_date_bound() {
        assert_eq!(DataLoader::parse_date_bound("2023-01-03").unwrap(), day(3));
        assert!(matches!(
            DataLoader::parse_date_bound("soon"),
            Err(LoaderError::InvalidDate(_))
        ));
    }
}
