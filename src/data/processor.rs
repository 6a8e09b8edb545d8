//! Data Processor Module
//! Column conversions shared by the loader and analyzer: date parsing,
//! amount coercion and missing-value imputation.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::warn;
use polars::prelude::*;
use std::collections::HashMap;
use thiserror::Error;

pub const DATE_COL: &str = "date";
pub const CATEGORY_COL: &str = "category";
pub const AMOUNT_COL: &str = "amount";
pub const CUSTOMER_COL: &str = "customer_id";

/// Placeholder for identifiers and labels that cannot be imputed.
pub const UNKNOWN: &str = "UNKNOWN";

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
}

/// Timestamps extracted from a column, with the number of values that could not be parsed.
#[derive(Debug, Clone, Default)]
pub struct ParsedDates {
    pub values: Vec<Option<NaiveDateTime>>,
    pub unparsed: usize,
}

/// Handles data cleaning and type coercion.
pub struct DataProcessor;

impl DataProcessor {
    /// Clean a freshly loaded table.
    ///
    /// Every data-quality problem is pushed onto `warnings` and logged; none of them is fatal.
    pub fn clean(mut df: DataFrame, warnings: &mut Vec<String>) -> Result<DataFrame, ProcessorError> {
        let mut report = |msg: String| {
            warn!("{}", msg);
            warnings.push(msg);
        };

        if df.get_column_index(DATE_COL).is_some() {
            let parsed = Self::timestamps(df.column(DATE_COL)?)?;
            if parsed.unparsed > 0 {
                report(format!(
                    "Error parsing dates: {} value(s) in '{}' could not be parsed",
                    parsed.unparsed, DATE_COL
                ));
            }
            df.with_column(Self::datetime_column(DATE_COL, &parsed.values)?)?;
        }

        if df.get_column_index(AMOUNT_COL).is_some() {
            let raw = df.column(AMOUNT_COL)?;
            let before = raw.null_count();
            let amounts = Self::floats(raw)?;
            let coerced = amounts.iter().filter(|v| v.is_none()).count() - before;
            if coerced > 0 {
                report(format!(
                    "{} non-numeric value(s) in '{}' treated as missing",
                    coerced, AMOUNT_COL
                ));
            }

            let present: Vec<f64> = amounts.iter().flatten().copied().collect();
            let fill = if present.is_empty() {
                if !amounts.is_empty() {
                    report(format!("Column '{}' has no numeric values; filled with 0", AMOUNT_COL));
                }
                0.0
            } else {
                present.iter().sum::<f64>() / present.len() as f64
            };
            let filled: Vec<f64> = amounts.iter().map(|v| v.unwrap_or(fill)).collect();
            df.with_column(Column::new(AMOUNT_COL.into(), filled))?;
        }

        if df.get_column_index(CATEGORY_COL).is_some() {
            let categories = Self::strings(df.column(CATEGORY_COL)?)?;
            let mode = Self::mode(&categories).unwrap_or_else(|| UNKNOWN.to_string());
            let filled: Vec<String> = categories
                .into_iter()
                .map(|c| c.unwrap_or_else(|| mode.clone()))
                .collect();
            df.with_column(Column::new(CATEGORY_COL.into(), filled))?;
        }

        if df.get_column_index(CUSTOMER_COL).is_some() {
            let filled: Vec<String> = Self::strings(df.column(CUSTOMER_COL)?)?
                .into_iter()
                .map(|c| c.unwrap_or_else(|| UNKNOWN.to_string()))
                .collect();
            df.with_column(Column::new(CUSTOMER_COL.into(), filled))?;
        }

        Ok(df)
    }

    /// Parse a single date or date-time string.
    ///
    /// Plain dates resolve to midnight.
    pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.naive_utc());
        }
        for fmt in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
                return Some(dt);
            }
        }
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    /// Extract timestamps from a column of any type.
    ///
    /// Date and Datetime columns are converted directly, anything else is parsed as text.
    pub fn timestamps(column: &Column) -> Result<ParsedDates, ProcessorError> {
        match column.dtype() {
            DataType::Date | DataType::Datetime(_, _) => {
                let millis = column
                    .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
                    .cast(&DataType::Int64)?;
                let values = millis
                    .i64()?
                    .into_iter()
                    .map(|ms| ms.and_then(Self::from_millis))
                    .collect();
                Ok(ParsedDates { values, unparsed: 0 })
            }
            _ => {
                let text = column.cast(&DataType::String)?;
                let mut unparsed = 0;
                let values = text
                    .str()?
                    .into_iter()
                    .map(|v| {
                        let v = v?;
                        let parsed = Self::parse_datetime(v);
                        if parsed.is_none() {
                            unparsed += 1;
                        }
                        parsed
                    })
                    .collect();
                Ok(ParsedDates { values, unparsed })
            }
        }
    }

    /// Copy of `df` whose date column is a millisecond Datetime, parsing text dates if needed.
    pub fn with_timestamps(df: &DataFrame) -> Result<DataFrame, ProcessorError> {
        let mut out = df.clone();
        let column = df.column(DATE_COL)?;
        if column.dtype() != &DataType::Datetime(TimeUnit::Milliseconds, None) {
            let parsed = Self::timestamps(column)?;
            out.with_column(Self::datetime_column(DATE_COL, &parsed.values)?)?;
        }
        Ok(out)
    }

    /// Build a millisecond Datetime column.
    pub fn datetime_column(
        name: &str,
        values: &[Option<NaiveDateTime>],
    ) -> Result<Column, ProcessorError> {
        let millis: Vec<Option<i64>> = values
            .iter()
            .map(|v| v.map(|dt| dt.and_utc().timestamp_millis()))
            .collect();
        let column = Column::new(name.into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
        Ok(column)
    }

    /// Build a Date column.
    pub fn date_column(name: &str, values: &[Option<NaiveDate>]) -> Result<Column, ProcessorError> {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
        let days: Vec<Option<i32>> = values
            .iter()
            .map(|v| v.map(|d| (d - epoch).num_days() as i32))
            .collect();
        Ok(Column::new(name.into(), days).cast(&DataType::Date)?)
    }

    pub fn from_millis(ms: i64) -> Option<NaiveDateTime> {
        DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
    }

    /// Numeric view of a column; values that do not convert become `None`.
    pub fn floats(column: &Column) -> Result<Vec<Option<f64>>, ProcessorError> {
        let numeric = column.cast(&DataType::Float64)?;
        Ok(numeric
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect())
    }

    /// Text view of a column.
    pub fn strings(column: &Column) -> Result<Vec<Option<String>>, ProcessorError> {
        let text = column.cast(&DataType::String)?;
        Ok(text
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect())
    }

    /// Most frequent value; ties resolve to the lexicographically smallest.
    pub fn mode(values: &[Option<String>]) -> Option<String> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for v in values.iter().flatten() {
            *counts.entry(v.as_str()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
            .map(|(v, _)| v.to_string())
    }

    pub fn is_numeric(dtype: &DataType) -> bool {
        matches!(
            dtype,
            DataType::Float32
                | DataType::Float64
                | DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new(
                DATE_COL.into(),
                vec![Some("2023-01-01"), Some("2023-01-02 10:30:00"), Some("not a date"), None],
            ),
            Column::new(
                CATEGORY_COL.into(),
                vec![Some("food"), None, Some("food"), Some("travel")],
            ),
            Column::new(
                AMOUNT_COL.into(),
                vec![Some("10"), Some("abc"), Some("30"), None],
            ),
            Column::new(CUSTOMER_COL.into(), vec![Some(1i64), Some(2), None, Some(1)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_clean_imputes_and_coerces() {
        let mut warnings = Vec::new();
        let df = DataProcessor::clean(raw_frame(), &mut warnings).unwrap();

        let amounts: Vec<f64> = df.column(AMOUNT_COL).unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(amounts, vec![10.0, 20.0, 30.0, 20.0]);

        let categories = DataProcessor::strings(df.column(CATEGORY_COL).unwrap()).unwrap();
        assert_eq!(categories[1].as_deref(), Some("food"));

        let customers = DataProcessor::strings(df.column(CUSTOMER_COL).unwrap()).unwrap();
        assert_eq!(customers[2].as_deref(), Some(UNKNOWN));
        assert_eq!(customers[0].as_deref(), Some("1"));

        assert!(matches!(df.column(DATE_COL).unwrap().dtype(), DataType::Datetime(_, _)));
        assert_eq!(df.column(DATE_COL).unwrap().null_count(), 2);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_clean_is_idempotent() {
        let mut warnings = Vec::new();
        let once = DataProcessor::clean(raw_frame(), &mut warnings).unwrap();
        let mut again_warnings = Vec::new();
        let twice = DataProcessor::clean(once.clone(), &mut again_warnings).unwrap();
        assert!(once.equals_missing(&twice));
    }

    #[test]
    fn test_parse_datetime_formats() {
        let midnight = NaiveDate::from_ymd_opt(2023, 3, 4).unwrap().and_hms_opt(0, 0, 0);
        assert_eq!(DataProcessor::parse_datetime("2023-03-04"), midnight);
        assert_eq!(DataProcessor::parse_datetime("03/04/2023"), midnight);
        assert_eq!(DataProcessor::parse_datetime("2023/03/04"), midnight);
        assert_eq!(
            DataProcessor::parse_datetime("2023-03-04T08:15:00Z"),
            NaiveDate::from_ymd_opt(2023, 3, 4).unwrap().and_hms_opt(8, 15, 0)
        );
        assert_eq!(DataProcessor::parse_datetime("yesterday"), None);
        assert_eq!(DataProcessor::parse_datetime(""), None);
    }

    #[test]
    fn test_mode_tie_breaks_lexicographically() {
        let values = vec![
            Some("b".to_string()),
            Some("a".to_string()),
            None,
            Some("b".to_string()),
            Some("a".to_string()),
        ];
        assert_eq!(DataProcessor::mode(&values).as_deref(), Some("a"));
        assert_eq!(DataProcessor::mode(&[None]), None);
    }

    #[test]
    fn test_with_timestamps_parses_text_dates() {
        let df = raw_frame();
        let dated = DataProcessor::with_timestamps(&df).unwrap();
        let dates = dated.column(DATE_COL).unwrap();
        assert_eq!(dates.dtype(), &DataType::Datetime(TimeUnit::Milliseconds, None));
        assert_eq!(dates.null_count(), 2);
        assert_eq!(df.column(DATE_COL).unwrap().dtype(), &DataType::String);
    }
}
