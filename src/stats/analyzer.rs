//! Data Analyzer Module
//! Grouped aggregates, resampling, segmentation and correlation over a record table.

use crate::data::processor::{
    DataProcessor, ProcessorError, AMOUNT_COL, CATEGORY_COL, CUSTOMER_COL, DATE_COL,
};
use crate::stats::calculator::StatsCalculator;
use chrono::{Datelike, Days, NaiveDate};
use log::debug;
use polars::prelude::*;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("No data available for analysis.")]
    NoData,
    #[error("Column '{0}' not found in data.")]
    UnknownColumn(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error(transparent)]
    Processing(#[from] ProcessorError),
}

/// Resampling period. Periods are labelled by their last day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frequency {
    Day,
    /// Weeks ending on Sunday
    Week,
    #[default]
    Month,
    Quarter,
    Year,
}

impl Frequency {
    pub fn code(self) -> &'static str {
        match self {
            Frequency::Day => "D",
            Frequency::Week => "W",
            Frequency::Month => "M",
            Frequency::Quarter => "Q",
            Frequency::Year => "Y",
        }
    }

    /// Last day of the period containing `date`.
    pub fn period_end(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Frequency::Day => Some(date),
            Frequency::Week => {
                let to_sunday = 6 - date.weekday().num_days_from_monday();
                date.checked_add_days(Days::new(u64::from(to_sunday)))
            }
            Frequency::Month => month_end(date.year(), date.month()),
            Frequency::Quarter => month_end(date.year(), (date.month() - 1) / 3 * 3 + 3),
            Frequency::Year => NaiveDate::from_ymd_opt(date.year(), 12, 31),
        }
    }

    /// Period ends from the period holding `first` through the one holding `last`.
    pub fn periods(self, first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
        let mut periods = Vec::new();
        let Some(last) = self.period_end(last) else {
            return periods;
        };
        let mut current = self.period_end(first);
        while let Some(end) = current.filter(|end| *end <= last) {
            periods.push(end);
            current = end.succ_opt().and_then(|next| self.period_end(next));
        }
        periods
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Frequency {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "D" => Ok(Frequency::Day),
            "W" => Ok(Frequency::Week),
            "M" | "ME" => Ok(Frequency::Month),
            "Q" | "QE" => Ok(Frequency::Quarter),
            "Y" | "YE" | "A" => Ok(Frequency::Year),
            other => Err(AnalyzerError::InvalidArgument(format!(
                "unknown frequency '{}'",
                other
            ))),
        }
    }
}

fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let (y, m) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(y, m, 1)?.pred_opt()
}

/// Working column holding each row's period end.
const PERIOD_COL: &str = "period";
/// Working column holding each row's group key.
const GROUP_COL: &str = "group";

/// `preferred`, suffixed with `_` until it no longer clashes with any of `taken`.
fn free_name(preferred: &str, taken: &[String]) -> String {
    let mut name = preferred.to_string();
    while taken.iter().any(|t| *t == name) {
        name.push('_');
    }
    name
}

/// Sample standard deviation; null for fewer than two values.
fn sample_std(name: &str) -> Expr {
    when(col(name).count().gt(lit(1)))
        .then(col(name).std(1))
        .otherwise(lit(NULL).cast(DataType::Float64))
}

/// Sum `amount` per period, over every period from the first to the last one with data.
///
/// `rows` carries a Date `period` column and a Float64 `amount` column. Empty periods
/// in between sum to zero. The result has columns `date`, `amount`.
fn resample(rows: LazyFrame, freq: Frequency) -> Result<DataFrame, AnalyzerError> {
    let sums = rows
        .filter(col(PERIOD_COL).is_not_null())
        .group_by([col(PERIOD_COL)])
        .agg([col(AMOUNT_COL).sum()])
        .sort([PERIOD_COL], SortMultipleOptions::default())
        .collect()?;

    let found = DataProcessor::timestamps(sums.column(PERIOD_COL)?)?.values;
    let periods: Vec<Option<NaiveDate>> = match (found.first(), found.last()) {
        (Some(Some(first)), Some(Some(last))) => freq
            .periods(first.date(), last.date())
            .into_iter()
            .map(Some)
            .collect(),
        _ => Vec::new(),
    };

    let out = DataFrame::new(vec![DataProcessor::date_column(DATE_COL, &periods)?])?
        .lazy()
        .left_join(sums.lazy(), col(DATE_COL), col(PERIOD_COL))
        .select([col(DATE_COL), col(AMOUNT_COL).fill_null(lit(0.0))])
        .sort([DATE_COL], SortMultipleOptions::default())
        .collect()?;
    Ok(out)
}

/// Computes derived tables from a record table. The table is never modified.
#[derive(Debug, Clone, Default)]
pub struct DataAnalyzer {
    data: Option<DataFrame>,
}

impl DataAnalyzer {
    pub fn new(data: Option<DataFrame>) -> Self {
        Self { data }
    }

    pub fn set_data(&mut self, data: DataFrame) {
        self.data = Some(data);
    }

    pub fn data(&self) -> Option<&DataFrame> {
        self.data.as_ref()
    }

    fn validated(&self) -> Result<&DataFrame, AnalyzerError> {
        match &self.data {
            Some(df) if df.height() > 0 => Ok(df),
            _ => Err(AnalyzerError::NoData),
        }
    }

    fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, AnalyzerError> {
        df.column(name)
            .map_err(|_| AnalyzerError::UnknownColumn(name.to_string()))
    }

    fn require(df: &DataFrame, names: &[&str]) -> Result<(), AnalyzerError> {
        match names.iter().find(|name| df.get_column_index(name).is_none()) {
            Some(name) => Err(AnalyzerError::UnknownColumn(name.to_string())),
            None => Ok(()),
        }
    }

    /// Lazy view of `df` with `amount` as Float64.
    fn amounts(df: &DataFrame) -> LazyFrame {
        df.clone()
            .lazy()
            .with_column(col(AMOUNT_COL).cast(DataType::Float64))
    }

    /// Distinct non-null values of `column`, sorted on their own type, as text.
    fn sorted_keys(rows: LazyFrame, column: &str) -> Result<Vec<String>, AnalyzerError> {
        let keys = rows
            .filter(col(column).is_not_null())
            .group_by([col(column)])
            .agg([col(AMOUNT_COL).count()])
            .sort([column], SortMultipleOptions::default())
            .collect()?;
        Ok(DataProcessor::strings(keys.column(column)?)?
            .into_iter()
            .flatten()
            .collect())
    }

    /// Period end of every row's date as a Date column; unparseable dates stay null.
    fn period_column(df: &DataFrame, freq: Frequency) -> Result<Column, AnalyzerError> {
        let dates = DataProcessor::timestamps(Self::column(df, DATE_COL)?)?;
        let periods: Vec<Option<NaiveDate>> = dates
            .values
            .iter()
            .map(|d| d.and_then(|d| freq.period_end(d.date())))
            .collect();
        Ok(DataProcessor::date_column(PERIOD_COL, &periods)?)
    }

    /// Descriptive statistics of `amount`, overall or per group.
    ///
    /// Overall: columns `statistic`, `amount` with count, mean, std, min, 25%, 50%, 75%, max.
    /// Grouped: one row per group with count, mean, median, std, min, max, sum. Groups are
    /// ordered by key; the key column gets a trailing `_` if it clashes with a statistic.
    pub fn summary_statistics(&self, groupby: Option<&str>) -> Result<DataFrame, AnalyzerError> {
        let df = self.validated()?;

        let Some(by) = groupby else {
            let amounts: Vec<f64> = DataProcessor::floats(Self::column(df, AMOUNT_COL)?)?
                .into_iter()
                .flatten()
                .collect();
            let s = StatsCalculator::compute_descriptive_stats(&amounts);
            let out = DataFrame::new(vec![
                Column::new(
                    "statistic".into(),
                    ["count", "mean", "std", "min", "25%", "50%", "75%", "max"],
                ),
                Column::new(
                    AMOUNT_COL.into(),
                    [s.count as f64, s.mean, s.std, s.min, s.q25, s.median, s.q75, s.max],
                ),
            ])?;
            return Ok(out);
        };
        Self::require(df, &[by, AMOUNT_COL])?;

        let stats = ["count", "mean", "median", "std", "min", "max", "sum"].map(String::from);
        let label = free_name(by, &stats);
        let out = Self::amounts(df)
            .filter(col(by).is_not_null())
            .group_by([col(by).alias(label.as_str())])
            .agg([
                col(AMOUNT_COL).count().alias("count"),
                col(AMOUNT_COL).mean().alias("mean"),
                col(AMOUNT_COL).median().alias("median"),
                sample_std(AMOUNT_COL).alias("std"),
                col(AMOUNT_COL).min().alias("min"),
                col(AMOUNT_COL).max().alias("max"),
                col(AMOUNT_COL).sum().alias("sum"),
            ])
            .sort([label.as_str()], SortMultipleOptions::default())
            .collect()?;
        Ok(out)
    }

    /// Sum `amount` per period.
    ///
    /// Without grouping: columns `date`, `amount`. With grouping: a period column plus one
    /// column per group, each resampled over its own span and aligned on the union of
    /// periods. The period column is `date` unless a group carries that name.
    pub fn time_series(
        &self,
        frequency: Frequency,
        groupby: Option<&str>,
    ) -> Result<DataFrame, AnalyzerError> {
        let df = self.validated()?;
        Self::require(df, &[DATE_COL, AMOUNT_COL])?;
        let mut columns = vec![
            Self::period_column(df, frequency)?,
            df.column(AMOUNT_COL)?.clone(),
        ];

        let Some(by) = groupby else {
            let rows = DataFrame::new(columns)?
                .lazy()
                .with_column(col(AMOUNT_COL).cast(DataType::Float64));
            return resample(rows, frequency);
        };
        Self::require(df, &[by])?;

        let mut key = df.column(by)?.clone();
        key.rename(GROUP_COL.into());
        columns.push(key);
        let rows = DataFrame::new(columns)?
            .lazy()
            .with_column(col(AMOUNT_COL).cast(DataType::Float64))
            .filter(col(PERIOD_COL).is_not_null());

        let names = Self::sorted_keys(rows.clone(), GROUP_COL)?;
        if names.is_empty() {
            return Ok(DataFrame::empty());
        }

        let groups = names
            .iter()
            .map(|name| {
                let group = rows
                    .clone()
                    .filter(col(GROUP_COL).cast(DataType::String).eq(lit(name.as_str())));
                resample(group, frequency)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let label = free_name(DATE_COL, &names);
        let periods: Vec<LazyFrame> = groups
            .iter()
            .map(|g| g.clone().lazy().select([col(DATE_COL).alias(label.as_str())]))
            .collect();
        let mut aligned = concat(periods, UnionArgs::default())?
            .unique_stable(None, UniqueKeepStrategy::First);
        for (name, group) in names.iter().zip(groups) {
            let series = group.lazy().select([
                col(DATE_COL).alias(label.as_str()),
                col(AMOUNT_COL).alias(name.as_str()),
            ]);
            aligned = aligned.left_join(series, col(label.as_str()), col(label.as_str()));
        }
        let out = aligned
            .sort([label.as_str()], SortMultipleOptions::default())
            .collect()?;
        debug!(
            "Resampled {} groups over {} periods ({})",
            names.len(),
            out.height(),
            frequency
        );
        Ok(out)
    }

    /// Total `amount` per value of `by`, largest first; ties keep key order.
    pub fn spending_distribution(&self, by: &str) -> Result<DataFrame, AnalyzerError> {
        let df = self.validated()?;
        Self::require(df, &[by, AMOUNT_COL])?;

        let label = free_name(by, &[AMOUNT_COL.to_string()]);
        let out = Self::amounts(df)
            .filter(col(by).is_not_null())
            .group_by([col(by).alias(label.as_str())])
            .agg([col(AMOUNT_COL).sum()])
            .sort_by_exprs(
                [col(AMOUNT_COL), col(label.as_str())],
                SortMultipleOptions::default().with_order_descending_multi([true, false]),
            )
            .collect()?;
        Ok(out)
    }

    /// The `n` categories with the highest total amount.
    pub fn top_spending_categories(&self, n: usize) -> Result<DataFrame, AnalyzerError> {
        Ok(self.spending_distribution(CATEGORY_COL)?.head(Some(n)))
    }

    /// Rank customers by total spend and split them into `n_segments` contiguous buckets.
    ///
    /// Bucket size is `customers / n_segments` (floor) and the last bucket takes the
    /// remainder. With fewer customers than segments every customer gets its own segment.
    pub fn segment_customers(&self, n_segments: usize) -> Result<DataFrame, AnalyzerError> {
        if n_segments == 0 {
            return Err(AnalyzerError::InvalidArgument(
                "n_segments must be at least 1".to_string(),
            ));
        }
        let df = self.validated()?;
        Self::require(df, &[CUSTOMER_COL, AMOUNT_COL])?;

        let mut totals = Self::amounts(df)
            .filter(col(CUSTOMER_COL).is_not_null())
            .group_by([col(CUSTOMER_COL)])
            .agg([col(AMOUNT_COL).sum()])
            .sort_by_exprs(
                [col(AMOUNT_COL), col(CUSTOMER_COL)],
                SortMultipleOptions::default().with_order_descending_multi([true, false]),
            )
            .collect()?;

        let count = totals.height();
        let (size, segments) = match count / n_segments {
            0 => (1, count),
            size => (size, n_segments),
        };
        let labels: Vec<String> = (0..count)
            .map(|i| format!("Segment {}", (i / size).min(segments.saturating_sub(1)) + 1))
            .collect();
        totals.with_column(Column::new("segment".into(), labels))?;
        Ok(totals)
    }

    /// Per-customer transaction count, spend statistics, activity span and purchase frequency.
    pub fn customer_metrics(&self) -> Result<DataFrame, AnalyzerError> {
        let df = self.validated()?;
        Self::require(df, &[CUSTOMER_COL, AMOUNT_COL, DATE_COL])?;

        let dated = DataProcessor::with_timestamps(df)?;
        let mut metrics = Self::amounts(&dated)
            .filter(col(CUSTOMER_COL).is_not_null())
            .group_by([col(CUSTOMER_COL)])
            .agg([
                col(AMOUNT_COL).count().alias("amount_count"),
                col(AMOUNT_COL).sum().alias("amount_sum"),
                col(AMOUNT_COL).mean().alias("amount_mean"),
                col(AMOUNT_COL).median().alias("amount_median"),
                sample_std(AMOUNT_COL).alias("amount_std"),
                col(DATE_COL).min().alias("date_min"),
                col(DATE_COL).max().alias("date_max"),
            ])
            .sort([CUSTOMER_COL], SortMultipleOptions::default())
            .collect()?;

        let first = DataProcessor::timestamps(metrics.column("date_min")?)?.values;
        let last = DataProcessor::timestamps(metrics.column("date_max")?)?.values;
        let days_active: Vec<Option<i64>> = first
            .iter()
            .zip(&last)
            .map(|(f, l)| match (f, l) {
                (Some(f), Some(l)) => Some((*l - *f).num_days()),
                _ => None,
            })
            .collect();
        metrics.with_column(Column::new("days_active".into(), days_active))?;

        let count = || col("amount_count").cast(DataType::Float64);
        let out = metrics
            .lazy()
            .with_column(
                when(col("days_active").gt(lit(0)))
                    .then(count() / col("days_active").cast(DataType::Float64))
                    .otherwise(count())
                    .alias("frequency"),
            )
            .collect()?;
        Ok(out)
    }

    /// Pearson correlation between categories of per-customer spend.
    ///
    /// The matrix is square with a label column followed by one column per category, both
    /// in ascending order. The label column is `category` unless a category carries that
    /// name. The diagonal is 1.0.
    pub fn category_correlation(&self) -> Result<DataFrame, AnalyzerError> {
        let df = self.validated()?;
        Self::require(df, &[CUSTOMER_COL, CATEGORY_COL, AMOUNT_COL])?;

        let rows = Self::amounts(df).filter(
            col(CUSTOMER_COL)
                .is_not_null()
                .and(col(CATEGORY_COL).is_not_null()),
        );
        let names = Self::sorted_keys(rows.clone(), CATEGORY_COL)?;
        let label = free_name(CATEGORY_COL, &names);
        if names.is_empty() {
            return Ok(DataFrame::new(vec![Column::new(
                label.into(),
                Vec::<String>::new(),
            )])?);
        }

        // customer x category spend; pairs without purchases sum to zero
        let spend_of = |i: usize| format!("spend_{}", i);
        let per_category: Vec<Expr> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                col(AMOUNT_COL)
                    .filter(col(CATEGORY_COL).cast(DataType::String).eq(lit(name.as_str())))
                    .sum()
                    .alias(spend_of(i))
            })
            .collect();
        let pivot = rows
            .group_by([col(CUSTOMER_COL)])
            .agg(per_category)
            .collect()?;
        let spend = (0..names.len())
            .map(|i| -> Result<Vec<f64>, AnalyzerError> {
                let values = DataProcessor::floats(pivot.column(&spend_of(i))?)?;
                Ok(values.into_iter().map(|v| v.unwrap_or(0.0)).collect())
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut columns = vec![Column::new(label.into(), names.clone())];
        for (j, name) in names.iter().enumerate() {
            let values: Vec<f64> = (0..names.len())
                .map(|i| {
                    if i == j {
                        1.0
                    } else {
                        StatsCalculator::pearson(&spend[i], &spend[j])
                    }
                })
                .collect();
            columns.push(Column::new(name.as_str().into(), values));
        }
        Ok(DataFrame::new(columns)?)
    }
}
