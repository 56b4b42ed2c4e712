//! Feature builder and future-row synthesizer.
//!
//! Turns validated observations into rows carrying the time index and calendar
//! fields, then appends placeholder rows for the forecast horizon.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;

use super::observation::Observation;
use crate::errors::ServiceError;

/// Column names shared by the feature builder, the dataset layout and the model schema
pub mod columns {
    pub const TIME_IDX: &str = "time_idx";
    pub const TARGET: &str = "log_unit_sales";
    pub const STORE_NBR: &str = "store_nbr";
    pub const ITEM_NBR: &str = "item_nbr";
    pub const IS_ONPROMOTION: &str = "is_onpromotion";
    pub const IS_HOLIDAY: &str = "is_holiday";
    pub const TRANSACTIONS: &str = "transactions";
    pub const DAY: &str = "day";
    pub const MONTH: &str = "month";
    pub const YEAR: &str = "year";
    pub const WEEKDAY: &str = "weekday";
}

/// Reference date for the time index used during training
pub static DEFAULT_TIME_IDX_EPOCH: Lazy<NaiveDate> =
    Lazy::new(|| NaiveDate::from_ymd_opt(2013, 1, 1).unwrap_or_default());

/// An observation enriched with time index and calendar fields
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub time_idx: i64,
    pub store_nbr: String,
    pub item_nbr: String,
    pub is_onpromotion: String,
    pub is_holiday: String,
    pub transactions: f64,
    pub log_unit_sales: f64,
    pub day: u32,
    pub month: u32,
    /// Monday = 0 .. Sunday = 6
    pub weekday: u32,
    pub year: i32,
    /// Placeholder row for a future day; its target is not a real label
    pub synthetic: bool,
}

impl FeatureRow {
    pub fn from_observation(obs: &Observation, epoch: NaiveDate) -> Result<Self, ServiceError> {
        let date = parse_date(&obs.date)?;
        let mut row = FeatureRow {
            date,
            time_idx: 0,
            store_nbr: obs.store_nbr.clone(),
            item_nbr: obs.item_nbr.clone(),
            is_onpromotion: obs.is_onpromotion.clone(),
            is_holiday: obs.is_holiday.clone(),
            transactions: obs.transactions,
            log_unit_sales: obs.log_unit_sales,
            day: 0,
            month: 0,
            weekday: 0,
            year: 0,
            synthetic: false,
        };
        row.set_date(date, epoch);
        Ok(row)
    }

    fn set_date(&mut self, date: NaiveDate, epoch: NaiveDate) {
        self.date = date;
        self.time_idx = time_index(date, epoch);
        self.day = date.day();
        self.month = date.month();
        self.weekday = date.weekday().num_days_from_monday();
        self.year = date.year();
    }

    /// Numeric value of a real-valued column, if this row carries it
    pub fn real(&self, column: &str) -> Option<f64> {
        match column {
            columns::TIME_IDX => Some(self.time_idx as f64),
            columns::TARGET => Some(self.log_unit_sales),
            columns::TRANSACTIONS => Some(self.transactions),
            columns::DAY => Some(f64::from(self.day)),
            columns::MONTH => Some(f64::from(self.month)),
            columns::YEAR => Some(f64::from(self.year)),
            columns::WEEKDAY => Some(f64::from(self.weekday)),
            _ => None,
        }
    }

    /// Label of a categorical column, if this row carries it
    pub fn categorical(&self, column: &str) -> Option<&str> {
        match column {
            columns::STORE_NBR => Some(&self.store_nbr),
            columns::ITEM_NBR => Some(&self.item_nbr),
            columns::IS_ONPROMOTION => Some(&self.is_onpromotion),
            columns::IS_HOLIDAY => Some(&self.is_holiday),
            _ => None,
        }
    }
}

/// Whole days elapsed since `epoch`
pub fn time_index(date: NaiveDate, epoch: NaiveDate) -> i64 {
    date.signed_duration_since(epoch).num_days()
}

/// Parses `YYYY-MM-DD`; full timestamps are accepted and truncated to their date.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ServiceError> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed).map(|dt| dt.date_naive()))
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .map_err(|e| ServiceError::InvalidObservation(format!("invalid date '{}': {}", raw, e)))
}

pub fn build_features(
    observations: &[Observation],
    epoch: NaiveDate,
) -> Result<Vec<FeatureRow>, ServiceError> {
    observations
        .iter()
        .map(|obs| FeatureRow::from_observation(obs, epoch))
        .collect()
}

/// Builds `forecast_days` placeholder rows following the latest observation.
///
/// Each row copies the chronologically last row (the later input row wins a
/// date tie), advances the date by `i` days, recomputes time index and
/// calendar fields and zeroes the target.
pub fn synthesize_future_rows(
    history: &[FeatureRow],
    forecast_days: usize,
    epoch: NaiveDate,
) -> Result<Vec<FeatureRow>, ServiceError> {
    let last = history
        .iter()
        .max_by_key(|row| row.date)
        .ok_or_else(|| ServiceError::Dataset("cannot extend an empty history".to_string()))?;

    (1..=forecast_days)
        .map(|offset| {
            let date = last
                .date
                .checked_add_days(Days::new(offset as u64))
                .ok_or_else(|| {
                    ServiceError::Dataset(format!(
                        "date overflow {} days after {}",
                        offset, last.date
                    ))
                })?;
            let mut row = last.clone();
            row.set_date(date, epoch);
            row.log_unit_sales = 0.0;
            row.synthetic = true;
            Ok(row)
        })
        .collect()
}

/// Historical rows followed by the synthesized horizon
pub fn extend_with_future(
    mut history: Vec<FeatureRow>,
    forecast_days: usize,
    epoch: NaiveDate,
) -> Result<Vec<FeatureRow>, ServiceError> {
    let future = synthesize_future_rows(&history, forecast_days, epoch)?;
    tracing::debug!(
        historical = history.len(),
        synthesized = future.len(),
        "appending placeholder rows with zero target"
    );
    history.extend(future);
    Ok(history)
}
