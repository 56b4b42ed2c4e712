//! Request validation: input presence and shape, minimum history, store whitelist.

use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

use super::observation::{label_text, Observation};
use crate::errors::ServiceError;

pub const MIN_STORE_NBR: u32 = 1;
pub const MAX_STORE_NBR: u32 = 54;

/// Minimum encoder history the model requires plus a default horizon
pub const DEFAULT_MIN_HISTORY: usize = 37;
pub const DEFAULT_FORECAST_DAYS: usize = 7;

pub const TIMESERIES_FIELD: &str = "timeseries";
pub const FORECAST_DAYS_FIELD: &str = "forecast_days";
pub const STORE_FIELD: &str = "store_nbr";

/// Stores the model was trained on. Compared as text: "01" and "1.0" are not members.
static VALID_STORE_NBRS: Lazy<HashSet<String>> = Lazy::new(|| {
    (MIN_STORE_NBR..=MAX_STORE_NBR)
        .map(|n| n.to_string())
        .collect()
});

pub fn valid_store_nbrs() -> impl Iterator<Item = &'static str> {
    let mut stores: Vec<&'static str> = VALID_STORE_NBRS.iter().map(String::as_str).collect();
    stores.sort_by_key(|s| s.parse::<u32>().unwrap_or(u32::MAX));
    stores.into_iter()
}

pub fn is_valid_store(label: &str) -> bool {
    VALID_STORE_NBRS.contains(label)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub min_history: usize,
    pub default_forecast_days: usize,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_history: DEFAULT_MIN_HISTORY,
            default_forecast_days: DEFAULT_FORECAST_DAYS,
        }
    }
}

/// A request that passed the client-facing checks
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub observations: Vec<Observation>,
    pub forecast_days: usize,
}

/// Validates a raw forecast body.
///
/// Presence, length and store checks are client errors (400). Everything
/// after them (row shapes, field types, the horizon) surfaces as a 500 with
/// the underlying message.
pub fn validate_request(
    body: &Value,
    policy: &ValidationPolicy,
) -> Result<ValidatedRequest, ServiceError> {
    let fields = body
        .as_object()
        .ok_or(ServiceError::MissingField(TIMESERIES_FIELD))?;

    let raw = fields
        .get(TIMESERIES_FIELD)
        .ok_or(ServiceError::MissingField(TIMESERIES_FIELD))?;

    let rows = raw
        .as_array()
        .filter(|rows| rows.len() >= policy.min_history)
        .ok_or(ServiceError::InsufficientHistory(policy.min_history))?;

    let records = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            row.as_object().ok_or_else(|| {
                ServiceError::InvalidObservation(format!(
                    "{}[{}] must be an object, got {}",
                    TIMESERIES_FIELD, idx, row
                ))
            })
        })
        .collect::<Result<Vec<&Map<String, Value>>, _>>()?;

    check_store_numbers(&records)?;

    let forecast_days = forecast_days(fields, policy)?;

    let observations = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            Observation::deserialize(row).map_err(|e| {
                ServiceError::InvalidObservation(format!("{}[{}]: {}", TIMESERIES_FIELD, idx, e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ValidatedRequest {
        observations,
        forecast_days,
    })
}

fn check_store_numbers(records: &[&Map<String, Value>]) -> Result<(), ServiceError> {
    let invalid = records.iter().any(|record| {
        let label = record
            .get(STORE_FIELD)
            .map(label_text)
            .unwrap_or_else(|| label_text(&Value::Null));
        !is_valid_store(&label)
    });

    if invalid {
        Err(ServiceError::InvalidStoreNumber)
    } else {
        Ok(())
    }
}

fn forecast_days(
    fields: &Map<String, Value>,
    policy: &ValidationPolicy,
) -> Result<usize, ServiceError> {
    match fields.get(FORECAST_DAYS_FIELD) {
        None => Ok(policy.default_forecast_days),
        Some(value) => value
            .as_u64()
            .filter(|days| *days > 0)
            .and_then(|days| usize::try_from(days).ok())
            .ok_or_else(|| {
                ServiceError::Dataset(format!(
                    "{} must be a positive integer, got {}",
                    FORECAST_DAYS_FIELD, value
                ))
            }),
    }
}
