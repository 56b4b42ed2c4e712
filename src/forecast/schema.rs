//! Model schema shipped next to the ONNX export.
//!
//! The schema records how the training dataset laid out its features: column
//! orders, categorical vocabularies, scalers and the target normalizer. It is
//! checked at startup against [`DatasetSpec`], the layout this service builds.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::features::{columns, DEFAULT_TIME_IDX_EPOCH};
use super::validation::valid_store_nbrs;
use crate::errors::ServiceError;

/// Errors raised while loading or checking a model bundle
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("schema does not match dataset layout: {0}")]
    Mismatch(String),
    #[error("model load failed: {0}")]
    ModelLoad(String),
}

/// Fitted `(x - center) / scale` transform for one real column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub center: f64,
    pub scale: f64,
}

impl Scaler {
    pub fn apply(&self, value: f64) -> f64 {
        (value - self.center) / self.scale
    }
}

/// How the target is normalized inside each window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetNormalizer {
    /// Mean and standard deviation of the encoder targets
    #[default]
    Encoder,
    /// Center 0, scale 1
    Identity,
}

fn default_epoch() -> NaiveDate {
    *DEFAULT_TIME_IDX_EPOCH
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub time_idx: String,
    pub target: String,
    pub group_ids: Vec<String>,
    pub max_encoder_length: usize,
    /// Defaults to `max_encoder_length`
    #[serde(default)]
    pub min_encoder_length: Option<usize>,
    /// Longest horizon the export supports; unbounded when absent
    #[serde(default)]
    pub max_prediction_length: Option<usize>,
    #[serde(default = "default_epoch")]
    pub time_idx_epoch: NaiveDate,
    pub reals: Vec<String>,
    pub categoricals: Vec<String>,
    #[serde(default)]
    pub static_categoricals: Vec<String>,
    #[serde(default)]
    pub time_varying_known_categoricals: Vec<String>,
    #[serde(default)]
    pub time_varying_known_reals: Vec<String>,
    #[serde(default)]
    pub time_varying_unknown_reals: Vec<String>,
    /// Vocabulary per categorical column; the position of a label is its code
    pub categorical_encoders: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub scalers: BTreeMap<String, Scaler>,
    #[serde(default)]
    pub target_normalizer: TargetNormalizer,
    #[serde(default)]
    pub quantiles: Vec<f64>,
    #[serde(default)]
    pub median_quantile_index: Option<usize>,
    #[serde(default = "default_true")]
    pub add_relative_time_idx: bool,
    #[serde(default = "default_true")]
    pub add_target_scales: bool,
    #[serde(default = "default_true")]
    pub add_encoder_length: bool,
    #[serde(skip)]
    label_index: HashMap<String, HashMap<String, i64>>,
}

impl ModelSchema {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BundleError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| BundleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let schema: ModelSchema =
            serde_json::from_slice(&raw).map_err(|source| BundleError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        schema.indexed()
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, BundleError> {
        let schema: ModelSchema = serde_json::from_value(value)
            .map_err(|e| BundleError::InvalidSchema(e.to_string()))?;
        schema.indexed()
    }

    fn indexed(mut self) -> Result<Self, BundleError> {
        if self.max_encoder_length == 0 {
            return Err(BundleError::InvalidSchema(
                "max_encoder_length must be positive".to_string(),
            ));
        }
        if self.min_encoder_length() > self.max_encoder_length {
            return Err(BundleError::InvalidSchema(format!(
                "min_encoder_length {} exceeds max_encoder_length {}",
                self.min_encoder_length(),
                self.max_encoder_length
            )));
        }
        if let Some(0) = self.max_prediction_length {
            return Err(BundleError::InvalidSchema(
                "max_prediction_length must be positive".to_string(),
            ));
        }
        for (column, scaler) in &self.scalers {
            if !scaler.scale.is_finite() || scaler.scale <= 0.0 || !scaler.center.is_finite() {
                return Err(BundleError::InvalidSchema(format!(
                    "scaler for '{}' must have a finite center and a positive scale",
                    column
                )));
            }
        }
        if let Some(idx) = self.median_quantile_index {
            if idx >= self.quantiles.len() {
                return Err(BundleError::InvalidSchema(format!(
                    "median_quantile_index {} out of range for {} quantiles",
                    idx,
                    self.quantiles.len()
                )));
            }
        }

        let mut label_index = HashMap::with_capacity(self.categorical_encoders.len());
        for (column, vocabulary) in &self.categorical_encoders {
            let mut codes = HashMap::with_capacity(vocabulary.len());
            for (code, label) in vocabulary.iter().enumerate() {
                if codes.insert(label.clone(), code as i64).is_some() {
                    return Err(BundleError::InvalidSchema(format!(
                        "duplicate label '{}' in vocabulary of '{}'",
                        label, column
                    )));
                }
            }
            label_index.insert(column.clone(), codes);
        }
        self.label_index = label_index;
        Ok(self)
    }

    pub fn min_encoder_length(&self) -> usize {
        self.min_encoder_length.unwrap_or(self.max_encoder_length)
    }

    /// Column of the point forecast in a quantile output
    pub fn point_index(&self) -> usize {
        self.median_quantile_index
            .unwrap_or(self.quantiles.len() / 2)
    }

    pub fn scaler(&self, column: &str) -> Option<&Scaler> {
        self.scalers.get(column)
    }

    pub fn target_center_column(&self) -> String {
        format!("{}_center", self.target)
    }

    pub fn target_scale_column(&self) -> String {
        format!("{}_scale", self.target)
    }

    /// Integer code of `label` in the vocabulary of `column`
    pub fn encode(&self, column: &str, label: &str) -> Result<i64, ServiceError> {
        self.label_index
            .get(column)
            .and_then(|codes| codes.get(label))
            .copied()
            .ok_or_else(|| ServiceError::unknown_category(column, label))
    }

    /// Verifies that this schema describes the dataset `spec` builds and that
    /// every request passing validation can be windowed.
    pub fn check_against(&self, spec: &DatasetSpec, min_history: usize) -> Result<(), BundleError> {
        expect_eq("time_idx", &self.time_idx, spec.time_idx)?;
        expect_eq("target", &self.target, spec.target)?;
        expect_list("group_ids", &self.group_ids, spec.group_ids)?;
        expect_list(
            "static_categoricals",
            &self.static_categoricals,
            spec.static_categoricals,
        )?;
        expect_list(
            "time_varying_known_categoricals",
            &self.time_varying_known_categoricals,
            spec.time_varying_known_categoricals,
        )?;
        expect_list(
            "time_varying_known_reals",
            &self.time_varying_known_reals,
            spec.time_varying_known_reals,
        )?;
        expect_list(
            "time_varying_unknown_reals",
            &self.time_varying_unknown_reals,
            spec.time_varying_unknown_reals,
        )?;

        let flags = [
            ("add_relative_time_idx", self.add_relative_time_idx, spec.add_relative_time_idx),
            ("add_target_scales", self.add_target_scales, spec.add_target_scales),
            ("add_encoder_length", self.add_encoder_length, spec.add_encoder_length),
        ];
        for (name, found, expected) in flags {
            if found != expected {
                return Err(BundleError::Mismatch(format!(
                    "{} is {}, expected {}",
                    name, found, expected
                )));
            }
        }

        if self.reals != spec.reals() {
            return Err(BundleError::Mismatch(format!(
                "reals {:?}, expected {:?}",
                self.reals,
                spec.reals()
            )));
        }
        if self.categoricals != spec.categoricals() {
            return Err(BundleError::Mismatch(format!(
                "categoricals {:?}, expected {:?}",
                self.categoricals,
                spec.categoricals()
            )));
        }

        for column in &self.categoricals {
            match self.categorical_encoders.get(column) {
                Some(vocabulary) if !vocabulary.is_empty() => {}
                _ => {
                    return Err(BundleError::Mismatch(format!(
                        "no vocabulary for categorical '{}'",
                        column
                    )))
                }
            }
        }

        let missing_stores: Vec<&str> = valid_store_nbrs()
            .filter(|store| self.encode(columns::STORE_NBR, store).is_err())
            .collect();
        if !missing_stores.is_empty() {
            return Err(BundleError::Mismatch(format!(
                "accepted stores missing from the store_nbr vocabulary: {}",
                missing_stores.join(", ")
            )));
        }

        for column in self.scalers.keys() {
            if !self.reals.contains(column) {
                return Err(BundleError::Mismatch(format!(
                    "scaler declared for unknown real '{}'",
                    column
                )));
            }
        }

        if self.max_encoder_length != spec.max_encoder_length {
            return Err(BundleError::Mismatch(format!(
                "max_encoder_length {}, expected {}",
                self.max_encoder_length, spec.max_encoder_length
            )));
        }
        if min_history < self.max_encoder_length {
            return Err(BundleError::Mismatch(format!(
                "min_history {} is shorter than the encoder length {}",
                min_history, self.max_encoder_length
            )));
        }

        Ok(())
    }
}

fn expect_eq(name: &str, found: &str, expected: &str) -> Result<(), BundleError> {
    if found == expected {
        Ok(())
    } else {
        Err(BundleError::Mismatch(format!(
            "{} is '{}', expected '{}'",
            name, found, expected
        )))
    }
}

fn expect_list(name: &str, found: &[String], expected: &[&str]) -> Result<(), BundleError> {
    if found.iter().map(String::as_str).eq(expected.iter().copied()) {
        Ok(())
    } else {
        Err(BundleError::Mismatch(format!(
            "{} is {:?}, expected {:?}",
            name, found, expected
        )))
    }
}

/// Dataset layout the service builds for the model.
#[derive(Debug, Clone, Copy)]
pub struct DatasetSpec {
    pub time_idx: &'static str,
    pub target: &'static str,
    pub group_ids: &'static [&'static str],
    pub max_encoder_length: usize,
    pub static_categoricals: &'static [&'static str],
    pub time_varying_known_categoricals: &'static [&'static str],
    pub time_varying_unknown_categoricals: &'static [&'static str],
    pub time_varying_known_reals: &'static [&'static str],
    pub time_varying_unknown_reals: &'static [&'static str],
    pub add_relative_time_idx: bool,
    pub add_target_scales: bool,
    pub add_encoder_length: bool,
}

pub const ENCODER_LENGTH_COLUMN: &str = "encoder_length";
pub const RELATIVE_TIME_IDX_COLUMN: &str = "relative_time_idx";

/// Layout of the Favorita sales model
pub const SALES_DATASET: DatasetSpec = DatasetSpec {
    time_idx: columns::TIME_IDX,
    target: columns::TARGET,
    group_ids: &[columns::STORE_NBR, columns::ITEM_NBR],
    max_encoder_length: 30,
    static_categoricals: &[columns::STORE_NBR, columns::ITEM_NBR],
    time_varying_known_categoricals: &[columns::IS_ONPROMOTION, columns::IS_HOLIDAY],
    time_varying_unknown_categoricals: &[],
    time_varying_known_reals: &[
        columns::TIME_IDX,
        columns::DAY,
        columns::MONTH,
        columns::YEAR,
        columns::WEEKDAY,
        columns::TRANSACTIONS,
    ],
    time_varying_unknown_reals: &[columns::TARGET],
    add_relative_time_idx: true,
    add_target_scales: true,
    add_encoder_length: true,
};

impl DatasetSpec {
    /// Real columns in model order: static reals, known reals, unknown reals.
    pub fn reals(&self) -> Vec<String> {
        let mut reals = Vec::new();
        if self.add_target_scales {
            reals.push(format!("{}_center", self.target));
            reals.push(format!("{}_scale", self.target));
        }
        if self.add_encoder_length {
            reals.push(ENCODER_LENGTH_COLUMN.to_string());
        }
        reals.extend(self.time_varying_known_reals.iter().map(|c| c.to_string()));
        if self.add_relative_time_idx {
            reals.push(RELATIVE_TIME_IDX_COLUMN.to_string());
        }
        reals.extend(self.time_varying_unknown_reals.iter().map(|c| c.to_string()));
        reals
    }

    pub fn categoricals(&self) -> Vec<String> {
        self.static_categoricals
            .iter()
            .chain(self.time_varying_known_categoricals)
            .chain(self.time_varying_unknown_categoricals)
            .map(|c| c.to_string())
            .collect()
    }
}
