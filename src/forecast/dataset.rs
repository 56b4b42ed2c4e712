//! Grouping and windowing of feature rows into model inputs.
//!
//! One prediction window is cut per `(store_nbr, item_nbr)` group: the decoder
//! covers the last `horizon` rows of the group and the encoder up to
//! `max_encoder_length` rows before them.

use std::collections::BTreeMap;
use std::fmt;

use super::features::FeatureRow;
use super::schema::{ModelSchema, TargetNormalizer, ENCODER_LENGTH_COLUMN, RELATIVE_TIME_IDX_COLUMN};
use crate::errors::ServiceError;

/// Smallest positive float16 increment, added to the encoder scale
pub const SCALE_EPSILON: f64 = 9.765625e-4;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub store_nbr: String,
    pub item_nbr: String,
}

impl GroupKey {
    fn of(row: &FeatureRow) -> Self {
        Self {
            store_nbr: row.store_nbr.clone(),
            item_nbr: row.item_nbr.clone(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store_nbr={}, item_nbr={}", self.store_nbr, self.item_nbr)
    }
}

/// Encoded model input for one group
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub key: GroupKey,
    pub encoder_length: usize,
    pub decoder_length: usize,
    /// `[encoder_length][n_reals]`
    pub encoder_cont: Vec<Vec<f32>>,
    /// `[encoder_length][n_categoricals]`
    pub encoder_cat: Vec<Vec<i64>>,
    pub decoder_cont: Vec<Vec<f32>>,
    pub decoder_cat: Vec<Vec<i64>>,
    /// `[center, scale]` of the target normalizer
    pub target_scale: [f32; 2],
    /// Number of decoder rows that are placeholders
    pub synthetic_steps: usize,
}

impl Window {
    pub fn n_reals(&self) -> usize {
        self.encoder_cont.first().map_or(0, Vec::len)
    }

    pub fn n_categoricals(&self) -> usize {
        self.encoder_cat.first().map_or(0, Vec::len)
    }

    /// Row-major copy of a `[rows][width]` matrix
    pub fn flatten<T: Copy>(matrix: &[Vec<T>]) -> Vec<T> {
        matrix.iter().flatten().copied().collect()
    }
}

pub struct Windower<'a> {
    schema: &'a ModelSchema,
}

impl<'a> Windower<'a> {
    pub fn new(schema: &'a ModelSchema) -> Self {
        Self { schema }
    }

    /// Cuts one window per group, ordered by group key.
    pub fn windows(&self, rows: &[FeatureRow], horizon: usize) -> Result<Vec<Window>, ServiceError> {
        check_horizon(self.schema, horizon)?;

        let mut groups: BTreeMap<GroupKey, Vec<&FeatureRow>> = BTreeMap::new();
        for row in rows {
            groups.entry(GroupKey::of(row)).or_default().push(row);
        }

        groups
            .into_iter()
            .map(|(key, mut group)| {
                group.sort_by_key(|row| row.time_idx);
                check_contiguous(&key, &group)?;
                self.window(key, &group, horizon)
            })
            .collect()
    }

    fn window(
        &self,
        key: GroupKey,
        group: &[&FeatureRow],
        horizon: usize,
    ) -> Result<Window, ServiceError> {
        let max_encoder = self.schema.max_encoder_length;
        let min_encoder = self.schema.min_encoder_length().max(1);
        let available = group.len().saturating_sub(horizon);
        if available < min_encoder {
            return Err(ServiceError::Dataset(format!(
                "group ({}) has {} rows, needs at least {} encoder rows plus {} prediction rows",
                key,
                group.len(),
                min_encoder,
                horizon
            )));
        }

        let encoder_length = available.min(max_encoder);
        let start = available - encoder_length;
        let encoder = &group[start..available];
        let decoder = &group[available..];

        let (center, scale) = self.target_scale(encoder);

        let positions = encoder.iter().chain(decoder.iter()).enumerate();
        let mut cont = Vec::with_capacity(encoder.len() + decoder.len());
        let mut cat = Vec::with_capacity(encoder.len() + decoder.len());
        for (position, row) in positions {
            cont.push(self.encode_reals(row, position, encoder_length, center, scale)?);
            cat.push(self.encode_categoricals(row)?);
        }
        let decoder_cont = cont.split_off(encoder_length);
        let decoder_cat = cat.split_off(encoder_length);

        let synthetic_steps = decoder.iter().filter(|row| row.synthetic).count();
        tracing::debug!(
            group = %key,
            encoder_length,
            decoder_length = decoder.len(),
            synthetic_steps,
            center,
            scale,
            "window built"
        );

        Ok(Window {
            key,
            encoder_length,
            decoder_length: decoder.len(),
            encoder_cont: cont,
            encoder_cat: cat,
            decoder_cont,
            decoder_cat,
            target_scale: [center as f32, scale as f32],
            synthetic_steps,
        })
    }

    fn target_scale(&self, encoder: &[&FeatureRow]) -> (f64, f64) {
        match self.schema.target_normalizer {
            TargetNormalizer::Identity => (0.0, 1.0),
            TargetNormalizer::Encoder => {
                let values: Vec<f64> = encoder.iter().map(|row| row.log_unit_sales).collect();
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                // sample standard deviation, zero for a single observation
                let std = if values.len() > 1 {
                    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
                } else {
                    0.0
                };
                (mean, std + SCALE_EPSILON)
            }
        }
    }

    fn encode_reals(
        &self,
        row: &FeatureRow,
        position: usize,
        encoder_length: usize,
        center: f64,
        scale: f64,
    ) -> Result<Vec<f32>, ServiceError> {
        let max_encoder = self.schema.max_encoder_length as f64;
        let center_column = self.schema.target_center_column();
        let scale_column = self.schema.target_scale_column();

        self.schema
            .reals
            .iter()
            .map(|column| {
                let value = if *column == self.schema.target {
                    (row.log_unit_sales - center) / scale
                } else if column.as_str() == ENCODER_LENGTH_COLUMN {
                    (encoder_length as f64 - 0.5 * max_encoder) / max_encoder * 2.0
                } else if column.as_str() == RELATIVE_TIME_IDX_COLUMN {
                    (position as f64 - encoder_length as f64) / max_encoder
                } else {
                    let raw = if *column == center_column {
                        center
                    } else if *column == scale_column {
                        scale
                    } else {
                        row.real(column).ok_or_else(|| {
                            ServiceError::Dataset(format!("no real-valued column '{}'", column))
                        })?
                    };
                    self.schema
                        .scaler(column)
                        .map_or(raw, |scaler| scaler.apply(raw))
                };
                Ok(value as f32)
            })
            .collect()
    }

    fn encode_categoricals(&self, row: &FeatureRow) -> Result<Vec<i64>, ServiceError> {
        self.schema
            .categoricals
            .iter()
            .map(|column| {
                let label = row.categorical(column).ok_or_else(|| {
                    ServiceError::Dataset(format!("no categorical column '{}'", column))
                })?;
                self.schema.encode(column, label)
            })
            .collect()
    }
}

/// Rejects horizons the model cannot produce.
///
/// Cheap enough to run before any placeholder rows are built.
pub fn check_horizon(schema: &ModelSchema, horizon: usize) -> Result<(), ServiceError> {
    if horizon == 0 {
        return Err(ServiceError::Dataset(
            "max_prediction_length must be positive".to_string(),
        ));
    }
    match schema.max_prediction_length {
        Some(max) if horizon > max => Err(ServiceError::Dataset(format!(
            "forecast_days {} exceeds the model's maximum prediction length {}",
            horizon, max
        ))),
        _ => Ok(()),
    }
}

fn check_contiguous(key: &GroupKey, group: &[&FeatureRow]) -> Result<(), ServiceError> {
    for pair in group.windows(2) {
        let step = pair[1].time_idx - pair[0].time_idx;
        if step == 0 {
            return Err(ServiceError::Dataset(format!(
                "duplicate time_idx {} ({}) in group ({})",
                pair[1].time_idx, pair[1].date, key
            )));
        }
        if step > 1 {
            return Err(ServiceError::Dataset(format!(
                "time difference larger than 1 between {} and {} in group ({})",
                pair[0].date, pair[1].date, key
            )));
        }
    }
    Ok(())
}
