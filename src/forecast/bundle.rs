use std::path::Path;
use std::sync::Arc;

use super::dataset::{check_horizon, Windower};
use super::features::{build_features, extend_with_future};
use super::model::{inputs, predict_all, ForecastModel, ModelInfo};
use super::onnx::OnnxForecastModel;
use super::schema::{BundleError, DatasetSpec, ModelSchema, SALES_DATASET};
use super::validation::ValidatedRequest;
use crate::errors::ServiceError;

/// A model together with the schema it was trained against.
///
/// Built once at startup and shared read-only between requests.
pub struct ModelBundle {
    schema: ModelSchema,
    model: Arc<dyn ForecastModel>,
}

impl std::fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBundle")
            .field("schema", &self.schema.name)
            .field("model", &self.model.describe())
            .finish()
    }
}

impl ModelBundle {
    /// Loads `schema.json` and the ONNX export, then runs the startup checks.
    pub fn load(
        model_path: impl AsRef<Path>,
        schema_path: impl AsRef<Path>,
        min_history: usize,
    ) -> Result<Self, BundleError> {
        let schema = ModelSchema::from_path(schema_path.as_ref())?;
        schema.check_against(&SALES_DATASET, min_history)?;
        let model = OnnxForecastModel::load(model_path.as_ref(), &schema)?;
        Self::new(schema, Arc::new(model), min_history)
    }

    pub fn new(
        schema: ModelSchema,
        model: Arc<dyn ForecastModel>,
        min_history: usize,
    ) -> Result<Self, BundleError> {
        Self::with_dataset(schema, model, &SALES_DATASET, min_history)
    }

    pub fn with_dataset(
        schema: ModelSchema,
        model: Arc<dyn ForecastModel>,
        dataset: &DatasetSpec,
        min_history: usize,
    ) -> Result<Self, BundleError> {
        schema.check_against(dataset, min_history)?;
        check_input_widths(&schema, &model.describe())?;
        Ok(Self { schema, model })
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn describe(&self) -> ModelInfo {
        self.model.describe()
    }

    /// Runs the full pipeline for a validated request.
    pub fn forecast(&self, request: &ValidatedRequest) -> Result<Vec<Vec<f64>>, ServiceError> {
        check_horizon(&self.schema, request.forecast_days)?;

        let epoch = self.schema.time_idx_epoch;
        let history = build_features(&request.observations, epoch)?;
        let rows = extend_with_future(history, request.forecast_days, epoch)?;
        let windows = Windower::new(&self.schema).windows(&rows, request.forecast_days)?;
        predict_all(self.model.as_ref(), &windows)
    }
}

fn check_input_widths(schema: &ModelSchema, info: &ModelInfo) -> Result<(), BundleError> {
    let expected = [
        (inputs::ENCODER_CONT, schema.reals.len()),
        (inputs::DECODER_CONT, schema.reals.len()),
        (inputs::ENCODER_CAT, schema.categoricals.len()),
        (inputs::DECODER_CAT, schema.categoricals.len()),
    ];
    for (name, width) in expected {
        if let Some(found) = info.input(name).and_then(|input| input.feature_width) {
            if found != width {
                return Err(BundleError::Mismatch(format!(
                    "model input '{}' has {} features, schema declares {}",
                    name, found, width
                )));
            }
        }
    }
    Ok(())
}
