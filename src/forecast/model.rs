use serde::Serialize;
use utoipa::ToSchema;

use super::dataset::Window;
use crate::errors::ServiceError;

/// Graph input names expected from a forecasting export
pub mod inputs {
    pub const ENCODER_CONT: &str = "encoder_cont";
    pub const ENCODER_CAT: &str = "encoder_cat";
    pub const DECODER_CONT: &str = "decoder_cont";
    pub const DECODER_CAT: &str = "decoder_cat";
    pub const ENCODER_LENGTHS: &str = "encoder_lengths";
    pub const DECODER_LENGTHS: &str = "decoder_lengths";
    pub const TARGET_SCALE: &str = "target_scale";

    pub const ALL: [&str; 7] = [
        ENCODER_CONT,
        ENCODER_CAT,
        DECODER_CONT,
        DECODER_CAT,
        ENCODER_LENGTHS,
        DECODER_LENGTHS,
        TARGET_SCALE,
    ];
}

/// One graph input and the size of its last axis when it is fixed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ModelInput {
    pub name: String,
    pub feature_width: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ModelInfo {
    #[schema(example = "tft-favorita")]
    pub name: String,
    #[schema(example = "2024.06")]
    pub version: String,
    #[schema(example = "tract-onnx")]
    pub backend: String,
    pub inputs: Vec<ModelInput>,
}

impl ModelInfo {
    pub fn input(&self, name: &str) -> Option<&ModelInput> {
        self.inputs.iter().find(|input| input.name == name)
    }
}

/// A loaded forecasting model.
///
/// Implementations must be deterministic: the same window always yields the
/// same forecast.
pub trait ForecastModel: Send + Sync {
    fn describe(&self) -> ModelInfo;

    /// Point forecast for each decoder step of `window`
    fn predict(&self, window: &Window) -> Result<Vec<f32>, ServiceError>;
}

/// Runs the model over every window, preserving window order.
pub fn predict_all(
    model: &dyn ForecastModel,
    windows: &[Window],
) -> Result<Vec<Vec<f64>>, ServiceError> {
    windows
        .iter()
        .map(|window| {
            let forecast = model.predict(window)?;
            if forecast.len() != window.decoder_length {
                return Err(ServiceError::Model(format!(
                    "model returned {} steps for group ({}), expected {}",
                    forecast.len(),
                    window.key,
                    window.decoder_length
                )));
            }
            Ok(forecast.into_iter().map(f64::from).collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::dataset::GroupKey;

    struct FixedModel(Vec<f32>);

    impl ForecastModel for FixedModel {
        fn describe(&self) -> ModelInfo {
            ModelInfo {
                name: "fixed".into(),
                version: "0".into(),
                backend: "test".into(),
                inputs: vec![],
            }
        }

        fn predict(&self, _window: &Window) -> Result<Vec<f32>, ServiceError> {
            Ok(self.0.clone())
        }
    }

    fn window(decoder_length: usize) -> Window {
        Window {
            key: GroupKey {
                store_nbr: "1".into(),
                item_nbr: "96995".into(),
            },
            encoder_length: 1,
            decoder_length,
            encoder_cont: vec![vec![0.0]],
            encoder_cat: vec![vec![0]],
            decoder_cont: vec![vec![0.0]; decoder_length],
            decoder_cat: vec![vec![0]; decoder_length],
            target_scale: [0.0, 1.0],
            synthetic_steps: decoder_length,
        }
    }

    #[test]
    fn forecasts_are_widened_per_window() {
        let model = FixedModel(vec![0.5, 1.5]);
        let out = predict_all(&model, &[window(2), window(2)]).unwrap();
        assert_eq!(out, vec![vec![0.5, 1.5], vec![0.5, 1.5]]);
    }

    #[test]
    fn wrong_horizon_is_a_model_error() {
        let model = FixedModel(vec![0.5]);
        let err = predict_all(&model, &[window(3)]).unwrap_err();
        assert!(matches!(err, ServiceError::Model(_)));
    }

    #[test]
    fn input_lookup_by_name() {
        let info = ModelInfo {
            name: "m".into(),
            version: "1".into(),
            backend: "test".into(),
            inputs: vec![ModelInput {
                name: inputs::ENCODER_CONT.into(),
                feature_width: Some(11),
            }],
        };
        assert_eq!(info.input("encoder_cont").and_then(|i| i.feature_width), Some(11));
        assert!(info.input("decoder_cat").is_none());
    }
}
