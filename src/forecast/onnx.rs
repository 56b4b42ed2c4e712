//! ONNX runtime backed by `tract`.

use std::path::Path;

use tract_onnx::prelude::*;
use tract_onnx::tract_hir::internal::DimLike;

use super::dataset::Window;
use super::model::{inputs, ForecastModel, ModelInfo, ModelInput};
use super::schema::{BundleError, ModelSchema};
use crate::errors::ServiceError;

pub const BACKEND: &str = "tract-onnx";

pub struct OnnxForecastModel {
    plan: TypedRunnableModel<TypedModel>,
    /// Graph input names in run order
    input_order: Vec<String>,
    info: ModelInfo,
    point_index: usize,
}

impl OnnxForecastModel {
    pub fn load(path: impl AsRef<Path>, schema: &ModelSchema) -> Result<Self, BundleError> {
        let path = path.as_ref();
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| BundleError::ModelLoad(format!("{}: {}", path.display(), e)))?;

        let described = describe_inputs(&plan)
            .map_err(|e| BundleError::ModelLoad(format!("{}: {}", path.display(), e)))?;

        for name in inputs::ALL {
            if !described.iter().any(|input| input.name == name) {
                return Err(BundleError::ModelLoad(format!(
                    "{} has no input named '{}'",
                    path.display(),
                    name
                )));
            }
        }

        let input_order = described.iter().map(|input| input.name.clone()).collect();
        let info = ModelInfo {
            name: schema.name.clone(),
            version: schema.version.clone(),
            backend: BACKEND.to_string(),
            inputs: described,
        };

        tracing::info!(
            model = %path.display(),
            inputs = ?info.inputs,
            "loaded ONNX forecasting model"
        );

        Ok(Self {
            plan,
            input_order,
            info,
            point_index: schema.point_index(),
        })
    }

    fn run(&self, window: &Window) -> TractResult<Vec<f32>> {
        let feeds = self
            .input_order
            .iter()
            .map(|name| input_tensor(name, window).map(TValue::from))
            .collect::<TractResult<TVec<TValue>>>()?;

        let outputs = self.plan.run(feeds)?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("model produced no outputs"))?
            .cast_to::<f32>()?;
        let view = output.to_array_view::<f32>()?;
        point_forecast(view, self.point_index)
    }
}

/// Tensor fed to the graph input `name`, batch size one
fn input_tensor(name: &str, window: &Window) -> TractResult<Tensor> {
    let encoder = window.encoder_length;
    let decoder = window.decoder_length;
    match name {
        inputs::ENCODER_CONT => Tensor::from_shape(
            &[1, encoder, window.n_reals()],
            &Window::flatten(&window.encoder_cont),
        ),
        inputs::ENCODER_CAT => Tensor::from_shape(
            &[1, encoder, window.n_categoricals()],
            &Window::flatten(&window.encoder_cat),
        ),
        inputs::DECODER_CONT => Tensor::from_shape(
            &[1, decoder, window.n_reals()],
            &Window::flatten(&window.decoder_cont),
        ),
        inputs::DECODER_CAT => Tensor::from_shape(
            &[1, decoder, window.n_categoricals()],
            &Window::flatten(&window.decoder_cat),
        ),
        inputs::ENCODER_LENGTHS => Tensor::from_shape(&[1], &[encoder as i64]),
        inputs::DECODER_LENGTHS => Tensor::from_shape(&[1], &[decoder as i64]),
        inputs::TARGET_SCALE => Tensor::from_shape(&[1, 2], &window.target_scale),
        other => anyhow::bail!("unsupported model input '{}'", other),
    }
}

/// Point forecast from an output shaped `[1, h]` or `[1, h, quantiles]`
fn point_forecast(view: tract_ndarray::ArrayViewD<'_, f32>, point_index: usize) -> TractResult<Vec<f32>> {
    // logical order is batch, step, quantile
    match *view.shape() {
        [1, _] => Ok(view.iter().copied().collect()),
        [1, _, quantiles] if point_index < quantiles => Ok(view
            .iter()
            .skip(point_index)
            .step_by(quantiles)
            .copied()
            .collect()),
        ref shape => anyhow::bail!("unexpected prediction shape {:?}", shape),
    }
}

fn describe_inputs(plan: &TypedRunnableModel<TypedModel>) -> TractResult<Vec<ModelInput>> {
    let model = plan.model();
    model
        .input_outlets()?
        .iter()
        .map(|outlet| {
            let fact = model.outlet_fact(*outlet)?;
            let feature_width = fact.shape.last().and_then(|dim| dim.to_usize().ok());
            Ok(ModelInput {
                name: model.node(outlet.node).name.clone(),
                feature_width,
            })
        })
        .collect()
}

impl ForecastModel for OnnxForecastModel {
    fn describe(&self) -> ModelInfo {
        self.info.clone()
    }

    fn predict(&self, window: &Window) -> Result<Vec<f32>, ServiceError> {
        self.run(window)
            .map_err(|e| ServiceError::Model(format!("inference failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::dataset::Windower;
    use crate::forecast::features::{build_features, extend_with_future, DEFAULT_TIME_IDX_EPOCH};
    use crate::forecast::observation::Observation;
    use crate::forecast::schema::tests::sales_schema_json;
    use chrono::{Days, NaiveDate};
    use tract_ndarray::{ArrayD, IxDyn};

    fn window(days: u64, horizon: usize) -> Window {
        let schema = ModelSchema::from_value(sales_schema_json()).unwrap();
        let start = NaiveDate::from_ymd_opt(2017, 7, 1).unwrap();
        let observations: Vec<Observation> = (0..days)
            .map(|i| Observation {
                date: (start + Days::new(i)).format("%Y-%m-%d").to_string(),
                store_nbr: "1".to_string(),
                item_nbr: "96995".to_string(),
                is_onpromotion: "0".to_string(),
                is_holiday: "0".to_string(),
                transactions: 1500.0,
                log_unit_sales: 1.5,
            })
            .collect();
        let epoch = *DEFAULT_TIME_IDX_EPOCH;
        let rows =
            extend_with_future(build_features(&observations, epoch).unwrap(), horizon, epoch)
                .unwrap();
        Windower::new(&schema).windows(&rows, horizon).unwrap().remove(0)
    }

    #[test]
    fn input_tensors_have_batch_of_one() {
        let window = window(37, 7);
        let shape = |name: &str| input_tensor(name, &window).unwrap().shape().to_vec();

        assert_eq!(shape(inputs::ENCODER_CONT), vec![1, 30, 11]);
        assert_eq!(shape(inputs::ENCODER_CAT), vec![1, 30, 4]);
        assert_eq!(shape(inputs::DECODER_CONT), vec![1, 7, 11]);
        assert_eq!(shape(inputs::DECODER_CAT), vec![1, 7, 4]);
        assert_eq!(shape(inputs::ENCODER_LENGTHS), vec![1]);
        assert_eq!(shape(inputs::DECODER_LENGTHS), vec![1]);
        assert_eq!(shape(inputs::TARGET_SCALE), vec![1, 2]);
    }

    #[test]
    fn input_tensors_carry_window_values() {
        let window = window(40, 5);

        let lengths = input_tensor(inputs::ENCODER_LENGTHS, &window).unwrap();
        assert_eq!(lengths.as_slice::<i64>().unwrap(), &[30]);
        let lengths = input_tensor(inputs::DECODER_LENGTHS, &window).unwrap();
        assert_eq!(lengths.as_slice::<i64>().unwrap(), &[5]);

        let scale = input_tensor(inputs::TARGET_SCALE, &window).unwrap();
        assert_eq!(scale.as_slice::<f32>().unwrap(), &window.target_scale);

        let cat = input_tensor(inputs::ENCODER_CAT, &window).unwrap();
        assert_eq!(&cat.as_slice::<i64>().unwrap()[..4], window.encoder_cat[0].as_slice());
    }

    #[test]
    fn unknown_input_name_is_an_error() {
        let window = window(37, 7);
        let err = input_tensor("static_reals", &window).unwrap_err();
        assert!(err.to_string().contains("static_reals"));
    }

    #[test]
    fn point_forecast_passes_single_output_through() {
        let values: Vec<f32> = (0..7).map(|i| i as f32).collect();
        let output = ArrayD::from_shape_vec(IxDyn(&[1, 7]), values.clone()).unwrap();

        assert_eq!(point_forecast(output.view(), 3).unwrap(), values);
    }

    #[test]
    fn point_forecast_selects_the_median_quantile() {
        // value = step * 10 + quantile
        let values: Vec<f32> = (0..7)
            .flat_map(|step| (0..7).map(move |q| (step * 10 + q) as f32))
            .collect();
        let output = ArrayD::from_shape_vec(IxDyn(&[1, 7, 7]), values).unwrap();

        assert_eq!(
            point_forecast(output.view(), 3).unwrap(),
            vec![3.0, 13.0, 23.0, 33.0, 43.0, 53.0, 63.0]
        );
    }

    #[test]
    fn point_forecast_rejects_unexpected_shapes() {
        let batched = ArrayD::from_shape_vec(IxDyn(&[2, 7]), vec![0.0f32; 14]).unwrap();
        assert!(point_forecast(batched.view(), 0).is_err());

        let quantiles = ArrayD::from_shape_vec(IxDyn(&[1, 7, 3]), vec![0.0f32; 21]).unwrap();
        let err = point_forecast(quantiles.view(), 3).unwrap_err();
        assert!(err.to_string().contains("unexpected prediction shape"));
    }
}
