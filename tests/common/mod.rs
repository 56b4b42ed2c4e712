#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Days, NaiveDate};
use serde_json::{json, Value};
use tower::ServiceExt;

use sales_forecast_api::{
    build_router,
    config::AppConfig,
    errors::ServiceError,
    forecast::{
        model::inputs, ForecastModel, ModelBundle, ModelInfo, ModelInput, ModelSchema, Window,
    },
    AppState,
};

pub const SCHEMA_JSON: &str = include_str!("../../model/schema.json");

/// Deterministic stand-in for the ONNX export: every decoder step predicts the
/// encoder mean of the target plus a fixed per-step drift.
pub struct DriftModel {
    pub drift: f32,
}

impl ForecastModel for DriftModel {
    fn describe(&self) -> ModelInfo {
        let width = |name: &str| match name {
            inputs::ENCODER_CONT | inputs::DECODER_CONT => Some(11),
            inputs::ENCODER_CAT | inputs::DECODER_CAT => Some(4),
            _ => None,
        };
        ModelInfo {
            name: "drift".into(),
            version: "test".into(),
            backend: "stub".into(),
            inputs: inputs::ALL
                .iter()
                .map(|name| ModelInput {
                    name: name.to_string(),
                    feature_width: width(name),
                })
                .collect(),
        }
    }

    fn predict(&self, window: &Window) -> Result<Vec<f32>, ServiceError> {
        Ok((0..window.decoder_length)
            .map(|step| window.target_scale[0] + self.drift * step as f32)
            .collect())
    }
}

/// Always fails, for exercising the 500 path of the inference call.
pub struct BrokenModel;

impl ForecastModel for BrokenModel {
    fn describe(&self) -> ModelInfo {
        ModelInfo {
            name: "broken".into(),
            version: "test".into(),
            backend: "stub".into(),
            inputs: vec![],
        }
    }

    fn predict(&self, _window: &Window) -> Result<Vec<f32>, ServiceError> {
        Err(ServiceError::Model("inference failed: tensor shape mismatch".into()))
    }
}

pub fn schema() -> ModelSchema {
    let value: Value = serde_json::from_str(SCHEMA_JSON).expect("schema fixture is valid JSON");
    ModelSchema::from_value(value).expect("schema fixture is valid")
}

pub fn bundle_with(model: impl ForecastModel + 'static) -> Arc<ModelBundle> {
    Arc::new(ModelBundle::new(schema(), Arc::new(model), 37).expect("stub bundle loads"))
}

pub fn app() -> Router {
    app_with(DriftModel { drift: 0.0 })
}

pub fn app_with(model: impl ForecastModel + 'static) -> Router {
    app_with_config(AppConfig::default(), model)
}

pub fn app_with_config(config: AppConfig, model: impl ForecastModel + 'static) -> Router {
    let state = AppState::new(config, bundle_with(model));
    build_router(state)
}

/// `days` consecutive observations for one series starting at `start`
pub fn series(start: NaiveDate, days: usize, store: &str, item: &str, sales: f64) -> Vec<Value> {
    (0..days)
        .map(|i| {
            let date = start + Days::new(i as u64);
            json!({
                "date": date.format("%Y-%m-%d").to_string(),
                "store_nbr": store,
                "item_nbr": item,
                "is_onpromotion": if i % 5 == 0 { "1" } else { "0" },
                "is_holiday": "0",
                "transactions": 1000 + i as i64 * 10,
                "log_unit_sales": sales
            })
        })
        .collect()
}

pub fn july_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2017, 7, 1).expect("valid date")
}

pub async fn post_json(app: Router, path: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("serializable body")))
        .expect("valid request");
    send(app, request).await
}

pub async fn get_json(app: Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(Body::empty())
        .expect("valid request");
    send(app, request).await
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}
