use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

use crate::{
    errors::ServiceError,
    forecast::{validate_request, ForecastResponse, ModelBundle, ValidationPolicy},
    metrics::FORECAST_METRICS,
};

/// Validates forecast requests and runs them against the loaded bundle.
#[derive(Clone)]
pub struct ForecastService {
    bundle: Arc<ModelBundle>,
    policy: ValidationPolicy,
}

impl ForecastService {
    pub fn new(bundle: Arc<ModelBundle>, policy: ValidationPolicy) -> Self {
        Self { bundle, policy }
    }

    /// Validates `body`, then builds features, windows and predictions on the
    /// blocking pool.
    #[instrument(skip_all)]
    pub async fn forecast(&self, body: Value) -> Result<ForecastResponse, ServiceError> {
        let request = validate_request(&body, &self.policy)?;
        let rows = request.observations.len();
        let horizon = request.forecast_days;

        let bundle = self.bundle.clone();
        let started = Instant::now();
        let prediction = tokio::task::spawn_blocking(move || bundle.forecast(&request)).await??;
        let elapsed = started.elapsed();

        FORECAST_METRICS.record_success(prediction.len(), horizon, elapsed);
        info!(
            rows,
            horizon,
            groups = prediction.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "forecast served"
        );

        Ok(ForecastResponse { prediction })
    }
}
