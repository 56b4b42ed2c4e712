use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::Value;

use crate::{
    errors::ServiceError,
    forecast::{ForecastRequest, ForecastResponse},
    metrics::FORECAST_METRICS,
    AppState,
};

/// Forecast future `log_unit_sales` for every (store, item) series in the body
#[utoipa::path(
    post,
    path = "/api/forecast",
    summary = "Forecast daily sales",
    description = "Builds calendar features and a forecast horizon from at least 37 historical \
                   observations and returns one prediction array per (store_nbr, item_nbr) group",
    request_body = ForecastRequest,
    responses(
        (status = 200, description = "Forecast computed", body = ForecastResponse,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Missing timeseries, too little history or unknown store", body = crate::errors::ErrorResponse),
        (status = 413, description = "Body exceeds the configured size limit", body = crate::errors::ErrorResponse),
        (status = 500, description = "Feature building, windowing or inference failed", body = crate::errors::ErrorResponse),
    ),
    tag = "forecast"
)]
pub async fn create_forecast(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ForecastResponse>, ServiceError> {
    // Body is taken as raw JSON so field checks report the documented messages
    let result = match payload {
        Ok(Json(body)) => state.forecast.forecast(body).await,
        Err(rejection) => Err(ServiceError::from(rejection)),
    };

    match result {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            if err.is_client_error() {
                FORECAST_METRICS.record_rejection();
            } else {
                FORECAST_METRICS.record_failure();
            }
            Err(err)
        }
    }
}
