use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sales Forecast API",
        version = "0.1.0",
        description = r#"
# Sales Forecast API

Predicts future daily `log_unit_sales` per store and item with a pretrained
Temporal Fusion Transformer.

## Request

`POST /api/forecast` takes at least 37 historical observations in `timeseries`
and an optional `forecast_days` (default 7). Stores must be `"1"` through `"54"`.

## Error Handling

Every error uses the same envelope:

```json
{
  "error": "Need at least 37 historical entries",
  "request_id": "0b6f6c1e-9d0a-4f0e-8f0c-2f7c1c1a9b2d",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

Input problems return 400. Failures while building features, windowing or
running the model return 500 with the underlying message.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development")
    ),
    tags(
        (name = "forecast", description = "Sales forecasting"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::forecast::create_forecast,
        crate::health::readiness_check,
        crate::health::liveness_check,
    ),
    components(
        schemas(
            crate::forecast::ForecastRequest,
            crate::forecast::ForecastResponse,
            crate::forecast::Observation,
            crate::forecast::ModelInfo,
            crate::forecast::ModelInput,
            crate::health::ReadinessInfo,
            crate::health::HealthStatus,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
