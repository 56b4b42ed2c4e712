use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Holiday flag assumed when a row omits `is_holiday`
pub const DEFAULT_HOLIDAY_FLAG: &str = "0";

/// One historical daily record for a (store, item) pair.
///
/// Categorical fields are labels: JSON strings are kept as-is and JSON numbers
/// are rendered as their decimal text, so `1` and `"1"` are the same store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Observation {
    /// Calendar date, `YYYY-MM-DD`
    #[schema(example = "2017-07-01")]
    pub date: String,
    #[serde(deserialize_with = "label")]
    #[schema(example = "1")]
    pub store_nbr: String,
    #[serde(deserialize_with = "label")]
    #[schema(example = "96995")]
    pub item_nbr: String,
    /// "0" or "1"
    #[serde(deserialize_with = "label")]
    #[schema(example = "0")]
    pub is_onpromotion: String,
    /// "0" or "1"; defaults to "0"
    #[serde(default = "default_holiday_flag", deserialize_with = "label")]
    #[schema(example = "0")]
    pub is_holiday: String,
    #[schema(example = 1200)]
    pub transactions: f64,
    /// Target value; defaults to 0.0
    #[serde(default)]
    #[schema(example = 1.0)]
    pub log_unit_sales: f64,
}

/// Request body accepted by `POST /api/forecast`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ForecastRequest {
    /// Historical observations, at least 37 entries
    pub timeseries: Vec<Observation>,
    /// Number of future days to predict (default 7)
    #[serde(default)]
    #[schema(example = 7)]
    pub forecast_days: Option<u32>,
}

/// Successful forecast: one inner array per (store, item) group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ForecastResponse {
    #[schema(example = json!([[1.02, 1.05, 0.98, 1.1, 1.07, 0.95, 1.01]]))]
    pub prediction: Vec<Vec<f64>>,
}

fn default_holiday_flag() -> String {
    DEFAULT_HOLIDAY_FLAG.to_string()
}

fn label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|value| label_text(&value))
}

/// Text form of a categorical value.
///
/// Nulls render as `nan`, which never appears in a store whitelist or a
/// training vocabulary.
pub fn label_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => "nan".to_string(),
        other => other.to_string(),
    }
}
