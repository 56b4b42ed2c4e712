/*!
 * # Forecast pipeline
 *
 * Turns a forecast request into model predictions:
 *
 * 1. [`validation`] checks the request body and the store whitelist.
 * 2. [`features`] derives the time index and calendar fields, then appends
 *    placeholder rows for the forecast horizon.
 * 3. [`dataset`] groups rows by `(store_nbr, item_nbr)` and encodes one
 *    encoder/decoder window per group against the [`schema`].
 * 4. [`model`] runs the loaded [`ForecastModel`] over every window.
 */

pub mod bundle;
pub mod dataset;
pub mod features;
pub mod model;
pub mod observation;
pub mod onnx;
pub mod schema;
pub mod validation;

pub use bundle::ModelBundle;
pub use dataset::{GroupKey, Window, Windower};
pub use features::FeatureRow;
pub use model::{ForecastModel, ModelInfo, ModelInput};
pub use observation::{ForecastRequest, ForecastResponse, Observation};
pub use schema::{BundleError, DatasetSpec, ModelSchema, SALES_DATASET};
pub use validation::{validate_request, ValidatedRequest, ValidationPolicy};
