// Forecasting
pub mod forecast;

pub use forecast::ForecastService;
