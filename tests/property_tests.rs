//! Property-based tests for the forecast pipeline.
//!
//! These drive validation and the bundle directly (no HTTP) so proptest can
//! explore many histories cheaply.

mod common;

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use serde_json::json;

use common::{bundle_with, series, DriftModel};
use sales_forecast_api::forecast::{validate_request, ValidationPolicy};

fn start_date_strategy() -> impl Strategy<Value = NaiveDate> {
    // 2013-01-01 through the end of 2017
    (0u64..1800).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2013, 1, 1).expect("valid date") + Days::new(offset)
    })
}

fn item_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("96995"), Just("99197"), Just("103665")]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_whitelisted_history_yields_one_forecast_of_requested_length(
        store in 1u32..=54,
        item in item_strategy(),
        start in start_date_strategy(),
        days in 37usize..80,
        horizon in 1usize..20,
        sales in 0.0f64..5.0,
    ) {
        let body = json!({
            "timeseries": series(start, days, &store.to_string(), item, sales),
            "forecast_days": horizon
        });
        let request = validate_request(&body, &ValidationPolicy::default()).unwrap();
        let bundle = bundle_with(DriftModel { drift: 0.1 });

        let prediction = bundle.forecast(&request).unwrap();

        prop_assert_eq!(prediction.len(), 1);
        prop_assert_eq!(prediction[0].len(), horizon);
        prop_assert!(prediction[0].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn stores_outside_the_whitelist_never_validate(
        store in prop_oneof![Just(0u32), 55u32..10_000],
        position in 0usize..37,
    ) {
        let mut rows = series(
            NaiveDate::from_ymd_opt(2017, 7, 1).expect("valid date"),
            37,
            "1",
            "96995",
            1.0,
        );
        rows[position]["store_nbr"] = json!(store.to_string());

        let err = validate_request(&json!({ "timeseries": rows }), &ValidationPolicy::default())
            .unwrap_err();

        prop_assert!(err.is_client_error());
    }

    #[test]
    fn histories_below_the_minimum_never_validate(days in 0usize..37) {
        let rows = series(
            NaiveDate::from_ymd_opt(2017, 7, 1).expect("valid date"),
            days,
            "1",
            "96995",
            1.0,
        );

        let err = validate_request(&json!({ "timeseries": rows }), &ValidationPolicy::default())
            .unwrap_err();

        prop_assert_eq!(err.to_string(), "Need at least 37 historical entries");
    }
}
