use std::{fs, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::Value;

use sales_forecast_api::{
    config,
    forecast::{validate_request, ModelBundle, ModelInfo, ValidationPolicy},
};

/// Loads a model bundle, runs the startup checks and prints what was found.
#[derive(Debug, Parser)]
#[command(name = "bundle-check", version, about)]
struct Cli {
    /// ONNX export of the forecasting model
    #[arg(long, default_value = "model/model.onnx")]
    model: PathBuf,

    /// Schema describing the model's feature layout
    #[arg(long, default_value = "model/schema.json")]
    schema: PathBuf,

    /// Minimum history the server will require per request
    #[arg(long, default_value_t = 37)]
    min_history: usize,

    /// Optional forecast request body to run through the bundle
    #[arg(long)]
    request: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    model: ModelInfo,
    schema_name: String,
    schema_version: String,
    max_encoder_length: usize,
    max_prediction_length: Option<usize>,
    reals: Vec<String>,
    categoricals: Vec<String>,
    quantiles: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction: Option<Vec<Vec<f64>>>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    config::init_tracing("warn", false);

    match run(&cli) {
        Ok(report) => {
            if let Err(e) = print_report(&report, cli.json) {
                eprintln!("error: {e:#}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if cli.json {
                println!("{}", serde_json::json!({ "ok": false, "error": format!("{e:#}") }));
            } else {
                eprintln!("bundle check failed: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<Report> {
    let bundle = ModelBundle::load(&cli.model, &cli.schema, cli.min_history)
        .context("bundle rejected")?;

    let prediction = match &cli.request {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let body: Value = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            let policy = ValidationPolicy {
                min_history: cli.min_history,
                ..ValidationPolicy::default()
            };
            let request = validate_request(&body, &policy)?;
            Some(bundle.forecast(&request)?)
        }
        None => None,
    };

    let schema = bundle.schema();
    Ok(Report {
        model: bundle.describe(),
        schema_name: schema.name.clone(),
        schema_version: schema.version.clone(),
        max_encoder_length: schema.max_encoder_length,
        max_prediction_length: schema.max_prediction_length,
        reals: schema.reals.clone(),
        categoricals: schema.categoricals.clone(),
        quantiles: schema.quantiles.clone(),
        prediction,
    })
}

fn print_report(report: &Report, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("bundle OK");
    println!(
        "  model:       {} {} ({})",
        report.model.name, report.model.version, report.model.backend
    );
    println!(
        "  schema:      {} {}",
        report.schema_name, report.schema_version
    );
    println!("  encoder:     {} steps", report.max_encoder_length);
    match report.max_prediction_length {
        Some(max) => println!("  horizon:     up to {max} steps"),
        None => println!("  horizon:     unbounded"),
    }
    println!("  reals:       {}", report.reals.join(", "));
    println!("  categorical: {}", report.categoricals.join(", "));
    for input in &report.model.inputs {
        match input.feature_width {
            Some(width) => println!("  input:       {} [.., {}]", input.name, width),
            None => println!("  input:       {}", input.name),
        }
    }
    if let Some(prediction) = &report.prediction {
        for (i, series) in prediction.iter().enumerate() {
            let values: Vec<String> = series.iter().map(|v| format!("{v:.4}")).collect();
            println!("  forecast[{i}]: {}", values.join(" "));
        }
    }
    Ok(())
}
