use anyhow::{Context, Result};
use clap::Parser;
use pricecast::application::ml::NumericBackend;
use pricecast::application::prediction_service::PredictionService;
use pricecast::config::Config;
use pricecast::domain::ports::PriceHistorySource;
use pricecast::domain::prediction::{NOT_AVAILABLE, PredictionReport};
use pricecast::infrastructure::{AlphaVantageClient, CsvPriceSource};
use std::env;
use std::path::PathBuf;
use std::process;
use tracing::{Level, error, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Forecast the next daily close of a stock", long_about = None)]
struct Args {
    /// Stock symbol, e.g. AAPL
    #[arg(long)]
    symbol: String,

    /// Read closes from a `date,close` CSV file, or a directory of <SYMBOL>.csv files,
    /// instead of Alpha Vantage
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Model preset: daily or compact (overrides MODEL_PROFILE)
    #[arg(long)]
    profile: Option<String>,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let args = Args::parse();

    let profile_override = args.profile.clone();
    let config = Config::from_lookup(&|key| match (key, &profile_override) {
        ("MODEL_PROFILE", Some(profile)) => Some(profile.clone()),
        _ => env::var(key).ok(),
    })
    .context("Failed to load configuration")?;

    info!(
        "pricecast {} ({} profile, {} days of history)",
        env!("CARGO_PKG_VERSION"),
        config.model.profile,
        config.provider.history_days
    );

    let backend = NumericBackend::init();

    let source: Box<dyn PriceHistorySource> = match &args.csv {
        Some(path) if path.is_dir() => Box::new(CsvPriceSource::directory(path)),
        Some(path) => Box::new(CsvPriceSource::file(path)),
        None => Box::new(AlphaVantageClient::new(
            &config.provider.alpha_vantage_base_url,
            config.provider.alpha_vantage_api_key.clone(),
        )?),
    };

    let symbol = args.symbol.trim().to_uppercase();
    let series = match source
        .daily_closes(&symbol, config.provider.history_days)
        .await
    {
        Ok(series) => series,
        Err(e) => {
            error!("{} failed for {}: {}", source.name(), symbol, e);
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let service = PredictionService::new(backend, config.model.spec.clone())
        .with_overlap_policy(config.service.overlap_policy)
        .with_timeout(config.service.timeout);

    match service.predict(&symbol, series).await {
        Ok(report) if args.json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?
            );
        }
        Ok(report) => print_report(&report),
        Err(e) => {
            eprintln!("Error: {}", e.user_message());
            process::exit(1);
        }
    }

    Ok(())
}

fn print_report(report: &PredictionReport) {
    let prediction = &report.prediction;

    println!();
    println!("{} next-day forecast", report.symbol);
    println!("  Current price:   {:>10.2}", prediction.current_price());
    println!("  Predicted price: {:>10.2}", prediction.predicted_price());
    println!(
        "  Change:          {:>+10.2} ({:+.2}%)",
        prediction.change(),
        prediction.change_pct()
    );
    println!("  Confidence:      {:>10}", prediction.confidence_label());
    match report.training.final_loss {
        Some(loss) => println!(
            "  Training:        {} epochs, final loss {:.6}",
            report.training.epochs, loss
        ),
        None => println!("  Training:        {}", NOT_AVAILABLE),
    }

    println!();
    println!("  {:<12} {:>12} {:>12}", "Date", "Close", "Forecast");
    for (idx, label) in report.chart.labels.iter().enumerate() {
        let historical = report
            .chart
            .historical
            .get(idx)
            .map(|v| format!("{:.2}", v))
            .unwrap_or_default();
        let predicted = report
            .chart
            .predicted
            .get(idx)
            .copied()
            .flatten()
            .map(|v| format!("{:.2}", v))
            .unwrap_or_default();
        println!("  {:<12} {:>12} {:>12}", label, historical, predicted);
    }
}
