use anyhow::Result;
use chrono::{Datelike, Utc};
use spotledger::logging::init_logging;
use spotledger::{Config, LedgerService, YearlyDataset};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let year = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse::<i32>()
            .map_err(|_| anyhow::anyhow!("Invalid year argument: {}", arg))?,
        None => config.settings.year.unwrap_or_else(|| Utc::now().year()),
    };

    info!("Spotledger {} starting for {}", env!("APP_VERSION"), year);
    let service = LedgerService::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to create service: {}", e))?;

    match service.get_yearly_dataset(year).await {
        Ok(dataset) => {
            print_table(year, &dataset, config.settings.margin_cents_per_kwh);
            Ok(())
        }
        Err(e) => {
            error!("Could not build ledger for {}: {}", year, e);
            Err(anyhow::anyhow!("Ledger error: {}", e))
        }
    }
}

fn print_table(year: i32, dataset: &YearlyDataset, margin: f64) {
    println!(
        "Spotledger {} (updated {})",
        year,
        dataset.last_updated.format("%Y-%m-%d %H:%M UTC")
    );
    println!(
        "{:<8} {:>12} {:>14} {:>12}",
        "Month", "kWh", "c/kWh", "Cost"
    );
    let mut total_kwh = 0.0;
    for month in &dataset.monthly {
        total_kwh += month.total_consumption_kwh;
        println!(
            "{:<8} {:>12.3} {:>14.2} {:>12.2}",
            month.month_key,
            month.total_consumption_kwh,
            month.price_with_margin(margin),
            month.cost_with_margin(margin)
        );
    }
    let total_cost = dataset.total_cost() + total_kwh * margin / 100.0;
    println!("{:<8} {:>12.3} {:>14} {:>12.2}", "Total", total_kwh, "", total_cost);
}
