//! Command-line harvest: run one search (or one per city) and write a CSV.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use maps_harvest::acquisition::NoopReporter;
use maps_harvest::core::config::{load_harvest_config, ENV_PROXY};
use maps_harvest::export::save_records_csv;
use maps_harvest::harvest::{
    parse_qualifiers, run_multi_target, run_single_target, HarvestSettings, MultiTargetRequest,
};
use maps_harvest::scraping::chromium::ChromiumLauncher;
use maps_harvest::AcquisitionTarget;

#[derive(Parser, Debug)]
#[command(name = "harvest", version, about = "Collect business listings from a map search into CSV")]
struct Args {
    /// Search query
    #[arg(short, long, default_value = "turkish stores in toronto Canada")]
    search: String,

    /// Minimum number of results to collect
    #[arg(short, long, default_value_t = 20)]
    total: usize,

    /// Output CSV file path
    #[arg(short, long, default_value = "result.csv")]
    output: PathBuf,

    /// Append to the output file instead of overwriting it
    #[arg(long)]
    append: bool,

    /// Comma-separated cities; the total is split across them
    #[arg(long)]
    cities: Option<String>,

    /// Extra terms appended to the query
    #[arg(long)]
    filters: Option<String>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Proxy server URL
    #[arg(long, env = ENV_PROXY)]
    proxy: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    let config = load_harvest_config();
    let mut settings = HarvestSettings::from_config(&config);
    if args.headed {
        settings.launch.headless = false;
    }
    if let Some(proxy) = args.proxy.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        settings.launch.proxy = Some(proxy.to_string());
    }

    let launcher = ChromiumLauncher::new_auto(settings.locators.results_panel)
        .context("No Chromium-family browser found. Install Chrome/Chromium or set CHROME_EXECUTABLE.")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; finishing with the records collected so far");
                cancel.cancel();
            }
        });
    }

    let filters = args.filters.as_deref().map(str::trim).filter(|f| !f.is_empty());
    let cities = args.cities.as_deref().map(parse_qualifiers).unwrap_or_default();

    let records = if cities.is_empty() {
        let query = AcquisitionTarget::compose(&args.search, filters, None, args.total).query;
        run_single_target(&launcher, &settings, &query, args.total, &cancel).await?
    } else {
        let request =
            MultiTargetRequest::split_total(&args.search, filters, cities, args.total, &settings.policy);
        let outcome = run_multi_target(&launcher, &settings, &request, &NoopReporter, &cancel).await?;
        if outcome.shortfall > 0 {
            warn!(
                "Collected {} of {} requested records",
                outcome.records.len(),
                outcome.total_goal
            );
        }
        outcome.records
    };

    let written = save_records_csv(&records, &args.output, args.append)?;
    info!("Done: {} records written to {}", written, args.output.display());
    Ok(())
}
