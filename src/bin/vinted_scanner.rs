use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use vinted_scanner::WEBHOOK_URL_ENV;
use vinted_scanner::api::MarketplaceSession;
use vinted_scanner::config::{AppConfig, CONFIG_PATH};
use vinted_scanner::dispatch::{RetryPolicy, WebhookDispatcher};
use vinted_scanner::reporter;
use vinted_scanner::scanner::{CycleOptions, run_cycle};
use vinted_scanner::store::SeenStore;

#[derive(Parser)]
#[command(
    name = "vinted-scanner",
    about = "Run one scan cycle: search, enrich, dedup, and notify new listings"
)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Seen-item database path (overrides store.path)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log notifications instead of sending them; the store is read but never written
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // .env is optional; WEBHOOK_URL may come from the real environment
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;
    info!(
        "Loaded config from {} ({} search queries)",
        args.config.display(),
        config.search_queries.len()
    );

    let dispatcher = if args.dry_run {
        info!("Dry run: notifications will be logged, not sent");
        None
    } else {
        let url = config.webhook_url(std::env::var(WEBHOOK_URL_ENV).ok())?;
        Some(WebhookDispatcher::new(url, RetryPolicy::from(&config.webhook)))
    };

    let session = MarketplaceSession::connect(&config.marketplace).await?;

    let db_path = args.db.unwrap_or_else(|| config.store.path.clone());
    // dry runs work on an in-memory copy so the database file is never touched
    let mut store = if args.dry_run {
        SeenStore::snapshot(&db_path)?
    } else {
        SeenStore::open(&db_path)?
    };
    if let Some(legacy) = &config.store.legacy_ids {
        store.import_legacy(legacy)?;
    }

    let options = CycleOptions::from_config(&config);
    let report = run_cycle(
        &session,
        dispatcher.as_ref(),
        &mut store,
        &config.search_queries,
        &options,
    )
    .await;

    reporter::report_cycle(&report);
    Ok(())
}
