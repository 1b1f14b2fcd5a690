//! Probe: catalog search + seller profile
//!
//! Primes a marketplace session and runs one configured search, documenting:
//! - Response shape and the fields of the first item
//! - How many items decode into listings
//! - Latency of the catalog and user-profile calls
//! - Feedback counters for the first listing's seller

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use vinted_scanner::api::{MarketplaceSession, parse_catalog_page};
use vinted_scanner::config::{AppConfig, CONFIG_PATH};
use vinted_scanner::notify::{overall_score, star_display};
use vinted_scanner::scanner::Marketplace;

#[derive(Parser)]
#[command(name = "probe_catalog", about = "Run one configured search and dump the response")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Index of the search query to run (0-based)
    #[arg(long, default_value_t = 0)]
    query: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(&args.config)?;
    let query = config
        .search_queries
        .get(args.query)
        .with_context(|| format!("no search query at index {}", args.query))?;

    println!("=== Probe: catalog search ===");
    println!("Query: {}", query.label());
    println!();

    // 1. Prime session
    println!("--- 1. Prime session ---");
    let start = Instant::now();
    let session = MarketplaceSession::connect(&config.marketplace).await?;
    println!("Primed in {:?}", start.elapsed());
    println!();

    // 2. Raw catalog response
    println!("--- 2. Catalog search ---");
    let start = Instant::now();
    let body = session.search_raw(query).await?;
    println!("Latency: {:?}", start.elapsed());

    match body.get("items").and_then(|v| v.as_array()) {
        Some(items) => {
            println!("Item count: {}", items.len());
            if let Some(first) = items.first() {
                println!("\nSample item (first):");
                println!("{}", serde_json::to_string_pretty(first)?);
                println!("\nFields present:");
                if let Some(obj) = first.as_object() {
                    for key in obj.keys() {
                        println!("  - {key}");
                    }
                }
            }
        }
        None => {
            println!("Response has no items array:");
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    println!();

    // 3. Decode
    println!("--- 3. Decode into listings ---");
    let page = parse_catalog_page(&body);
    println!(
        "Decoded {} listing(s), {} malformed",
        page.listings.len(),
        page.malformed
    );
    for listing in page.listings.iter().take(5) {
        println!(
            "  {} | {} | {} | seller {}",
            listing.id,
            listing.headline(),
            listing.price_label(),
            listing.seller
        );
    }
    println!();

    // 4. Seller reputation
    if let Some(listing) = page.listings.first() {
        println!("--- 4. Seller profile: {} ---", listing.seller);
        let start = Instant::now();
        match session.fetch_reputation(&listing.seller).await {
            Ok(rep) => {
                let score = overall_score(rep.positive, rep.negative);
                println!("Latency: {:?}", start.elapsed());
                println!(
                    "positive={} neutral={} negative={}",
                    rep.positive, rep.neutral, rep.negative
                );
                println!("Rating: {} ({score:.2}/5)", star_display(score));
            }
            Err(e) => println!("Profile lookup failed: {e:#}"),
        }
    }

    Ok(())
}
