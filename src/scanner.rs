use std::collections::HashSet;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::DEFAULT_FOOTER;
use crate::config::AppConfig;
use crate::dispatch::DispatchOutcome;
use crate::notify::{WebhookMessage, format_message};
use crate::reporter::summary_line;
use crate::store::SeenStore;
use crate::types::{CatalogPage, CycleReport, Listing, Reputation, SearchQuery};

/// Source of listings and seller reputation.
#[allow(async_fn_in_trait)]
pub trait Marketplace {
    /// Run one catalog search.
    async fn search(&self, query: &SearchQuery) -> Result<CatalogPage>;

    /// Look up a seller's feedback counters. One attempt, no retry.
    async fn fetch_reputation(&self, seller: &str) -> Result<Reputation>;
}

/// Sink for formatted notifications.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn send(&self, message: &WebhookMessage) -> DispatchOutcome;
}

/// Per-cycle policy knobs.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    /// Sellers need at least this many positive reviews to be notified on.
    pub min_positive_feedback: u64,
    /// Whether a listing whose notification failed is still recorded as seen.
    pub record_failed_dispatches: bool,
    pub footer: String,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            min_positive_feedback: 1,
            record_failed_dispatches: true,
            footer: DEFAULT_FOOTER.to_string(),
        }
    }
}

impl CycleOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            min_positive_feedback: config.policy.min_positive_feedback,
            record_failed_dispatches: config.policy.record_failed_dispatches,
            footer: config.webhook.footer.clone(),
        }
    }
}

/// What happened to one unseen listing.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ListingOutcome {
    Notified,
    DispatchFailed,
    ReputationUnavailable,
    LowReputation,
    DryRun,
}

/// Run one scan cycle over every query.
///
/// `notifier = None` is a dry run: messages are logged, nothing is recorded.
/// Failures are contained per query and per listing; the returned report
/// counts them.
pub async fn run_cycle<M, N>(
    market: &M,
    notifier: Option<&N>,
    store: &mut SeenStore,
    queries: &[SearchQuery],
    options: &CycleOptions,
) -> CycleReport
where
    M: Marketplace,
    N: Notifier,
{
    let mut report = CycleReport::new(Utc::now());
    // Ids already evaluated this cycle, so an item matching two queries is handled once.
    let mut visited: HashSet<String> = HashSet::new();

    for (idx, query) in queries.iter().enumerate() {
        info!(
            "Running search {}/{}: {}",
            idx + 1,
            queries.len(),
            query.label()
        );
        report.queries_run += 1;

        let page = match market.search(query).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Search {} failed, skipping: {e:#}", query.label());
                report.queries_failed += 1;
                continue;
            }
        };
        report.malformed += page.malformed;
        info!("Search returned {} listing(s)", page.listings.len());

        for listing in &page.listings {
            report.listings_examined += 1;
            if store.contains(&listing.id) || !visited.insert(listing.id.clone()) {
                report.already_seen += 1;
                continue;
            }

            let outcome = process_listing(market, notifier, listing, options).await;
            let record = match outcome {
                ListingOutcome::Notified => {
                    report.delivered += 1;
                    true
                }
                ListingOutcome::DispatchFailed => {
                    report.dispatch_failures += 1;
                    options.record_failed_dispatches
                }
                ListingOutcome::ReputationUnavailable => {
                    report.reputation_failures += 1;
                    false
                }
                ListingOutcome::LowReputation => {
                    report.low_reputation += 1;
                    false
                }
                ListingOutcome::DryRun => {
                    report.would_notify += 1;
                    false
                }
            };

            if record {
                match store.insert(&listing.id) {
                    Ok(_) => report.processed += 1,
                    Err(e) => {
                        warn!("Failed to record item {}: {e:#}", listing.id);
                        report.store_errors += 1;
                    }
                }
            }
        }
    }

    report.finished_at = Utc::now();
    info!("{}", summary_line(&report));
    report
}

async fn process_listing<M, N>(
    market: &M,
    notifier: Option<&N>,
    listing: &Listing,
    options: &CycleOptions,
) -> ListingOutcome
where
    M: Marketplace,
    N: Notifier,
{
    let reputation = match market.fetch_reputation(&listing.seller).await {
        Ok(rep) => rep,
        Err(e) => {
            warn!(
                "Reputation unavailable for seller {}, skipping item {}: {e:#}",
                listing.seller, listing.id
            );
            return ListingOutcome::ReputationUnavailable;
        }
    };

    if reputation.positive < options.min_positive_feedback {
        info!(
            "Skipping item {} ({}) from {}: {} positive review(s)",
            listing.id,
            listing.headline(),
            listing.seller,
            reputation.positive
        );
        return ListingOutcome::LowReputation;
    }

    let message = format_message(listing, &reputation, &options.footer, Utc::now());

    let Some(notifier) = notifier else {
        let payload = serde_json::to_string(&message).unwrap_or_default();
        info!("[dry-run] would notify item {}: {payload}", listing.id);
        return ListingOutcome::DryRun;
    };

    match notifier.send(&message).await {
        DispatchOutcome::Delivered => {
            info!(
                "Notified item {} ({}, {})",
                listing.id,
                listing.headline(),
                listing.price_label()
            );
            ListingOutcome::Notified
        }
        DispatchOutcome::Failed(reason) => {
            warn!("Notification for item {} failed: {reason}", listing.id);
            ListingOutcome::DispatchFailed
        }
    }
}
