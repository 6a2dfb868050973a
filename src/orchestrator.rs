use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{FetchError, ItemError};
use crate::fetcher::{FetchReport, ReviewFetcher, ReviewSource};
use crate::identifiers::extract_listing_ids;
use crate::ledger::Ledger;
use crate::models::{EpochOutcome, EpochReport, ScrapeStatus, WorkItem};
use crate::pacing::Pacer;
use crate::results::ResultsStore;

/// Drives the ledger through scrape epochs
pub struct Orchestrator<L: Ledger, S: ReviewSource, R: ResultsStore> {
    ledger: L,
    fetcher: ReviewFetcher<S>,
    results: R,
    pacer: Pacer,
    item_delay: Duration,
}

impl<L: Ledger, S: ReviewSource, R: ResultsStore> Orchestrator<L, S, R> {
    pub fn new(
        ledger: L,
        fetcher: ReviewFetcher<S>,
        results: R,
        pacer: Pacer,
        item_delay: Duration,
    ) -> Self {
        Self {
            ledger,
            fetcher,
            results,
            pacer,
            item_delay,
        }
    }

    /// Run one pass over every item not yet scraped.
    ///
    /// Per-item failures are written to the ledger and never stop the pass.
    /// Cancellation stops it at once and leaves the in-flight item as it was.
    /// Ledger or results-store I/O errors abort the epoch.
    pub async fn run_epoch(&self, cancel: &CancellationToken) -> Result<EpochReport> {
        let mut report = EpochReport::start();

        let unprocessed: Vec<WorkItem> = self
            .ledger
            .load()?
            .into_iter()
            .filter(WorkItem::needs_scrape)
            .collect();

        if unprocessed.is_empty() {
            info!(epoch_id = %report.epoch_id, "No URLs left to scrape");
            return Ok(report.finish(EpochOutcome::AllDone));
        }

        self.results.initialize()?;

        info!(
            epoch_id = %report.epoch_id,
            items = unprocessed.len(),
            "Starting scrape epoch"
        );

        for item in &unprocessed {
            if cancel.is_cancelled() {
                info!(epoch_id = %report.epoch_id, "Scraping cancelled before next item");
                return Ok(report.finish(EpochOutcome::Cancelled));
            }

            report.attempted += 1;
            info!(
                name = %item.name,
                ratings = ?item.pending_ratings,
                "Scraping listing"
            );

            match self.scrape_item(item, cancel).await {
                Ok(fetched) => {
                    report.reviews_collected += fetched.records.len();
                    self.ledger
                        .update_pending_ratings(&item.url, &fetched.unsatisfied)?;

                    if fetched.unsatisfied.is_empty() {
                        self.ledger.update_status(&item.url, ScrapeStatus::Scraped)?;
                        report.scraped += 1;
                    } else {
                        info!(
                            url = %item.url,
                            pending = ?fetched.unsatisfied,
                            "Listing left with pending ratings"
                        );
                        report.partial += 1;
                    }
                }
                Err(e) if e.is_cancelled() => {
                    info!(url = %item.url, "Scraping was cancelled, leaving listing untouched");
                    return Ok(report.finish(EpochOutcome::Cancelled));
                }
                Err(ItemError::Fetch(FetchError::Store(e))) => {
                    return Err(e.context(format!("Failed to store reviews for {}", item.url)));
                }
                Err(e) => {
                    warn!(url = %item.url, error = %e, "Error scraping listing");
                    self.ledger.update_status(&item.url, ScrapeStatus::Failed)?;
                    report.failed += 1;
                }
            }

            if self.pacer.pause(self.item_delay, cancel).await.is_err() {
                info!(epoch_id = %report.epoch_id, "Scraping cancelled between listings");
                return Ok(report.finish(EpochOutcome::Cancelled));
            }
        }

        info!(
            epoch_id = %report.epoch_id,
            scraped = report.scraped,
            partial = report.partial,
            failed = report.failed,
            reviews = report.reviews_collected,
            "One epoch completed"
        );

        Ok(report.finish(EpochOutcome::WorkRemains))
    }

    async fn scrape_item(
        &self,
        item: &WorkItem,
        cancel: &CancellationToken,
    ) -> Result<FetchReport, ItemError> {
        if item.pending_ratings.is_empty() {
            return Ok(FetchReport::default());
        }

        let ids = extract_listing_ids(&item.url)?;
        let report = self
            .fetcher
            .fetch(ids, &item.pending_ratings, &self.results, cancel)
            .await?;

        Ok(report)
    }

    /// Repeat epochs until everything is scraped, the run is cancelled or
    /// `max_epochs` passes have been made. Returns every epoch's report.
    pub async fn run(
        &self,
        max_epochs: u32,
        epoch_pause: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<EpochReport>> {
        let max_epochs = max_epochs.max(1);
        let mut reports = Vec::new();

        for epoch in 1..=max_epochs {
            let report = self.run_epoch(cancel).await?;
            let outcome = report.outcome;
            reports.push(report);

            match outcome {
                EpochOutcome::AllDone | EpochOutcome::Cancelled => break,
                EpochOutcome::WorkRemains if epoch < max_epochs => {
                    if self.pacer.pause(epoch_pause, cancel).await.is_err() {
                        break;
                    }
                }
                EpochOutcome::WorkRemains => {
                    info!(max_epochs, "Epoch limit reached with work remaining");
                }
            }
        }

        Ok(reports)
    }

    /// Reset every ledger item and clear the results store epochs append to
    pub fn reset(&self) -> Result<()> {
        self.ledger.reset(&self.results)
    }

    /// Get the ledger for direct access
    pub fn ledger(&self) -> &L {
        &self.ledger
    }
}

/// Generate a plain-text summary of an epoch
pub fn summarize(report: &EpochReport) -> String {
    let headline = match report.outcome {
        EpochOutcome::AllDone => "All listings scraped.",
        EpochOutcome::WorkRemains => "Epoch completed; listings remain.",
        EpochOutcome::Cancelled => "Epoch cancelled; listings remain.",
    };

    let elapsed = report.finished_at - report.started_at;

    let mut text = format!("Epoch {}\n{}\n", report.epoch_id, headline);
    if report.attempted > 0 {
        text.push_str(&format!(
            "  attempted: {}\n  scraped:   {}\n  partial:   {}\n  failed:    {}\n  reviews:   {}\n",
            report.attempted, report.scraped, report.partial, report.failed, report.reviews_collected
        ));
    }
    text.push_str(&format!("  elapsed:   {}s\n", elapsed.num_seconds()));
    text
}
