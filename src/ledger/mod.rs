pub mod csv;

pub use self::csv::CsvLedger;

use anyhow::Result;

use crate::models::{RatingBucket, ScrapeStatus, WorkItem};
use crate::results::ResultsStore;

/// Durable table of scrape targets.
///
/// Every mutation is a full read-modify-write keyed by url; implementations
/// keep no cached rows between calls so edits made between runs are seen.
/// There is no locking: callers guarantee a single writer.
pub trait Ledger: Send + Sync {
    /// All items in stored order; a missing table is an empty ledger
    fn load(&self) -> Result<Vec<WorkItem>>;

    /// Set the status of the item with this url; unknown urls are ignored
    fn update_status(&self, url: &str, status: ScrapeStatus) -> Result<()>;

    /// Replace the pending buckets of the item with this url; unknown urls are ignored
    fn update_pending_ratings(&self, url: &str, ratings: &[RatingBucket]) -> Result<()>;

    /// Mark every item not scraped with all buckets pending and clear
    /// `results`
    fn reset(&self, results: &dyn ResultsStore) -> Result<()>;
}
