use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scrape status of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScrapeStatus {
    #[default]
    #[serde(rename = "not scraped", alias = "not_scraped")]
    NotScraped,
    #[serde(rename = "scraped")]
    Scraped,
    #[serde(rename = "failed")]
    Failed,
}

impl ScrapeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeStatus::NotScraped => "not scraped",
            ScrapeStatus::Scraped => "scraped",
            ScrapeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A star-rating bucket (1 to 5) collected independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RatingBucket(u8);

impl RatingBucket {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// The full bucket universe in collection order
    pub fn all() -> Vec<RatingBucket> {
        (Self::MIN..=Self::MAX).map(RatingBucket).collect()
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for RatingBucket {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(RatingBucket(value))
        } else {
            Err(format!(
                "rating bucket {} outside {}..={}",
                value,
                Self::MIN,
                Self::MAX
            ))
        }
    }
}

impl From<RatingBucket> for u8 {
    fn from(bucket: RatingBucket) -> Self {
        bucket.0
    }
}

impl fmt::Display for RatingBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collapse duplicate buckets, keeping the first occurrence of each
pub fn dedup_buckets(buckets: impl IntoIterator<Item = RatingBucket>) -> Vec<RatingBucket> {
    let mut out: Vec<RatingBucket> = Vec::new();
    for bucket in buckets {
        if !out.contains(&bucket) {
            out.push(bucket);
        }
    }
    out
}

/// One scrape target from the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub name: String,
    pub url: String,
    pub status: ScrapeStatus,
    /// Buckets still short of their target count
    pub pending_ratings: Vec<RatingBucket>,
}

impl WorkItem {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            status: ScrapeStatus::NotScraped,
            pending_ratings: RatingBucket::all(),
        }
    }

    /// Eligible for an epoch: anything not yet scraped, failed items included
    pub fn needs_scrape(&self) -> bool {
        self.status != ScrapeStatus::Scraped
    }
}

/// One collected review, ready for the results store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub comment: String,
    /// Filled in later by a labelling process; always empty at collection time
    pub label: Option<String>,
}

impl ReviewRecord {
    pub fn unlabelled(comment: String) -> Self {
        Self {
            comment,
            label: None,
        }
    }
}

/// Listing identifiers parsed out of a product URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingIds {
    pub group_id: u64,
    pub entity_id: u64,
}

/// How an epoch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochOutcome {
    /// Nothing left to scrape; no work was attempted
    AllDone,
    /// The pass finished but some items may still need work
    WorkRemains,
    /// Stopped early on cancellation; work remains
    Cancelled,
}

impl EpochOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, EpochOutcome::AllDone)
    }

    pub fn work_remains(&self) -> bool {
        !self.is_done()
    }
}

/// Summary of one orchestrator pass
#[derive(Debug, Clone)]
pub struct EpochReport {
    pub epoch_id: Uuid,
    pub outcome: EpochOutcome,
    pub attempted: usize,
    pub scraped: usize,
    /// Items that fetched cleanly but left buckets pending
    pub partial: usize,
    pub failed: usize,
    pub reviews_collected: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl EpochReport {
    pub fn start() -> Self {
        let now = Utc::now();
        Self {
            epoch_id: Uuid::new_v4(),
            outcome: EpochOutcome::WorkRemains,
            attempted: 0,
            scraped: 0,
            partial: 0,
            failed: 0,
            reviews_collected: 0,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn finish(mut self, outcome: EpochOutcome) -> Self {
        self.outcome = outcome;
        self.finished_at = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_seed_spelling() {
        let json = serde_json::to_string(&ScrapeStatus::NotScraped).unwrap();
        assert_eq!(json, "\"not scraped\"");

        let parsed: ScrapeStatus = serde_json::from_str("\"not_scraped\"").unwrap();
        assert_eq!(parsed, ScrapeStatus::NotScraped);

        let failed: ScrapeStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(failed, ScrapeStatus::Failed);
    }

    #[test]
    fn test_rating_bucket_bounds() {
        assert!(RatingBucket::try_from(0).is_err());
        assert!(RatingBucket::try_from(6).is_err());
        assert_eq!(RatingBucket::try_from(3).unwrap().value(), 3);

        let parsed: Result<Vec<RatingBucket>, _> = serde_json::from_str("[1, 9]");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_dedup_buckets_keeps_first_occurrence() {
        let buckets: Vec<RatingBucket> = serde_json::from_str("[5, 1, 5, 2, 1]").unwrap();
        let values: Vec<u8> = dedup_buckets(buckets).iter().map(|b| b.value()).collect();
        assert_eq!(values, vec![5, 1, 2]);
    }

    #[test]
    fn test_new_item_needs_every_bucket() {
        let item = WorkItem::new("Kettle", "https://shop.example/kettle-i.1.2");
        assert!(item.needs_scrape());
        assert_eq!(item.pending_ratings, RatingBucket::all());
    }

    #[test]
    fn test_outcome_flags() {
        assert!(EpochOutcome::AllDone.is_done());
        assert!(EpochOutcome::WorkRemains.work_remains());
        assert!(EpochOutcome::Cancelled.work_remains());
    }
}
