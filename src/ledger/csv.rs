use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::Ledger;
use crate::models::{dedup_buckets, RatingBucket, ScrapeStatus, WorkItem};
use crate::results::ResultsStore;

/// CSV file-based ledger with `name,url,status,pending_ratings` columns
pub struct CsvLedger {
    path: PathBuf,
}

/// On-disk row; `pending_ratings` is a JSON array and may be absent
#[derive(Debug, Deserialize)]
struct LedgerRow {
    name: String,
    url: String,
    status: ScrapeStatus,
    /// Older ledgers call this column `ratings_to_scrape`
    #[serde(default, alias = "ratings_to_scrape")]
    pending_ratings: Option<String>,
}

impl LedgerRow {
    fn into_item(self) -> Result<WorkItem> {
        let pending_ratings = match self.pending_ratings.as_deref().map(str::trim) {
            None | Some("") => RatingBucket::all(),
            Some(raw) => {
                let buckets: Vec<RatingBucket> = serde_json::from_str(raw).with_context(|| {
                    format!("Invalid pending_ratings {:?} for {}", raw, self.url)
                })?;
                dedup_buckets(buckets)
            }
        };

        Ok(WorkItem {
            name: self.name,
            url: self.url,
            status: self.status,
            pending_ratings,
        })
    }

    fn from_item(item: &WorkItem) -> Result<Self> {
        Ok(Self {
            name: item.name.clone(),
            url: item.url.clone(),
            status: item.status,
            pending_ratings: Some(serde_json::to_string(&item.pending_ratings)?),
        })
    }
}

impl CsvLedger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the whole table; later rows repeating a url are dropped
    fn save(&self, items: &[WorkItem]) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(items.len());
        let tmp_path = self.path.with_extension("csv.tmp");

        {
            let mut writer = ::csv::Writer::from_path(&tmp_path)
                .with_context(|| format!("Failed to write ledger: {}", tmp_path.display()))?;

            // Header is written explicitly so an empty ledger keeps its schema
            writer.write_record(["name", "url", "status", "pending_ratings"])?;

            for item in items {
                if !seen.insert(item.url.as_str()) {
                    warn!(url = %item.url, "Dropping duplicate ledger row");
                    continue;
                }

                let row = LedgerRow::from_item(item)?;
                writer.write_record([
                    row.name.as_str(),
                    row.url.as_str(),
                    row.status.as_str(),
                    row.pending_ratings.as_deref().unwrap_or_default(),
                ])?;
            }

            writer
                .flush()
                .with_context(|| format!("Failed to write ledger: {}", tmp_path.display()))?;
        }

        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace ledger: {}", self.path.display()))?;

        debug!(rows = seen.len(), path = %self.path.display(), "Saved ledger");

        Ok(())
    }

    /// Re-read, apply `edit` to rows matching `url`, write back
    fn modify(&self, url: &str, edit: impl Fn(&mut WorkItem)) -> Result<()> {
        let mut items = self.load()?;

        let mut matched = false;
        for item in items.iter_mut().filter(|i| i.url == url) {
            edit(item);
            matched = true;
        }

        if !matched {
            debug!(url, "No ledger row for url, skipping update");
            return Ok(());
        }

        self.save(&items)
    }
}

impl Ledger for CsvLedger {
    fn load(&self) -> Result<Vec<WorkItem>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = ::csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to read ledger: {}", self.path.display()))?;

        let mut items = Vec::new();
        for (index, row) in reader.deserialize::<LedgerRow>().enumerate() {
            let row = row.with_context(|| {
                format!("Failed to parse ledger row {}: {}", index + 1, self.path.display())
            })?;
            items.push(row.into_item()?);
        }

        Ok(items)
    }

    fn update_status(&self, url: &str, status: ScrapeStatus) -> Result<()> {
        self.modify(url, |item| item.status = status)?;
        debug!(url, %status, "Updated status");
        Ok(())
    }

    fn update_pending_ratings(&self, url: &str, ratings: &[RatingBucket]) -> Result<()> {
        let ratings = dedup_buckets(ratings.iter().copied());
        self.modify(url, |item| item.pending_ratings = ratings.clone())?;
        debug!(url, ?ratings, "Updated pending ratings");
        Ok(())
    }

    fn reset(&self, results: &dyn ResultsStore) -> Result<()> {
        let mut items = self.load()?;
        for item in &mut items {
            item.status = ScrapeStatus::NotScraped;
            item.pending_ratings = RatingBucket::all();
        }
        self.save(&items)?;

        info!(rows = items.len(), path = %self.path.display(), "Reset ledger");

        results.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::CsvResultsStore;
    use tempfile::tempdir;

    fn buckets(values: &[u8]) -> Vec<RatingBucket> {
        values
            .iter()
            .map(|v| RatingBucket::try_from(*v).unwrap())
            .collect()
    }

    fn seeded(dir: &Path, content: &str) -> CsvLedger {
        let path = dir.join("urls.csv");
        fs::write(&path, content).unwrap();
        CsvLedger::new(path)
    }

    #[test]
    fn test_missing_ledger_is_empty() {
        let dir = tempdir().unwrap();
        let ledger = CsvLedger::new(dir.path().join("urls.csv"));

        assert!(ledger.load().unwrap().is_empty());
        ledger.update_status("https://x/a-i.1.2", ScrapeStatus::Scraped).unwrap();
        assert!(!ledger.path().exists());
    }

    #[test]
    fn test_load_seed_without_pending_column() {
        let dir = tempdir().unwrap();
        let ledger = seeded(
            dir.path(),
            "name,url,status\nKettle,https://x/kettle-i.1.2,not scraped\nLamp,https://x/lamp-i.3.4,failed\n",
        );

        let items = ledger.load().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Kettle");
        assert_eq!(items[0].status, ScrapeStatus::NotScraped);
        assert_eq!(items[0].pending_ratings, RatingBucket::all());
        assert_eq!(items[1].status, ScrapeStatus::Failed);
    }

    #[test]
    fn test_load_python_style_json_array() {
        let dir = tempdir().unwrap();
        let ledger = seeded(
            dir.path(),
            "name,url,status,pending_ratings\nKettle,https://x/kettle-i.1.2,not scraped,\"[1, 3, 3]\"\n",
        );

        let items = ledger.load().unwrap();
        assert_eq!(items[0].pending_ratings, buckets(&[1, 3]));
    }

    #[test]
    fn test_ratings_to_scrape_column_is_read_and_rewritten() {
        let dir = tempdir().unwrap();
        let ledger = seeded(
            dir.path(),
            "name,url,status,ratings_to_scrape\nKettle,https://x/kettle-i.1.2,not scraped,\"[3, 5]\"\nLamp,https://x/lamp-i.3.4,failed,\"[1]\"\n",
        );

        let items = ledger.load().unwrap();
        assert_eq!(items[0].pending_ratings, buckets(&[3, 5]));
        assert_eq!(items[1].pending_ratings, buckets(&[1]));

        ledger
            .update_status("https://x/lamp-i.3.4", ScrapeStatus::Scraped)
            .unwrap();

        let raw = fs::read_to_string(ledger.path()).unwrap();
        assert!(raw.starts_with("name,url,status,pending_ratings\n"));
        assert_eq!(ledger.load().unwrap()[0].pending_ratings, buckets(&[3, 5]));
    }

    #[test]
    fn test_load_rejects_out_of_range_bucket() {
        let dir = tempdir().unwrap();
        let ledger = seeded(
            dir.path(),
            "name,url,status,pending_ratings\nKettle,https://x/kettle-i.1.2,not scraped,[7]\n",
        );

        assert!(ledger.load().is_err());
    }

    #[test]
    fn test_update_status_preserves_order_and_other_rows() {
        let dir = tempdir().unwrap();
        let ledger = seeded(
            dir.path(),
            "name,url,status\nA,https://x/a-i.1.1,not scraped\nB,https://x/b-i.1.2,not scraped\nC,https://x/c-i.1.3,failed\n",
        );

        ledger
            .update_status("https://x/b-i.1.2", ScrapeStatus::Scraped)
            .unwrap();

        let items = ledger.load().unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(items[0].status, ScrapeStatus::NotScraped);
        assert_eq!(items[1].status, ScrapeStatus::Scraped);
        assert_eq!(items[2].status, ScrapeStatus::Failed);
    }

    #[test]
    fn test_unknown_url_is_ignored() {
        let dir = tempdir().unwrap();
        let content = "name,url,status\nA,https://x/a-i.1.1,not scraped\n";
        let ledger = seeded(dir.path(), content);

        ledger
            .update_status("https://x/missing-i.9.9", ScrapeStatus::Failed)
            .unwrap();

        assert_eq!(fs::read_to_string(ledger.path()).unwrap(), content);
    }

    #[test]
    fn test_update_pending_ratings() {
        let dir = tempdir().unwrap();
        let ledger = seeded(
            dir.path(),
            "name,url,status\nA,https://x/a-i.1.1,not scraped\n",
        );

        ledger
            .update_pending_ratings("https://x/a-i.1.1", &buckets(&[2, 5]))
            .unwrap();

        let items = ledger.load().unwrap();
        assert_eq!(items[0].pending_ratings, buckets(&[2, 5]));
        assert_eq!(items[0].status, ScrapeStatus::NotScraped);

        let raw = fs::read_to_string(ledger.path()).unwrap();
        assert!(raw.starts_with("name,url,status,pending_ratings\n"));
        assert!(raw.contains("\"[2,5]\""));
    }

    #[test]
    fn test_write_back_drops_duplicate_urls() {
        let dir = tempdir().unwrap();
        let ledger = seeded(
            dir.path(),
            "name,url,status\nFirst,https://x/a-i.1.1,not scraped\nSecond,https://x/a-i.1.1,not scraped\n",
        );

        ledger
            .update_status("https://x/a-i.1.1", ScrapeStatus::Scraped)
            .unwrap();

        let items = ledger.load().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "First");
        assert_eq!(items[0].status, ScrapeStatus::Scraped);
    }

    #[test]
    fn test_sees_external_edits_between_writes() {
        let dir = tempdir().unwrap();
        let ledger = seeded(
            dir.path(),
            "name,url,status\nA,https://x/a-i.1.1,not scraped\n",
        );
        ledger
            .update_status("https://x/a-i.1.1", ScrapeStatus::Failed)
            .unwrap();

        let mut raw = fs::read_to_string(ledger.path()).unwrap();
        raw.push_str("B,https://x/b-i.1.2,not scraped,\n");
        fs::write(ledger.path(), raw).unwrap();

        ledger
            .update_status("https://x/b-i.1.2", ScrapeStatus::Scraped)
            .unwrap();

        let items = ledger.load().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].status, ScrapeStatus::Failed);
        assert_eq!(items[1].status, ScrapeStatus::Scraped);
        assert_eq!(items[1].pending_ratings, RatingBucket::all());
    }

    #[test]
    fn test_reset_restores_everything_and_is_repeatable() {
        let dir = tempdir().unwrap();
        let ledger = seeded(
            dir.path(),
            "name,url,status,pending_ratings\nA,https://x/a-i.1.1,scraped,[]\nB,https://x/b-i.1.2,failed,[4]\n",
        );
        let results_path = dir.path().join("reviews.csv");
        fs::write(&results_path, "comment,label\n\"ok\",\"\"\n").unwrap();
        let results = CsvResultsStore::new(&results_path);

        ledger.reset(&results).unwrap();

        let items = ledger.load().unwrap();
        assert!(items
            .iter()
            .all(|i| i.status == ScrapeStatus::NotScraped && i.pending_ratings == RatingBucket::all()));
        assert!(!results_path.exists());

        ledger.reset(&results).unwrap();
        assert_eq!(ledger.load().unwrap().len(), 2);
    }
}
