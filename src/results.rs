use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::models::ReviewRecord;

const HEADER: [&str; 2] = ["comment", "label"];

/// Append-only destination for collected reviews
pub trait ResultsStore: Send + Sync {
    /// Create the store with its header if it is absent or empty
    fn initialize(&self) -> Result<()>;

    /// Append records after any already stored
    fn append(&self, records: &[ReviewRecord]) -> Result<()>;

    /// Remove the store; a missing store is not an error
    fn clear(&self) -> Result<()>;
}

/// CSV file with a `comment,label` header and fully quoted rows
pub struct CsvResultsStore {
    path: PathBuf,
}

impl CsvResultsStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn has_content(&self) -> Result<bool> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len() > 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to stat results file: {}", self.path.display())),
        }
    }

    fn write_header(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut writer = csv::Writer::from_path(&self.path)
            .with_context(|| format!("Failed to create results file: {}", self.path.display()))?;
        writer.write_record(HEADER)?;
        writer.flush()?;
        Ok(())
    }

    /// Read every stored record back
    pub fn read_all(&self) -> Result<Vec<ReviewRecord>> {
        if !self.has_content()? {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open results file: {}", self.path.display()))?;

        let mut records = Vec::new();
        for row in reader.deserialize() {
            let record: ReviewRecord = row
                .with_context(|| format!("Failed to parse results file: {}", self.path.display()))?;
            records.push(record);
        }
        Ok(records)
    }
}

impl ResultsStore for CsvResultsStore {
    fn initialize(&self) -> Result<()> {
        if self.has_content()? {
            return Ok(());
        }
        self.write_header()?;
        info!(path = %self.path.display(), "Initialized results file");
        Ok(())
    }

    fn append(&self, records: &[ReviewRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if !self.has_content()? {
            self.write_header()?;
        }

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open results file: {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(file);

        for record in records {
            writer.serialize(record)?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to write results file: {}", self.path.display()))?;

        debug!(count = records.len(), path = %self.path.display(), "Appended reviews");

        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Deleted results file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Results file not found, nothing to delete");
                Ok(())
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to delete results file: {}", self.path.display())),
        }
    }
}
