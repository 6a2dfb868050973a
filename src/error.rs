use std::time::Duration;

use thiserror::Error;

/// A listing URL without the expected identifier pattern
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no listing identifiers found in url: {0}")]
    MissingIdentifiers(String),

    #[error("listing identifier out of range in url: {0}")]
    OutOfRange(String),
}

/// A cancellable wait was interrupted by shutdown
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Errors raised while fetching reviews for one listing
#[derive(Debug, Error)]
pub enum FetchError {
    /// Cooperative shutdown was requested; never an item-level failure
    #[error("fetch cancelled")]
    Cancelled,

    #[error("page request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ratings endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected ratings response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("credential bundle error: {0}")]
    Credentials(String),

    /// Collected reviews could not be written; never an item-level failure
    #[error("failed to store reviews: {0}")]
    Store(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<Cancelled> for FetchError {
    fn from(_: Cancelled) -> Self {
        FetchError::Cancelled
    }
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    pub fn is_store(&self) -> bool {
        matches!(self, FetchError::Store(_))
    }
}

/// Why a single work item could not be scraped
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ItemError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ItemError::Fetch(e) if e.is_cancelled())
    }
}
