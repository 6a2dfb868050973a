pub mod config;
pub mod error;
pub mod fetcher;
pub mod identifiers;
pub mod ledger;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod pacing;
pub mod results;

pub use config::Config;
pub use error::{Cancelled, FetchError, ItemError, ParseError};
pub use fetcher::{FetchSettings, HttpReviewSource, ReviewFetcher, ReviewSource, SourceSession};
pub use identifiers::extract_listing_ids;
pub use ledger::{CsvLedger, Ledger};
pub use models::*;
pub use normalize::normalize_comment;
pub use orchestrator::{summarize, Orchestrator};
pub use pacing::{DelayPolicy, Pacer};
pub use results::{CsvResultsStore, ResultsStore};
