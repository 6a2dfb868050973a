pub mod http;

pub use http::HttpReviewSource;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::FetchError;
use crate::models::{ListingIds, RatingBucket, ReviewRecord};
use crate::normalize::normalize_comment;
use crate::pacing::{DelayPolicy, Pacer};
use crate::results::ResultsStore;

/// One page request against the ratings endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub ids: ListingIds,
    pub rating: RatingBucket,
    pub offset: u32,
    pub limit: u32,
}

/// One page of ratings as returned by the source.
///
/// Missing or null `data`, `ratings` and `comment` keys all read as empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RatingsPage {
    #[serde(default)]
    data: Option<RatingsData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RatingsData {
    #[serde(default)]
    ratings: Option<Vec<RawRating>>,
}

/// A single rating entry; only the comment is read
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRating {
    #[serde(default)]
    comment: Option<serde_json::Value>,
}

impl RawRating {
    pub fn with_comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(serde_json::Value::String(comment.into())),
        }
    }

    /// Comment text, or `None` when absent or not a string
    pub fn comment_text(&self) -> Option<&str> {
        self.comment.as_ref().and_then(|c| c.as_str())
    }
}

impl RatingsPage {
    pub fn from_ratings(ratings: Vec<RawRating>) -> Self {
        Self {
            data: Some(RatingsData {
                ratings: Some(ratings),
            }),
        }
    }

    pub fn ratings(&self) -> &[RawRating] {
        self.data
            .as_ref()
            .and_then(|d| d.ratings.as_deref())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings().is_empty()
    }
}

/// Something that can open a browsing session against the review source
#[async_trait]
pub trait ReviewSource: Send + Sync {
    type Session: SourceSession;

    async fn open_session(&self) -> Result<Self::Session, FetchError>;
}

/// An open session. `close` must be called once the caller is done with it.
#[async_trait]
pub trait SourceSession: Send {
    async fn fetch_page(&mut self, query: &PageQuery) -> Result<RatingsPage, FetchError>;

    async fn close(&mut self);
}

/// Pagination and pacing knobs for the fetch loop
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub page_size: u32,
    pub target_count: u32,
    pub page_timeout: Duration,
    pub page_delay: DelayPolicy,
    pub session_warmup: Duration,
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        let (min, max) = config.pacing.page_delay_range();
        Self {
            page_size: config.fetch.page_size,
            target_count: config.fetch.target_count,
            page_timeout: config.fetch.page_timeout(),
            page_delay: DelayPolicy::jitter(min, max),
            session_warmup: config.pacing.session_warmup(),
        }
    }
}

/// What one listing's fetch produced
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub records: Vec<ReviewRecord>,
    /// Buckets whose pages ran out before the target count, in request order
    pub unsatisfied: Vec<RatingBucket>,
    pub pages_requested: u32,
}

/// Collects reviews for one listing, bucket by bucket
pub struct ReviewFetcher<S: ReviewSource> {
    source: S,
    pacer: Pacer,
    settings: FetchSettings,
}

impl<S: ReviewSource> ReviewFetcher<S> {
    pub fn new(source: S, pacer: Pacer, settings: FetchSettings) -> Self {
        Self {
            source,
            pacer,
            settings,
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetch every requested bucket for `ids` and append the collected
    /// reviews to `store`.
    ///
    /// The session is closed on every exit path before this returns. A failed
    /// append is reported as `FetchError::Store`. Records
    /// are appended once, after the session is closed, and never when the
    /// fetch failed or was cancelled.
    #[instrument(skip(self, buckets, store, cancel), fields(group_id = ids.group_id, entity_id = ids.entity_id))]
    pub async fn fetch(
        &self,
        ids: ListingIds,
        buckets: &[RatingBucket],
        store: &dyn ResultsStore,
        cancel: &CancellationToken,
    ) -> Result<FetchReport, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        // Opening includes the priming request, so it races the token too
        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            opened = self.source.open_session() => opened?,
        };
        let outcome = self.collect(&mut session, ids, buckets, cancel).await;
        session.close().await;

        let report = outcome?;

        if !report.records.is_empty() {
            store.append(&report.records).map_err(FetchError::Store)?;
        }

        info!(
            reviews = report.records.len(),
            pages = report.pages_requested,
            unsatisfied = ?report.unsatisfied,
            "Listing fetch complete"
        );

        Ok(report)
    }

    async fn collect(
        &self,
        session: &mut S::Session,
        ids: ListingIds,
        buckets: &[RatingBucket],
        cancel: &CancellationToken,
    ) -> Result<FetchReport, FetchError> {
        self.pacer.pause(self.settings.session_warmup, cancel).await?;

        let mut report = FetchReport::default();

        for &bucket in buckets {
            let collected = self
                .collect_bucket(session, ids, bucket, &mut report, cancel)
                .await?;

            if collected < self.settings.target_count {
                info!(
                    rating = %bucket,
                    collected,
                    target = self.settings.target_count,
                    "Bucket exhausted before target"
                );
                report.unsatisfied.push(bucket);
            }
        }

        Ok(report)
    }

    /// Page through one bucket until the target is met or a page comes back
    /// empty. Returns how many reviews the bucket yielded.
    async fn collect_bucket(
        &self,
        session: &mut S::Session,
        ids: ListingIds,
        rating: RatingBucket,
        report: &mut FetchReport,
        cancel: &CancellationToken,
    ) -> Result<u32, FetchError> {
        let target = self.settings.target_count;
        let mut offset = 0u32;
        let mut collected = 0u32;

        while collected < target {
            // Space out consecutive requests across the whole session
            if report.pages_requested > 0 {
                self.pacer
                    .pause_with(&self.settings.page_delay, cancel)
                    .await?;
            }

            let query = PageQuery {
                ids,
                rating,
                offset,
                limit: self.settings.page_size,
            };
            let page = self.request_page(session, &query, cancel).await?;
            report.pages_requested += 1;

            if page.is_empty() {
                debug!(rating = %rating, offset, collected, "Empty page, bucket exhausted");
                break;
            }

            for raw in page.ratings() {
                if collected >= target {
                    break;
                }
                let comment = normalize_comment(raw.comment_text().unwrap_or_default());
                if comment.is_empty() {
                    continue;
                }
                report.records.push(ReviewRecord::unlabelled(comment));
                collected += 1;
            }

            debug!(rating = %rating, offset, collected, "Fetched page");

            offset = offset.saturating_add(self.settings.page_size);
        }

        Ok(collected)
    }

    async fn request_page(
        &self,
        session: &mut S::Session,
        query: &PageQuery,
        cancel: &CancellationToken,
    ) -> Result<RatingsPage, FetchError> {
        let timeout = self.settings.page_timeout;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = tokio::time::timeout(timeout, session.fetch_page(query)) => {
                result.map_err(|_| FetchError::Timeout(timeout))?
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// What a scripted page request should do
    #[derive(Debug, Clone)]
    pub enum Scripted {
        Comments(Vec<&'static str>),
        Fail,
        CancelThenEmpty(CancellationToken),
        /// Never answers
        Hang,
    }

    /// In-memory source answering from a per-(entity, rating) script
    #[derive(Clone, Default)]
    pub struct ScriptedSource {
        pages: Arc<Mutex<HashMap<(u64, u8), Vec<Scripted>>>>,
        pub queries: Arc<Mutex<Vec<PageQuery>>>,
        pub opened: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
        hang_on_open: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue pages for one entity and rating; unscripted requests get an empty page
        pub fn script(self, entity_id: u64, rating: u8, pages: Vec<Scripted>) -> Self {
            self.pages
                .lock()
                .unwrap()
                .insert((entity_id, rating), pages);
            self
        }

        /// Make `open_session` wait forever
        pub fn hanging_open(self) -> Self {
            self.hang_on_open.store(true, Ordering::SeqCst);
            self
        }

        pub fn requests(&self) -> Vec<PageQuery> {
            self.queries.lock().unwrap().clone()
        }

        pub fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        pub fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    pub struct ScriptedSession {
        source: ScriptedSource,
    }

    #[async_trait]
    impl ReviewSource for ScriptedSource {
        type Session = ScriptedSession;

        async fn open_session(&self) -> Result<Self::Session, FetchError> {
            if self.hang_on_open.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptedSession {
                source: self.clone(),
            })
        }
    }

    #[async_trait]
    impl SourceSession for ScriptedSession {
        async fn fetch_page(&mut self, query: &PageQuery) -> Result<RatingsPage, FetchError> {
            self.source.queries.lock().unwrap().push(*query);

            let next = {
                let mut pages = self.source.pages.lock().unwrap();
                pages
                    .get_mut(&(query.ids.entity_id, query.rating.value()))
                    .and_then(|queue| (!queue.is_empty()).then(|| queue.remove(0)))
            };

            match next {
                None => Ok(RatingsPage::default()),
                Some(Scripted::Comments(comments)) => Ok(RatingsPage::from_ratings(
                    comments.into_iter().map(RawRating::with_comment).collect(),
                )),
                Some(Scripted::Fail) => Err(FetchError::Status {
                    status: 500,
                    body: "upstream error".to_string(),
                }),
                Some(Scripted::CancelThenEmpty(token)) => {
                    token.cancel();
                    Ok(RatingsPage::default())
                }
                Some(Scripted::Hang) => std::future::pending().await,
            }
        }

        async fn close(&mut self) {
            self.source.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
