//! Cache population from the source of record.
//!
//! A producer pages the source in score order while a consumer writes each
//! page into the ranked set and detail store. The two run concurrently over
//! a bounded channel, so at most a couple of pages are in memory no matter
//! how large the leaderboard is.

use podium_core::{
    CancelSignal, LeaderboardEntry, LeaderboardName, PodiumResult, SortOrder,
    DEFAULT_POPULATE_PAGE_SIZE,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::cache::{DetailStore, LeaderboardCache, RankedSet};
use crate::source::SourceOfRecord;

/// Pages buffered between producer and consumer.
const PAGE_BUFFER: usize = 2;

/// Outcome of one population run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulationReport {
    /// Non-empty pages written.
    pub pages: usize,
    pub rows: u64,
    /// Stopped early on cancellation. Pages already written stay written.
    pub cancelled: bool,
}

/// Positions `start..=end` (0-based, in the populated order) to capture
/// while streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankWindow {
    pub start: u64,
    pub end: u64,
}

impl RankWindow {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    fn contains(&self, position: u64) -> bool {
        (self.start..=self.end).contains(&position)
    }
}

/// Loads a whole leaderboard from the source of record into the cache.
#[derive(Clone)]
pub struct CachePopulator {
    cache: Arc<dyn LeaderboardCache>,
    source: Arc<dyn SourceOfRecord>,
    page_size: usize,
}

impl CachePopulator {
    pub fn new(cache: Arc<dyn LeaderboardCache>, source: Arc<dyn SourceOfRecord>) -> Self {
        Self {
            cache,
            source,
            page_size: DEFAULT_POPULATE_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Populate the whole leaderboard. Re-running overwrites members with
    /// the same values.
    pub async fn populate(
        &self,
        leaderboard: &LeaderboardName,
        order: SortOrder,
        cancel: &CancelSignal,
    ) -> PodiumResult<PopulationReport> {
        self.populate_capturing(leaderboard, order, None, cancel)
            .await
            .map(|(report, _)| report)
    }

    /// Populate the whole leaderboard and return the rows that streamed past
    /// at the positions in `window`, in order.
    #[instrument(skip(self, cancel), fields(page_size = self.page_size))]
    pub async fn populate_capturing(
        &self,
        leaderboard: &LeaderboardName,
        order: SortOrder,
        window: Option<RankWindow>,
        cancel: &CancelSignal,
    ) -> PodiumResult<(PopulationReport, Vec<LeaderboardEntry>)> {
        let (tx, mut rx) = mpsc::channel::<Vec<LeaderboardEntry>>(PAGE_BUFFER);
        let page_size = self.page_size;

        let producer = async move {
            let mut offset = 0usize;
            let mut pages = 0usize;
            loop {
                if cancel.is_cancelled() {
                    debug!(offset, "Population cancelled between pages");
                    return Ok::<_, podium_core::PodiumError>((pages, true));
                }
                let page = self
                    .source
                    .fetch_page(leaderboard, order, offset, page_size)
                    .await?;
                let short = page.len() < page_size;
                if !page.is_empty() {
                    pages += 1;
                    offset += page.len();
                    if tx.send(page).await.is_err() {
                        // Consumer stopped; its error is reported instead.
                        return Ok((pages, false));
                    }
                }
                if short {
                    return Ok((pages, false));
                }
            }
        };

        let consumer = async {
            let mut position = 0u64;
            let mut captured = Vec::new();
            while let Some(page) = rx.recv().await {
                for entry in page {
                    let member = entry.member_key();
                    self.cache
                        .set_score(&entry.leaderboard, &member, entry.score)
                        .await?;
                    self.cache
                        .set_fields(&entry.leaderboard, &member, entry.detail_fields())
                        .await?;
                    if window.is_some_and(|w| w.contains(position)) {
                        captured.push(entry);
                    }
                    position += 1;
                }
            }
            Ok::<_, podium_core::PodiumError>((position, captured))
        };

        let (produced, consumed) = tokio::join!(producer, consumer);
        let (rows, captured) = consumed?;
        let (pages, cancelled) = produced?;

        let report = PopulationReport {
            pages,
            rows,
            cancelled,
        };
        info!(
            leaderboard = %leaderboard,
            pages = report.pages,
            rows = report.rows,
            cancelled = report.cancelled,
            "Cache populated"
        );
        Ok((report, captured))
    }
}

impl std::fmt::Debug for CachePopulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePopulator")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}
