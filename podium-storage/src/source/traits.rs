//! Source-of-record contract.

use async_trait::async_trait;
use podium_core::{LeaderboardEntry, LeaderboardName, PlayerId, PodiumResult, SortOrder};
use std::cmp::Ordering;

/// The durable, authoritative store for leaderboard entries.
///
/// Pages are ordered by score in the requested direction with ties broken by
/// player id, matching the ranked set's member order, so a page read at
/// offset `n` lines up with cache ranks `n..`.
#[async_trait]
pub trait SourceOfRecord: Send + Sync {
    async fn fetch_one(
        &self,
        leaderboard: &LeaderboardName,
        player_id: &PlayerId,
    ) -> PodiumResult<Option<LeaderboardEntry>>;

    async fn fetch_page(
        &self,
        leaderboard: &LeaderboardName,
        order: SortOrder,
        offset: usize,
        page_size: usize,
    ) -> PodiumResult<Vec<LeaderboardEntry>>;

    /// Insert or replace the entry for `(leaderboard, player_id)`.
    /// Applying the same entry twice leaves the store unchanged.
    async fn upsert(&self, entry: LeaderboardEntry) -> PodiumResult<()>;

    async fn count(&self, leaderboard: &LeaderboardName) -> PodiumResult<u64>;
}

/// Comparator shared by the in-memory adapters.
pub(crate) fn compare_entries(a: &LeaderboardEntry, b: &LeaderboardEntry, order: SortOrder) -> Ordering {
    let ascending = a
        .score
        .total_cmp(&b.score)
        .then_with(|| a.player_id.cmp(&b.player_id));
    match order {
        SortOrder::Ascending => ascending,
        SortOrder::Descending => ascending.reverse(),
    }
}

/// Sort and slice one page.
pub(crate) fn page_of(
    mut rows: Vec<LeaderboardEntry>,
    order: SortOrder,
    offset: usize,
    page_size: usize,
) -> Vec<LeaderboardEntry> {
    rows.sort_by(|a, b| compare_entries(a, b, order));
    rows.into_iter().skip(offset).take(page_size).collect()
}
