//! Podium Test Utilities
//!
//! Shared test infrastructure for the Podium workspace:
//! - Proptest generators for identifiers, scores and whole leaderboards
//! - Fixtures for seeded stores
//! - Fault-injecting wrappers around the cache, source of record and channel
//! - Assertions over ranked results

pub use podium_core::{
    CancelSignal, LeaderboardEntry, LeaderboardName, MemberKey, PlayerDetail, PlayerId,
    PlayerScoreResult, PodiumError, PodiumResult, SortOrder,
};
pub use podium_storage::{InMemoryCache, RelationalStore};

use async_trait::async_trait;
use podium_core::{CacheError, RelayError};
use podium_events::{IntentionChannel, Subscription};
use podium_storage::{
    CacheTransaction, DetailStore, RankedSet, SourceOfRecord, TransactionReceipt,
    TransactionalCache,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::collection::hash_map;
    use proptest::prelude::*;

    pub fn arb_player_id() -> impl Strategy<Value = PlayerId> {
        "[a-z0-9_]{1,16}".prop_filter_map("valid player id", |s| PlayerId::new(s).ok())
    }

    pub fn arb_score() -> impl Strategy<Value = f64> {
        -1.0e6f64..1.0e6
    }

    pub fn arb_detail() -> impl Strategy<Value = PlayerDetail> {
        ("[A-Z][a-z]{0,8}", "[A-Z][a-z]{0,8}", "[A-Z]{2}")
            .prop_map(|(first, last, country)| PlayerDetail::new(first, last, country))
    }

    /// A leaderboard of distinct players, between 1 and `max` entries.
    pub fn arb_board(max: usize) -> impl Strategy<Value = Vec<(PlayerId, f64)>> {
        hash_map("[a-z0-9]{1,12}", arb_score(), 1..=max.max(1)).prop_map(|players| {
            let mut board: Vec<(PlayerId, f64)> = players
                .into_iter()
                .filter_map(|(id, score)| PlayerId::new(id).ok().map(|id| (id, score)))
                .collect();
            board.sort_by(|a, b| a.0.cmp(&b.0));
            board
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    pub fn leaderboard() -> LeaderboardName {
        LeaderboardName::global()
    }

    pub fn player(id: &str) -> PlayerId {
        PlayerId::new(id).unwrap_or_else(|e| panic!("fixture player id {id:?}: {e}"))
    }

    pub fn member(id: &str) -> MemberKey {
        MemberKey::for_player(&player(id))
    }

    pub fn entry(id: &str, score: f64) -> LeaderboardEntry {
        LeaderboardEntry::new(leaderboard(), player(id), score)
            .with_detail(PlayerDetail::new(format!("First-{id}"), format!("Last-{id}"), "NL"))
    }

    /// `n` players `p0000..` with scores `0.0, 10.0, 20.0, ...`.
    pub fn numbered_entries(n: usize) -> Vec<LeaderboardEntry> {
        (0..n)
            .map(|i| entry(&format!("p{i:04}"), i as f64 * 10.0))
            .collect()
    }

    pub fn board_entries(board: &[(PlayerId, f64)]) -> Vec<LeaderboardEntry> {
        board
            .iter()
            .map(|(id, score)| entry(id.as_str(), *score))
            .collect()
    }

    pub fn seeded_store(entries: impl IntoIterator<Item = LeaderboardEntry>) -> Arc<RelationalStore> {
        Arc::new(RelationalStore::with_entries(entries))
    }
}

// ============================================================================
// FAULT INJECTION
// ============================================================================

fn cache_down(operation: &str) -> PodiumError {
    PodiumError::Cache(CacheError::Unavailable {
        operation: operation.to_string(),
        reason: "injected fault".to_string(),
    })
}

/// In-memory cache whose reads and writes can be switched off.
#[derive(Debug, Default)]
pub struct FaultyCache {
    inner: InMemoryCache,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FaultyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wrapping(inner: InMemoryCache) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn inner(&self) -> &InMemoryCache {
        &self.inner
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn read(&self, operation: &str) -> PodiumResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(cache_down(operation));
        }
        Ok(())
    }

    fn write(&self, operation: &str) -> PodiumResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(cache_down(operation));
        }
        Ok(())
    }
}

#[async_trait]
impl RankedSet for FaultyCache {
    async fn set_score(
        &self,
        set: &LeaderboardName,
        member: &MemberKey,
        score: f64,
    ) -> PodiumResult<bool> {
        self.write("set_score")?;
        self.inner.set_score(set, member, score).await
    }

    async fn score(&self, set: &LeaderboardName, member: &MemberKey) -> PodiumResult<Option<f64>> {
        self.read("score")?;
        self.inner.score(set, member).await
    }

    async fn rank(
        &self,
        set: &LeaderboardName,
        member: &MemberKey,
        order: SortOrder,
    ) -> PodiumResult<Option<u64>> {
        self.read("rank")?;
        self.inner.rank(set, member, order).await
    }

    async fn range(
        &self,
        set: &LeaderboardName,
        start: u64,
        end: u64,
        order: SortOrder,
    ) -> PodiumResult<Vec<(MemberKey, f64)>> {
        self.read("range")?;
        self.inner.range(set, start, end, order).await
    }

    async fn count(&self, set: &LeaderboardName) -> PodiumResult<u64> {
        self.read("count")?;
        self.inner.count(set).await
    }

    async fn remove_member(&self, set: &LeaderboardName, member: &MemberKey) -> PodiumResult<bool> {
        self.write("remove_member")?;
        self.inner.remove_member(set, member).await
    }
}

#[async_trait]
impl DetailStore for FaultyCache {
    async fn set_fields(
        &self,
        set: &LeaderboardName,
        member: &MemberKey,
        fields: HashMap<String, String>,
    ) -> PodiumResult<()> {
        self.write("set_fields")?;
        self.inner.set_fields(set, member, fields).await
    }

    async fn get_fields(
        &self,
        set: &LeaderboardName,
        member: &MemberKey,
    ) -> PodiumResult<Option<HashMap<String, String>>> {
        self.read("get_fields")?;
        self.inner.get_fields(set, member).await
    }

    async fn remove_fields(&self, set: &LeaderboardName, member: &MemberKey) -> PodiumResult<bool> {
        self.write("remove_fields")?;
        self.inner.remove_fields(set, member).await
    }
}

#[async_trait]
impl TransactionalCache for FaultyCache {
    async fn execute(&self, tx: CacheTransaction) -> PodiumResult<TransactionReceipt> {
        self.write("execute")?;
        self.inner.execute(tx).await
    }
}

/// Source of record that fails on demand and counts what it accepted.
pub struct FaultySource {
    inner: Arc<dyn SourceOfRecord>,
    unavailable: AtomicBool,
    failing_upserts: AtomicU32,
    upserts: AtomicU64,
}

impl FaultySource {
    pub fn new(inner: Arc<dyn SourceOfRecord>) -> Self {
        Self {
            inner,
            unavailable: AtomicBool::new(false),
            failing_upserts: AtomicU32::new(0),
            upserts: AtomicU64::new(0),
        }
    }

    /// Every call fails until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The next `n` upserts fail with a retryable error.
    pub fn fail_next_upserts(&self, n: u32) {
        self.failing_upserts.store(n, Ordering::SeqCst);
    }

    /// Upserts that reached the inner store.
    pub fn upserts(&self) -> u64 {
        self.upserts.load(Ordering::SeqCst)
    }

    fn check(&self, operation: &str) -> PodiumResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PodiumError::store_unavailable(operation, "injected fault"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for FaultySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultySource")
            .field("unavailable", &self.unavailable)
            .field("failing_upserts", &self.failing_upserts)
            .field("upserts", &self.upserts)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceOfRecord for FaultySource {
    async fn fetch_one(
        &self,
        leaderboard: &LeaderboardName,
        player_id: &PlayerId,
    ) -> PodiumResult<Option<LeaderboardEntry>> {
        self.check("fetch_one")?;
        self.inner.fetch_one(leaderboard, player_id).await
    }

    async fn fetch_page(
        &self,
        leaderboard: &LeaderboardName,
        order: SortOrder,
        offset: usize,
        page_size: usize,
    ) -> PodiumResult<Vec<LeaderboardEntry>> {
        self.check("fetch_page")?;
        self.inner
            .fetch_page(leaderboard, order, offset, page_size)
            .await
    }

    async fn upsert(&self, entry: LeaderboardEntry) -> PodiumResult<()> {
        self.check("upsert")?;
        let remaining = self
            .failing_upserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_ok() {
            return Err(PodiumError::store_unavailable("upsert", "injected fault"));
        }
        self.inner.upsert(entry).await?;
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn count(&self, leaderboard: &LeaderboardName) -> PodiumResult<u64> {
        self.check("count")?;
        self.inner.count(leaderboard).await
    }
}

/// Channel on which every publish and subscribe fails.
#[derive(Debug, Default)]
pub struct FailingChannel;

#[async_trait]
impl IntentionChannel for FailingChannel {
    async fn publish_raw(&self, topic: &str, _payload: String) -> PodiumResult<usize> {
        Err(RelayError::Channel {
            channel: topic.to_string(),
            reason: "injected fault".to_string(),
        }
        .into())
    }

    async fn subscribe(&self, topic: &str) -> PodiumResult<Subscription> {
        Err(RelayError::Channel {
            channel: topic.to_string(),
            reason: "injected fault".to_string(),
        }
        .into())
    }

    fn subscriber_count(&self, _topic: &str) -> usize {
        0
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

/// Ranks run `first, first + 1, ...` without gaps or repeats.
pub fn assert_ranks_contiguous(results: &[PlayerScoreResult], first: i64) {
    for (i, result) in results.iter().enumerate() {
        assert_eq!(
            result.rank,
            first + i as i64,
            "rank gap at index {} ({})",
            i,
            result.player_id
        );
    }
}

/// Scores never move against `order`.
pub fn assert_ordered(results: &[PlayerScoreResult], order: SortOrder) {
    for pair in results.windows(2) {
        let (a, b) = (pair[0].score, pair[1].score);
        if order.is_desc() {
            assert!(a >= b, "{} before {} in descending order", a, b);
        } else {
            assert!(a <= b, "{} before {} in ascending order", a, b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[tokio::test]
    async fn test_faulty_cache_switches() {
        let cache = FaultyCache::new();
        cache.set_score(&leaderboard(), &member("a"), 1.0).await.unwrap();

        cache.fail_reads(true);
        assert!(cache.score(&leaderboard(), &member("a")).await.is_err());
        assert!(cache.set_score(&leaderboard(), &member("b"), 2.0).await.is_ok());

        cache.fail_reads(false);
        cache.fail_writes(true);
        assert_eq!(cache.count(&leaderboard()).await.unwrap(), 2);
        assert!(cache.set_score(&leaderboard(), &member("c"), 3.0).await.is_err());
    }

    #[tokio::test]
    async fn test_faulty_source_fails_n_upserts() {
        let source = FaultySource::new(seeded_store(Vec::new()));
        source.fail_next_upserts(2);
        assert!(source.upsert(entry("a", 1.0)).await.unwrap_err().is_retryable());
        assert!(source.upsert(entry("a", 1.0)).await.is_err());
        source.upsert(entry("a", 1.0)).await.unwrap();
        assert_eq!(source.upserts(), 1);
        assert!(source.fetch_one(&leaderboard(), &player("a")).await.unwrap().is_some());
    }

    #[test]
    fn test_assertions_accept_ordered_results() {
        let results: Vec<PlayerScoreResult> = [("a", 3.0), ("b", 2.0), ("c", 2.0)]
            .iter()
            .enumerate()
            .map(|(i, (id, score))| {
                PlayerScoreResult::new(
                    leaderboard(),
                    player(id),
                    *score,
                    i as i64 + 1,
                    PlayerDetail::default(),
                )
            })
            .collect();
        assert_ranks_contiguous(&results, 1);
        assert_ordered(&results, SortOrder::Descending);
    }
}
