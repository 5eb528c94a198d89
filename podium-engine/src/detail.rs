//! Detail resolution
//!
//! The ranked set only knows scores. Display fields come from the detail
//! store, or on a miss from the source of record, which also backfills the
//! cache so the next lookup hits.

use podium_core::{
    CancelSignal, LeaderboardEntry, LeaderboardName, MemberKey, PlayerDetail, PodiumError,
    PodiumResult,
};
use podium_storage::{DetailStore, RankedSet};
use tracing::{debug, instrument, warn};

use crate::engine::{degraded, RankingEngine};

impl RankingEngine {
    /// Display fields of a member. `None` when neither store knows it.
    #[instrument(skip_all, fields(leaderboard = %leaderboard, member = %member))]
    pub async fn get_detail(
        &self,
        leaderboard: &LeaderboardName,
        member: &MemberKey,
        cancel: &CancelSignal,
    ) -> PodiumResult<Option<PlayerDetail>> {
        cancel.check()?;
        let cached = degraded(
            self.cache().get_fields(leaderboard, member).await,
            "get_fields",
        )?;
        if let Some(fields) = cached.filter(|f| !f.is_empty()) {
            debug!("Detail cache hit");
            return Ok(Some(PlayerDetail::from_fields(&fields)));
        }

        debug!("Detail cache miss, loading entry from source of record");
        cancel.check()?;
        let Some(entry) = self
            .source()
            .fetch_one(leaderboard, &member.player_id())
            .await?
        else {
            return Ok(None);
        };
        if let Err(e) = self.backfill(&entry).await {
            warn!(error = %e, "Could not backfill cache after detail miss");
        }
        Ok(Some(entry.detail()))
    }

    /// Detail of a member, blank when unknown. Stale or missing detail never
    /// blocks a rank answer, and neither does a source of record that is down.
    pub(crate) async fn detail_or_blank(
        &self,
        leaderboard: &LeaderboardName,
        member: &MemberKey,
        cancel: &CancelSignal,
    ) -> PodiumResult<PlayerDetail> {
        match self.get_detail(leaderboard, member, cancel).await {
            Ok(detail) => Ok(detail.unwrap_or_default()),
            Err(PodiumError::Store(e)) => {
                warn!(error = %e, "Detail lookup failed, answering with blank detail");
                Ok(PlayerDetail::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Load a source-of-record entry into whichever cache side lacks it.
    /// A score already in the ranked set is newer than the source of record
    /// under write-behind, so it is never overwritten here.
    pub(crate) async fn backfill(&self, entry: &LeaderboardEntry) -> PodiumResult<()> {
        let member = entry.member_key();
        let cache = self.cache();
        if cache.score(&entry.leaderboard, &member).await?.is_none() {
            cache
                .set_score(&entry.leaderboard, &member, entry.score)
                .await?;
        }
        let has_fields = cache
            .get_fields(&entry.leaderboard, &member)
            .await?
            .is_some_and(|f| !f.is_empty());
        if !has_fields {
            cache
                .set_fields(&entry.leaderboard, &member, entry.detail_fields())
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use podium_core::{CacheConfig, LeaderboardEntry, PlayerId};
    use podium_storage::{InMemoryCache, RelationalStore, SourceOfRecord};
    use podium_test_utils::FaultySource;
    use std::sync::Arc;

    use super::*;

    fn member(id: &str) -> MemberKey {
        MemberKey::for_player(&PlayerId::new(id).unwrap())
    }

    #[tokio::test]
    async fn test_detail_miss_backfills_both_stores() {
        let cache = Arc::new(InMemoryCache::new());
        let source = Arc::new(RelationalStore::new());
        source
            .upsert(
                LeaderboardEntry::new(LeaderboardName::global(), PlayerId::new("p1").unwrap(), 7.0)
                    .with_detail(PlayerDetail::new("Grace", "Hopper", "US")),
            )
            .await
            .unwrap();
        let engine = RankingEngine::new(cache.clone(), source, CacheConfig::default());

        let detail = engine
            .get_detail(&LeaderboardName::global(), &member("p1"), &CancelSignal::never())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(detail.last_name, "Hopper");
        assert_eq!(
            cache.score(&LeaderboardName::global(), &member("p1")).await.unwrap(),
            Some(7.0)
        );
        assert!(cache
            .get_fields(&LeaderboardName::global(), &member("p1"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_backfill_keeps_newer_cached_score() {
        let cache = Arc::new(InMemoryCache::new());
        let source = Arc::new(RelationalStore::new());
        source
            .upsert(LeaderboardEntry::new(LeaderboardName::global(), PlayerId::new("p1").unwrap(), 1.0))
            .await
            .unwrap();
        cache
            .set_score(&LeaderboardName::global(), &member("p1"), 50.0)
            .await
            .unwrap();
        let engine = RankingEngine::new(cache.clone(), source, CacheConfig::default());

        engine
            .get_detail(&LeaderboardName::global(), &member("p1"), &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(
            cache.score(&LeaderboardName::global(), &member("p1")).await.unwrap(),
            Some(50.0)
        );
    }

    #[tokio::test]
    async fn test_unknown_member_has_no_detail() {
        let engine = RankingEngine::new(
            Arc::new(InMemoryCache::new()),
            Arc::new(RelationalStore::new()),
            CacheConfig::default(),
        );
        let detail = engine
            .get_detail(&LeaderboardName::global(), &member("ghost"), &CancelSignal::never())
            .await
            .unwrap();
        assert!(detail.is_none());
        let blank = engine
            .detail_or_blank(&LeaderboardName::global(), &member("ghost"), &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(blank, PlayerDetail::default());
    }

    #[tokio::test]
    async fn test_store_outage_gives_blank_detail() {
        let cache = Arc::new(InMemoryCache::new());
        let source = Arc::new(FaultySource::new(Arc::new(RelationalStore::new())));
        source.set_unavailable(true);
        cache
            .set_score(&LeaderboardName::global(), &member("p1"), 5.0)
            .await
            .unwrap();
        let engine = RankingEngine::new(cache, source.clone(), CacheConfig::default());

        let err = engine
            .get_detail(&LeaderboardName::global(), &member("p1"), &CancelSignal::never())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), podium_core::ErrorKind::StoreUnavailable);

        let blank = engine
            .detail_or_blank(&LeaderboardName::global(), &member("p1"), &CancelSignal::never())
            .await
            .unwrap();
        assert!(blank.is_blank());
    }
}
