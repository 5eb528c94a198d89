//! Table-shaped source of record.

use async_trait::async_trait;
use chrono::Utc;
use podium_core::{
    LeaderboardEntry, LeaderboardName, PlayerId, PodiumResult, SortOrder, StoreError,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::trace;

use super::traits::{page_of, SourceOfRecord};

type RowKey = (LeaderboardName, PlayerId);

/// One row per `(leaderboard, player)` with created/updated bookkeeping.
/// Stored ranks are dropped on write.
#[derive(Debug, Default)]
pub struct RelationalStore {
    rows: RwLock<HashMap<RowKey, LeaderboardEntry>>,
}

impl RelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `entries`.
    pub fn with_entries(entries: impl IntoIterator<Item = LeaderboardEntry>) -> Self {
        let now = Utc::now();
        let rows = entries
            .into_iter()
            .map(|mut e| {
                e.rank = None;
                e.created_at.get_or_insert(now);
                e.updated_at.get_or_insert(now);
                ((e.leaderboard.clone(), e.player_id.clone()), e)
            })
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }
}

#[async_trait]
impl SourceOfRecord for RelationalStore {
    async fn fetch_one(
        &self,
        leaderboard: &LeaderboardName,
        player_id: &PlayerId,
    ) -> PodiumResult<Option<LeaderboardEntry>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&(leaderboard.clone(), player_id.clone())).cloned())
    }

    async fn fetch_page(
        &self,
        leaderboard: &LeaderboardName,
        order: SortOrder,
        offset: usize,
        page_size: usize,
    ) -> PodiumResult<Vec<LeaderboardEntry>> {
        let rows = self.rows.read().await;
        let matching = rows
            .values()
            .filter(|e| &e.leaderboard == leaderboard)
            .cloned()
            .collect();
        Ok(page_of(matching, order, offset, page_size))
    }

    async fn upsert(&self, mut entry: LeaderboardEntry) -> PodiumResult<()> {
        entry.validate().map_err(|e| StoreError::UpsertRejected {
            leaderboard: entry.leaderboard.to_string(),
            player_id: entry.player_id.to_string(),
            reason: e.to_string(),
        })?;

        let now = Utc::now();
        let mut rows = self.rows.write().await;
        let key = (entry.leaderboard.clone(), entry.player_id.clone());
        entry.rank = None;
        entry.created_at = rows
            .get(&key)
            .and_then(|existing| existing.created_at)
            .or(entry.created_at)
            .or(Some(now));
        entry.updated_at = Some(now);
        trace!(leaderboard = %entry.leaderboard, player_id = %entry.player_id, score = entry.score, "Upserted row");
        rows.insert(key, entry);
        Ok(())
    }

    async fn count(&self, leaderboard: &LeaderboardName) -> PodiumResult<u64> {
        let rows = self.rows.read().await;
        Ok(rows.keys().filter(|(lb, _)| lb == leaderboard).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podium_core::{ErrorKind, PlayerDetail};

    fn entry(id: &str, score: f64) -> LeaderboardEntry {
        LeaderboardEntry::new(LeaderboardName::global(), PlayerId::new(id).unwrap(), score)
    }

    #[tokio::test]
    async fn test_upsert_keeps_created_at_and_drops_rank() {
        let store = RelationalStore::new();
        let mut first = entry("p1", 1.0);
        first.rank = Some(7);
        store.upsert(first).await.unwrap();
        let created = store
            .fetch_one(&LeaderboardName::global(), &PlayerId::new("p1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.rank, None);

        store
            .upsert(entry("p1", 2.0).with_detail(PlayerDetail::new("A", "B", "C")))
            .await
            .unwrap();
        let updated = store
            .fetch_one(&LeaderboardName::global(), &PlayerId::new("p1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.score, 2.0);
        assert_eq!(updated.country, "C");
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(store.count(&LeaderboardName::global()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pages_are_ordered_and_scoped() {
        let other = LeaderboardName::new("weekly").unwrap();
        let store = RelationalStore::with_entries(vec![
            entry("a", 1.0),
            entry("b", 3.0),
            entry("c", 2.0),
            LeaderboardEntry::new(other.clone(), PlayerId::new("z").unwrap(), 100.0),
        ]);

        let desc = store
            .fetch_page(&LeaderboardName::global(), SortOrder::Descending, 0, 2)
            .await
            .unwrap();
        let ids: Vec<_> = desc.iter().map(|e| e.player_id.to_string()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        let tail = store
            .fetch_page(&LeaderboardName::global(), SortOrder::Descending, 2, 2)
            .await
            .unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].player_id.as_str(), "a");

        let asc = store
            .fetch_page(&LeaderboardName::global(), SortOrder::Ascending, 0, 10)
            .await
            .unwrap();
        assert_eq!(asc[0].player_id.as_str(), "a");
        assert_eq!(store.count(&other).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejects_non_finite_score() {
        let store = RelationalStore::new();
        let err = store.upsert(entry("p1", f64::NAN)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert!(!err.is_retryable());
    }
}
