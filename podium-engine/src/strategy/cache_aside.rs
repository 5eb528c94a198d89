//! Cache-aside writes: cache first, then the source of record, synchronously.
//!
//! When the source of record rejects the write, the cache is restored to
//! what it held before so the two never disagree after a failed request.

use podium_core::{
    validate_score, CancelSignal, LeaderboardEntry, LeaderboardName, MemberKey, PlayerId,
    PlayerScoreResult, PodiumError, PodiumResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::engine::RankingEngine;

/// What the cache held for one member before a write.
struct Snapshot {
    score: Option<f64>,
    fields: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone)]
pub struct CacheAside {
    engine: Arc<RankingEngine>,
}

impl CacheAside {
    pub fn new(engine: Arc<RankingEngine>) -> Self {
        Self { engine }
    }

    #[instrument(skip_all, fields(leaderboard = %entry.leaderboard, player_id = %entry.player_id))]
    pub async fn add_or_update(
        &self,
        entry: LeaderboardEntry,
        cancel: &CancelSignal,
    ) -> PodiumResult<PlayerScoreResult> {
        entry.validate()?;
        cancel.check()?;
        self.write(entry).await
    }

    /// Change the score of a player the source of record already holds.
    #[instrument(skip_all, fields(leaderboard = %leaderboard, player_id = %player_id))]
    pub async fn update_score(
        &self,
        leaderboard: &LeaderboardName,
        player_id: &PlayerId,
        score: f64,
        cancel: &CancelSignal,
    ) -> PodiumResult<PlayerScoreResult> {
        let score = validate_score(score)?;
        cancel.check()?;
        let mut entry = self
            .engine
            .source()
            .fetch_one(leaderboard, player_id)
            .await?
            .ok_or_else(|| PodiumError::not_found(leaderboard, player_id))?;
        entry.score = score;
        entry.rank = None;
        self.write(entry).await
    }

    async fn write(&self, entry: LeaderboardEntry) -> PodiumResult<PlayerScoreResult> {
        let cache = self.engine.cache();
        let member = entry.member_key();
        let snapshot = Snapshot {
            score: cache.score(&entry.leaderboard, &member).await?,
            fields: cache.get_fields(&entry.leaderboard, &member).await?,
        };

        if let Err(e) = self.engine.write_entry(&entry).await {
            warn!(error = %e, "Cache write failed, restoring previous cache state");
            self.restore(&entry.leaderboard, &member, snapshot).await;
            return Err(e);
        }

        if let Err(e) = self.engine.source().upsert(entry.clone()).await {
            warn!(error = %e, "Source of record write failed, restoring previous cache state");
            self.restore(&entry.leaderboard, &member, snapshot).await;
            return Err(e);
        }
        debug!(score = entry.score, "Cache-aside write committed");

        let detail = entry.detail();
        self.engine
            .standing(&entry.leaderboard, &entry.player_id, entry.score, detail)
            .await
    }

    /// Best effort: a failure here is logged, the original error is what the
    /// caller sees.
    async fn restore(&self, leaderboard: &LeaderboardName, member: &MemberKey, snapshot: Snapshot) {
        let cache = self.engine.cache();
        let score = match snapshot.score {
            Some(score) => cache.set_score(leaderboard, member, score).await.map(|_| ()),
            None => cache.remove_member(leaderboard, member).await.map(|_| ()),
        };
        let fields = async {
            cache.remove_fields(leaderboard, member).await?;
            if let Some(fields) = snapshot.fields {
                cache.set_fields(leaderboard, member, fields).await?;
            }
            Ok::<_, PodiumError>(())
        }
        .await;
        if let Err(e) = score.and(fields) {
            warn!(%member, error = %e, "Could not restore cache after failed write");
        }
    }
}
