//! Read-through query surface.
//!
//! Reads never care which write strategy filled the cache: every query goes
//! to the ranked set first and falls back to the source of record, loading
//! what it finds on the way back.

use podium_core::{
    CancelSignal, GroupStanding, LeaderboardName, MemberKey, NeighborDirection, PlayerDetail,
    PlayerId, PlayerScoreResult, PlayerScoreWithNeighbors, PodiumResult, SortOrder,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::engine::{NeighborTarget, RankingEngine};

/// The read path shared by every write strategy.
#[derive(Debug, Clone)]
pub struct ReadThrough {
    engine: Arc<RankingEngine>,
}

impl ReadThrough {
    pub fn new(engine: Arc<RankingEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<RankingEngine> {
        &self.engine
    }

    pub async fn get_range(
        &self,
        leaderboard: &LeaderboardName,
        start: u64,
        end: u64,
        order: SortOrder,
        cancel: &CancelSignal,
    ) -> PodiumResult<Vec<PlayerScoreResult>> {
        let started = Instant::now();
        let rows = self
            .engine
            .get_range(leaderboard, start, end, order, cancel)
            .await?;
        debug!(
            leaderboard = %leaderboard,
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Range served"
        );
        Ok(rows)
    }

    pub async fn get_global_score_and_rank(
        &self,
        leaderboard: &LeaderboardName,
        player_id: &PlayerId,
        order: SortOrder,
        cancel: &CancelSignal,
    ) -> PodiumResult<PlayerScoreWithNeighbors> {
        let started = Instant::now();
        let standing = self
            .engine
            .get_global_score_and_rank(leaderboard, player_id, order, cancel)
            .await?;
        debug!(
            leaderboard = %leaderboard,
            player_id = %player_id,
            rank = standing.current.rank,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Standing served"
        );
        Ok(standing)
    }

    pub async fn get_neighbor(
        &self,
        leaderboard: &LeaderboardName,
        target: &NeighborTarget,
        order: SortOrder,
        direction: NeighborDirection,
        cancel: &CancelSignal,
    ) -> PodiumResult<Option<PlayerScoreResult>> {
        self.engine
            .get_neighbor(leaderboard, target, order, direction, cancel)
            .await
    }

    pub async fn get_group(
        &self,
        leaderboard: &LeaderboardName,
        player_ids: &[PlayerId],
        order: SortOrder,
        cancel: &CancelSignal,
    ) -> PodiumResult<Vec<GroupStanding>> {
        let started = Instant::now();
        let group = self
            .engine
            .get_group(leaderboard, player_ids, order, cancel)
            .await?;
        debug!(
            leaderboard = %leaderboard,
            requested = player_ids.len(),
            found = group.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Group served"
        );
        Ok(group)
    }

    pub async fn get_detail(
        &self,
        leaderboard: &LeaderboardName,
        member: &MemberKey,
        cancel: &CancelSignal,
    ) -> PodiumResult<Option<PlayerDetail>> {
        self.engine.get_detail(leaderboard, member, cancel).await
    }
}
