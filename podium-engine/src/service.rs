//! Leaderboard service facade
//!
//! The surface an outer transport calls. Raw names and ids are validated
//! here, before any store is touched; a missing or blank leaderboard name
//! means the configured default leaderboard.

use podium_core::{
    CancelSignal, GroupStanding, LeaderboardEntry, LeaderboardName, MemberKey, NeighborDirection,
    PlayerDetail, PlayerId, PlayerScoreResult, PlayerScoreWithNeighbors, PodiumResult, SortOrder,
    StrategyKind, validate_score,
};
use tracing::instrument;

use crate::engine::NeighborTarget;
use crate::read_through::ReadThrough;
use crate::strategy::WriteStrategy;

#[derive(Debug, Clone)]
pub struct LeaderboardService {
    reads: ReadThrough,
    writes: WriteStrategy,
    default_leaderboard: LeaderboardName,
}

impl LeaderboardService {
    pub fn new(reads: ReadThrough, writes: WriteStrategy) -> Self {
        Self {
            reads,
            writes,
            default_leaderboard: LeaderboardName::global(),
        }
    }

    pub fn with_default_leaderboard(mut self, leaderboard: LeaderboardName) -> Self {
        self.default_leaderboard = leaderboard;
        self
    }

    pub fn default_leaderboard(&self) -> &LeaderboardName {
        &self.default_leaderboard
    }

    pub fn strategy(&self) -> StrategyKind {
        self.writes.kind()
    }

    pub fn reads(&self) -> &ReadThrough {
        &self.reads
    }

    pub fn writes(&self) -> &WriteStrategy {
        &self.writes
    }

    fn leaderboard(&self, raw: Option<&str>) -> PodiumResult<LeaderboardName> {
        match raw.map(str::trim) {
            None | Some("") => Ok(self.default_leaderboard.clone()),
            Some(name) => Ok(LeaderboardName::new(name)?),
        }
    }

    #[instrument(skip_all, fields(start = start, end = end, desc = desc))]
    pub async fn get_range(
        &self,
        leaderboard: Option<&str>,
        start: u64,
        end: u64,
        desc: bool,
        cancel: &CancelSignal,
    ) -> PodiumResult<Vec<PlayerScoreResult>> {
        let leaderboard = self.leaderboard(leaderboard)?;
        self.reads.engine().validate_range(start, end)?;
        self.reads
            .get_range(&leaderboard, start, end, SortOrder::from_desc(desc), cancel)
            .await
    }

    #[instrument(skip_all, fields(player_id = player_id, desc = desc))]
    pub async fn get_global_score_and_rank(
        &self,
        leaderboard: Option<&str>,
        player_id: &str,
        desc: bool,
        cancel: &CancelSignal,
    ) -> PodiumResult<PlayerScoreWithNeighbors> {
        let leaderboard = self.leaderboard(leaderboard)?;
        let player_id = PlayerId::new(player_id)?;
        self.reads
            .get_global_score_and_rank(&leaderboard, &player_id, SortOrder::from_desc(desc), cancel)
            .await
    }

    /// `target` is a member key, a bare player id or a 1-based rank. Digits
    /// alone always mean a rank; address an all-digit player id as `entry:<id>`.
    #[instrument(skip_all, fields(target = target, desc = desc, direction = ?direction))]
    pub async fn get_neighbor(
        &self,
        leaderboard: Option<&str>,
        target: &str,
        desc: bool,
        direction: NeighborDirection,
        cancel: &CancelSignal,
    ) -> PodiumResult<Option<PlayerScoreResult>> {
        let leaderboard = self.leaderboard(leaderboard)?;
        let target = NeighborTarget::parse(target)?;
        self.reads
            .get_neighbor(
                &leaderboard,
                &target,
                SortOrder::from_desc(desc),
                direction,
                cancel,
            )
            .await
    }

    #[instrument(skip_all, fields(requested = player_ids.len(), desc = desc))]
    pub async fn get_group<S: AsRef<str>>(
        &self,
        leaderboard: Option<&str>,
        player_ids: &[S],
        desc: bool,
        cancel: &CancelSignal,
    ) -> PodiumResult<Vec<GroupStanding>> {
        let leaderboard = self.leaderboard(leaderboard)?;
        let player_ids = player_ids
            .iter()
            .map(|id| PlayerId::new(id.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.reads
            .get_group(&leaderboard, &player_ids, SortOrder::from_desc(desc), cancel)
            .await
    }

    pub async fn get_detail(
        &self,
        leaderboard: Option<&str>,
        player_id: &str,
        cancel: &CancelSignal,
    ) -> PodiumResult<Option<PlayerDetail>> {
        let leaderboard = self.leaderboard(leaderboard)?;
        let member = MemberKey::for_player(&PlayerId::new(player_id)?);
        self.reads.get_detail(&leaderboard, &member, cancel).await
    }

    #[instrument(skip_all, fields(player_id = player_id, strategy = %self.writes.kind()))]
    pub async fn add_or_update(
        &self,
        leaderboard: Option<&str>,
        player_id: &str,
        score: f64,
        detail: PlayerDetail,
        cancel: &CancelSignal,
    ) -> PodiumResult<PlayerScoreResult> {
        let leaderboard = self.leaderboard(leaderboard)?;
        let player_id = PlayerId::new(player_id)?;
        let entry = LeaderboardEntry::new(leaderboard, player_id, score).with_detail(detail);
        entry.validate()?;
        self.writes.add_or_update(entry, cancel).await
    }

    #[instrument(skip_all, fields(player_id = player_id, strategy = %self.writes.kind()))]
    pub async fn update_score(
        &self,
        leaderboard: Option<&str>,
        player_id: &str,
        score: f64,
        cancel: &CancelSignal,
    ) -> PodiumResult<PlayerScoreResult> {
        let leaderboard = self.leaderboard(leaderboard)?;
        let player_id = PlayerId::new(player_id)?;
        validate_score(score)?;
        self.writes
            .update_score(&leaderboard, &player_id, score, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RankingEngine;
    use crate::strategy::CacheAside;
    use podium_core::{CacheConfig, ErrorKind};
    use podium_storage::{InMemoryCache, RelationalStore};
    use std::sync::Arc;

    fn service() -> LeaderboardService {
        let engine = Arc::new(RankingEngine::new(
            Arc::new(InMemoryCache::new()),
            Arc::new(RelationalStore::new()),
            CacheConfig::default(),
        ));
        LeaderboardService::new(
            ReadThrough::new(engine.clone()),
            CacheAside::new(engine).into(),
        )
    }

    #[tokio::test]
    async fn test_blank_leaderboard_means_default() {
        let service = service();
        let cancel = CancelSignal::never();
        service
            .add_or_update(None, "p1", 10.0, PlayerDetail::default(), &cancel)
            .await
            .unwrap();
        let standing = service
            .get_global_score_and_rank(Some("  "), "p1", true, &cancel)
            .await
            .unwrap();
        assert_eq!(standing.current.leaderboard, LeaderboardName::global());
        assert_eq!(standing.current.rank, 1);
    }

    #[tokio::test]
    async fn test_malformed_input_rejected() {
        let service = service();
        let cancel = CancelSignal::never();

        let err = service
            .get_global_score_and_rank(Some("bad name!"), "p1", true, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = service
            .get_global_score_and_rank(None, "", true, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = service.get_range(None, 5, 2, true, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = service
            .add_or_update(None, "p1", f64::NAN, PlayerDetail::default(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_neighbor_by_rank_string() {
        let service = service();
        let cancel = CancelSignal::never();
        for (id, score) in [("a", 3.0), ("b", 2.0), ("c", 1.0)] {
            service
                .add_or_update(None, id, score, PlayerDetail::default(), &cancel)
                .await
                .unwrap();
        }
        let next = service
            .get_neighbor(None, "1", true, NeighborDirection::Next, &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.player_id.as_str(), "b");
        assert_eq!(next.rank, 2);

        let previous = service
            .get_neighbor(None, "entry:c", true, NeighborDirection::Previous, &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(previous.player_id.as_str(), "b");

        let err = service
            .get_neighbor(None, "0", true, NeighborDirection::Next, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = service
            .get_neighbor(None, "4", true, NeighborDirection::Next, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_digit_player_id_needs_member_key() {
        let service = service();
        let cancel = CancelSignal::never();
        for (id, score) in [("7", 3.0), ("123", 2.0)] {
            service
                .add_or_update(None, id, score, PlayerDetail::default(), &cancel)
                .await
                .unwrap();
        }
        let err = service
            .get_neighbor(None, "123", true, NeighborDirection::Next, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let previous = service
            .get_neighbor(None, "entry:123", true, NeighborDirection::Previous, &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(previous.player_id.as_str(), "7");
    }

    #[tokio::test]
    async fn test_update_unknown_player_is_not_found() {
        let service = service();
        let err = service
            .update_score(None, "ghost", 1.0, &CancelSignal::never())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
