//! Ranking engine
//!
//! Answers rank questions from the ranked set and detail store, falling
//! back to the source of record on a miss. Ranks are never read from the
//! source of record: a missing member is written into the ranked set first
//! and its rank is read back from there.

use futures_util::future::join_all;
use podium_core::{
    display_rank, CacheConfig, CancelSignal, GroupStanding, LeaderboardEntry, LeaderboardName,
    MemberKey, NeighborDirection, PlayerDetail, PlayerId, PlayerScoreResult,
    PlayerScoreWithNeighbors, PodiumError, PodiumResult, SortOrder, ValidationError,
};
use podium_storage::{CachePopulator, DetailStore, LeaderboardCache, RankedSet, SourceOfRecord};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// What a neighbor lookup is relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeighborTarget {
    Member(MemberKey),
    /// 1-based rank in the requested order.
    Rank(u64),
}

impl NeighborTarget {
    /// Parse a member key, a bare player id, or a 1-based rank.
    ///
    /// An all-digit input is always a rank. A player whose id is all digits
    /// is addressed by its member key (`entry:123`).
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if let Ok(rank) = raw.parse::<u64>() {
            return Ok(NeighborTarget::Rank(rank));
        }
        match MemberKey::parse(raw) {
            Ok(member) => Ok(NeighborTarget::Member(member)),
            Err(_) => Ok(NeighborTarget::Member(MemberKey::for_player(&PlayerId::new(raw)?))),
        }
    }
}

impl From<MemberKey> for NeighborTarget {
    fn from(member: MemberKey) -> Self {
        NeighborTarget::Member(member)
    }
}

/// Treat a failed cache read as a miss so the caller falls back to the
/// source of record.
pub(crate) fn degraded<T: Default>(result: PodiumResult<T>, operation: &str) -> PodiumResult<T> {
    match result {
        Err(PodiumError::Cache(e)) => {
            warn!(operation, error = %e, "Cache read failed, falling back to source of record");
            Ok(T::default())
        }
        other => other,
    }
}

/// Query surface over one cache and one source of record.
pub struct RankingEngine {
    cache: Arc<dyn LeaderboardCache>,
    source: Arc<dyn SourceOfRecord>,
    populator: CachePopulator,
    config: CacheConfig,
}

impl RankingEngine {
    pub fn new(
        cache: Arc<dyn LeaderboardCache>,
        source: Arc<dyn SourceOfRecord>,
        config: CacheConfig,
    ) -> Self {
        let populator = CachePopulator::new(cache.clone(), source.clone())
            .with_page_size(config.populate_page_size);
        Self {
            cache,
            source,
            populator,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<dyn LeaderboardCache> {
        &self.cache
    }

    pub fn source(&self) -> &Arc<dyn SourceOfRecord> {
        &self.source
    }

    pub fn populator(&self) -> &CachePopulator {
        &self.populator
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Overwrite one entry's score and detail in the cache. Returns `true`
    /// when the member is new to the ranked set.
    pub(crate) async fn write_entry(&self, entry: &LeaderboardEntry) -> PodiumResult<bool> {
        let member = entry.member_key();
        let added = self
            .cache
            .set_score(&entry.leaderboard, &member, entry.score)
            .await?;
        self.cache
            .set_fields(&entry.leaderboard, &member, entry.detail_fields())
            .await?;
        Ok(added)
    }

    /// Cached standing after a write, ranked in descending order.
    pub(crate) async fn standing(
        &self,
        leaderboard: &LeaderboardName,
        player_id: &PlayerId,
        score: f64,
        detail: PlayerDetail,
    ) -> PodiumResult<PlayerScoreResult> {
        let member = MemberKey::for_player(player_id);
        let position = self
            .cache
            .rank(leaderboard, &member, SortOrder::Descending)
            .await?
            .ok_or_else(|| PodiumError::cache_unavailable("rank", "member missing after write"))?;
        Ok(PlayerScoreResult::new(
            leaderboard.clone(),
            player_id.clone(),
            score,
            display_rank(position),
            detail,
        ))
    }

    /// Whether the player is known to the cache or the source of record.
    pub(crate) async fn exists(
        &self,
        leaderboard: &LeaderboardName,
        player_id: &PlayerId,
    ) -> PodiumResult<bool> {
        let member = MemberKey::for_player(player_id);
        if degraded(self.cache.score(leaderboard, &member).await, "score")?.is_some() {
            return Ok(true);
        }
        Ok(self.source.fetch_one(leaderboard, player_id).await?.is_some())
    }

    /// Current 0-based position and score of a player, loading the entry
    /// from the source of record on a miss.
    async fn resolve(
        &self,
        leaderboard: &LeaderboardName,
        player_id: &PlayerId,
        order: SortOrder,
        cancel: &CancelSignal,
    ) -> PodiumResult<(u64, f64)> {
        let member = MemberKey::for_player(player_id);
        let score = degraded(self.cache.score(leaderboard, &member).await, "score")?;
        let position = degraded(self.cache.rank(leaderboard, &member, order).await, "rank")?;
        if let (Some(score), Some(position)) = (score, position) {
            debug!(%member, position, "Rank cache hit");
            return Ok((position, score));
        }

        debug!(%member, "Rank cache miss, loading entry from source of record");
        cancel.check()?;
        let entry = self
            .source
            .fetch_one(leaderboard, player_id)
            .await?
            .ok_or_else(|| PodiumError::not_found(leaderboard, player_id))?;
        self.backfill(&entry).await?;
        let position = self
            .cache
            .rank(leaderboard, &member, order)
            .await?
            .ok_or_else(|| PodiumError::cache_unavailable("rank", "member missing after backfill"))?;
        let score = self
            .cache
            .score(leaderboard, &member)
            .await?
            .unwrap_or(entry.score);
        Ok((position, score))
    }

    /// Standing at a 0-based position, read with a 1-wide range.
    async fn result_at(
        &self,
        leaderboard: &LeaderboardName,
        position: Option<u64>,
        order: SortOrder,
        cancel: &CancelSignal,
    ) -> PodiumResult<Option<PlayerScoreResult>> {
        let Some(position) = position else {
            return Ok(None);
        };
        cancel.check()?;
        let Some((member, score)) = self
            .cache
            .range(leaderboard, position, position, order)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        let detail = self.detail_or_blank(leaderboard, &member, cancel).await?;
        Ok(Some(PlayerScoreResult::new(
            leaderboard.clone(),
            member.player_id(),
            score,
            display_rank(position),
            detail,
        )))
    }

    /// A player's score and rank with the members directly before and
    /// after. `NotFound` when neither store knows the player.
    #[instrument(skip_all, fields(leaderboard = %leaderboard, player_id = %player_id))]
    pub async fn get_global_score_and_rank(
        &self,
        leaderboard: &LeaderboardName,
        player_id: &PlayerId,
        order: SortOrder,
        cancel: &CancelSignal,
    ) -> PodiumResult<PlayerScoreWithNeighbors> {
        cancel.check()?;
        let (position, score) = self.resolve(leaderboard, player_id, order, cancel).await?;
        let member = MemberKey::for_player(player_id);
        let detail = self.detail_or_blank(leaderboard, &member, cancel).await?;

        let current = PlayerScoreResult::new(
            leaderboard.clone(),
            player_id.clone(),
            score,
            display_rank(position),
            detail,
        );
        let previous = self
            .result_at(leaderboard, position.checked_sub(1), order, cancel)
            .await?;
        let next = self
            .result_at(leaderboard, Some(position + 1), order, cancel)
            .await?;

        Ok(PlayerScoreWithNeighbors {
            previous,
            current,
            next,
        })
    }

    /// The member one rank before or after `target`. `None` at the
    /// boundary; `NotFound` when a member target is unknown.
    #[instrument(skip_all, fields(leaderboard = %leaderboard))]
    pub async fn get_neighbor(
        &self,
        leaderboard: &LeaderboardName,
        target: &NeighborTarget,
        order: SortOrder,
        direction: NeighborDirection,
        cancel: &CancelSignal,
    ) -> PodiumResult<Option<PlayerScoreResult>> {
        cancel.check()?;
        let position = match target {
            NeighborTarget::Member(member) => {
                self.resolve(leaderboard, &member.player_id(), order, cancel)
                    .await?
                    .0
            }
            NeighborTarget::Rank(0) => {
                return Err(ValidationError::InvalidValue {
                    field: "rank".to_string(),
                    reason: "ranks start at 1".to_string(),
                }
                .into())
            }
            NeighborTarget::Rank(rank) => {
                let count = self.cache.count(leaderboard).await?;
                if *rank > count {
                    return Err(ValidationError::InvalidValue {
                        field: "rank".to_string(),
                        reason: format!("rank {rank} is past the last rank {count}"),
                    }
                    .into());
                }
                rank - 1
            }
        };
        let adjacent = match direction {
            NeighborDirection::Previous => position.checked_sub(1),
            NeighborDirection::Next => Some(position + 1),
        };
        self.result_at(leaderboard, adjacent, order, cancel).await
    }

    /// Standings of a set of players ordered by score inside the group.
    /// Unknown players are dropped; each standing keeps its global rank.
    #[instrument(skip_all, fields(leaderboard = %leaderboard, requested = player_ids.len()))]
    pub async fn get_group(
        &self,
        leaderboard: &LeaderboardName,
        player_ids: &[PlayerId],
        order: SortOrder,
        cancel: &CancelSignal,
    ) -> PodiumResult<Vec<GroupStanding>> {
        cancel.check()?;
        let mut seen = HashSet::new();
        let unique: Vec<&PlayerId> = player_ids.iter().filter(|id| seen.insert(*id)).collect();

        let lookups = unique
            .iter()
            .map(|id| self.get_global_score_and_rank(leaderboard, id, order, cancel));
        let results = join_all(lookups).await;

        let mut standings = Vec::with_capacity(unique.len());
        for (id, result) in unique.iter().zip(results) {
            match result {
                Ok(standing) => standings.push(standing),
                Err(PodiumError::NotFound { .. }) => {
                    debug!(player_id = %id, "Dropping unknown player from group");
                }
                Err(e) => return Err(e),
            }
        }

        standings.sort_by(|a, b| {
            let by_score = a.current.score.total_cmp(&b.current.score);
            let by_score = if order.is_desc() {
                by_score.reverse()
            } else {
                by_score
            };
            by_score.then(a.current.rank.cmp(&b.current.rank))
        });

        Ok(standings
            .into_iter()
            .enumerate()
            .map(|(i, standing)| GroupStanding {
                group_order: i + 1,
                standing,
            })
            .collect())
    }
}

impl std::fmt::Debug for RankingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankingEngine")
            .field("populator", &self.populator)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
