//! Consistency strategies
//!
//! Every strategy reads through the [`RankingEngine`]; they differ only in
//! when the source of record sees a write:
//!
//! | Strategy | Source of record updated |
//! |---|---|
//! | [`CacheAside`] | synchronously, after the cache |
//! | [`WriteThrough`] | by the subscriber to the transaction's published intention |
//! | [`WriteBehind`] | by whichever relays received the intention |
//!
//! [`RankingEngine`]: crate::RankingEngine

pub mod cache_aside;
pub mod handoff;
pub mod write_behind;
pub mod write_through;

pub use cache_aside::CacheAside;
pub use handoff::{HandoffTarget, IntentionHandoff};
pub use write_behind::WriteBehind;
pub use write_through::WriteThrough;

use podium_core::{
    CancelSignal, LeaderboardEntry, LeaderboardName, PlayerId, PlayerScoreResult, PodiumResult,
    StrategyKind,
};

/// The write path in effect.
#[derive(Debug, Clone)]
pub enum WriteStrategy {
    CacheAside(CacheAside),
    WriteThrough(WriteThrough),
    WriteBehind(WriteBehind),
}

impl WriteStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            WriteStrategy::CacheAside(_) => StrategyKind::CacheAside,
            WriteStrategy::WriteThrough(_) => StrategyKind::WriteThrough,
            WriteStrategy::WriteBehind(_) => StrategyKind::WriteBehind,
        }
    }

    /// Insert or replace an entry. Returns the entry's standing in
    /// descending order right after the write.
    pub async fn add_or_update(
        &self,
        entry: LeaderboardEntry,
        cancel: &CancelSignal,
    ) -> PodiumResult<PlayerScoreResult> {
        match self {
            WriteStrategy::CacheAside(s) => s.add_or_update(entry, cancel).await,
            WriteStrategy::WriteThrough(s) => s.add_or_update(entry, cancel).await,
            WriteStrategy::WriteBehind(s) => s.add_or_update(entry, cancel).await,
        }
    }

    /// Change an existing player's score. `NotFound` for unknown players.
    pub async fn update_score(
        &self,
        leaderboard: &LeaderboardName,
        player_id: &PlayerId,
        score: f64,
        cancel: &CancelSignal,
    ) -> PodiumResult<PlayerScoreResult> {
        match self {
            WriteStrategy::CacheAside(s) => s.update_score(leaderboard, player_id, score, cancel).await,
            WriteStrategy::WriteThrough(s) => {
                s.update_score(leaderboard, player_id, score, cancel).await
            }
            WriteStrategy::WriteBehind(s) => {
                s.update_score(leaderboard, player_id, score, cancel).await
            }
        }
    }
}

impl From<CacheAside> for WriteStrategy {
    fn from(s: CacheAside) -> Self {
        WriteStrategy::CacheAside(s)
    }
}

impl From<WriteThrough> for WriteStrategy {
    fn from(s: WriteThrough) -> Self {
        WriteStrategy::WriteThrough(s)
    }
}

impl From<WriteBehind> for WriteStrategy {
    fn from(s: WriteBehind) -> Self {
        WriteStrategy::WriteBehind(s)
    }
}
