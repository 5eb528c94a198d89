//! Fast-path store contracts.
//!
//! The ranked set holds one score per member and answers rank and range
//! queries; the detail store holds the display fields the ranked set cannot.
//! Both are keyed by leaderboard and [`MemberKey`], so a rank lookup joins
//! back to its detail record without a second index.

use async_trait::async_trait;
use podium_core::{LeaderboardName, MemberKey, PodiumResult, SortOrder};
use std::collections::HashMap;

use super::transaction::TransactionalCache;

/// Ordered member to score collection.
///
/// Ranks and ranges are 0-based positions in the requested order. Members
/// with equal scores are ordered by member key; descending order is the
/// exact reverse of ascending order.
#[async_trait]
pub trait RankedSet: Send + Sync {
    /// Insert or overwrite a member's score. Returns `true` when the member
    /// was not present before.
    async fn set_score(
        &self,
        set: &LeaderboardName,
        member: &MemberKey,
        score: f64,
    ) -> PodiumResult<bool>;

    async fn score(&self, set: &LeaderboardName, member: &MemberKey) -> PodiumResult<Option<f64>>;

    /// 0-based position of `member` in `order`.
    async fn rank(
        &self,
        set: &LeaderboardName,
        member: &MemberKey,
        order: SortOrder,
    ) -> PodiumResult<Option<u64>>;

    /// Members at positions `start..=end` in `order`. Positions past the end
    /// of the set are ignored.
    async fn range(
        &self,
        set: &LeaderboardName,
        start: u64,
        end: u64,
        order: SortOrder,
    ) -> PodiumResult<Vec<(MemberKey, f64)>>;

    async fn count(&self, set: &LeaderboardName) -> PodiumResult<u64>;

    /// Returns `true` when the member existed.
    async fn remove_member(&self, set: &LeaderboardName, member: &MemberKey) -> PodiumResult<bool>;
}

/// Per-member field map.
#[async_trait]
pub trait DetailStore: Send + Sync {
    /// Merge `fields` into the member's map, overwriting fields of the same
    /// name.
    async fn set_fields(
        &self,
        set: &LeaderboardName,
        member: &MemberKey,
        fields: HashMap<String, String>,
    ) -> PodiumResult<()>;

    /// `None` when nothing is stored for the member.
    async fn get_fields(
        &self,
        set: &LeaderboardName,
        member: &MemberKey,
    ) -> PodiumResult<Option<HashMap<String, String>>>;

    async fn remove_fields(&self, set: &LeaderboardName, member: &MemberKey) -> PodiumResult<bool>;
}

/// Everything the engine needs from the fast path.
pub trait LeaderboardCache: RankedSet + DetailStore + TransactionalCache {}

impl<T> LeaderboardCache for T where T: RankedSet + DetailStore + TransactionalCache {}
