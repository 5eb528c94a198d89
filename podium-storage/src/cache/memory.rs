//! In-process ranked set and detail store.
//!
//! Each leaderboard is a score map plus a `BTreeSet` ordered by
//! `(score, member)`. Transactions hold the write lock for their whole
//! duration and keep an undo log so a failed step leaves no trace.
//!
//! The `BTreeSet` keeps no subtree counts, so rank lookups and range reads
//! walk the set: O(n) in the leaderboard size for a rank, O(start + width)
//! for a range. Fine for tests and small boards; a deployment with large
//! leaderboards belongs on a cache backend with a skip list or
//! order-statistic tree behind the same traits.

use async_trait::async_trait;
use podium_core::{
    validate_score, CacheError, LeaderboardName, MemberKey, PodiumError, PodiumResult, SortOrder,
};
use podium_events::IntentionChannel;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::traits::{DetailStore, RankedSet};
use super::transaction::{CacheOp, CacheTransaction, OpOutcome, TransactionReceipt, TransactionalCache};

/// Totally ordered score. Only finite values ever get in.
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<MemberKey, f64>,
    order: BTreeSet<(Score, MemberKey)>,
}

impl SortedSet {
    /// Returns the previous score.
    fn insert(&mut self, member: MemberKey, score: f64) -> Option<f64> {
        let previous = self.scores.insert(member.clone(), score);
        if let Some(p) = previous {
            self.order.remove(&(Score(p), member.clone()));
        }
        self.order.insert((Score(score), member));
        previous
    }

    fn remove(&mut self, member: &MemberKey) -> Option<f64> {
        let previous = self.scores.remove(member)?;
        self.order.remove(&(Score(previous), member.clone()));
        Some(previous)
    }

    fn len(&self) -> u64 {
        self.order.len() as u64
    }

    /// Linear in the number of members scored below `member`.
    fn position(&self, member: &MemberKey, order: SortOrder) -> Option<u64> {
        let score = *self.scores.get(member)?;
        let ascending = self.order.range(..(Score(score), member.clone())).count() as u64;
        Some(match order {
            SortOrder::Ascending => ascending,
            SortOrder::Descending => self.len() - 1 - ascending,
        })
    }

    /// Skips `start` members before collecting, so deep pages cost more.
    fn range(&self, start: u64, end: u64, order: SortOrder) -> Vec<(MemberKey, f64)> {
        let len = self.len();
        if start > end || start >= len {
            return Vec::new();
        }
        let take = (end.min(len - 1) - start + 1) as usize;
        let skip = start as usize;
        let pick = |(score, member): &(Score, MemberKey)| (member.clone(), score.0);
        match order {
            SortOrder::Ascending => self.order.iter().skip(skip).take(take).map(pick).collect(),
            SortOrder::Descending => self.order.iter().rev().skip(skip).take(take).map(pick).collect(),
        }
    }
}

type DetailKey = (LeaderboardName, MemberKey);

#[derive(Debug, Default)]
struct CacheState {
    sets: HashMap<LeaderboardName, SortedSet>,
    details: HashMap<DetailKey, HashMap<String, String>>,
}

/// Inverse of one applied transaction step.
enum Undo {
    Score {
        set: LeaderboardName,
        member: MemberKey,
        previous: Option<f64>,
    },
    Fields {
        key: DetailKey,
        previous: Option<HashMap<String, String>>,
    },
}

impl CacheState {
    fn set_mut(&mut self, set: &LeaderboardName) -> &mut SortedSet {
        self.sets.entry(set.clone()).or_default()
    }

    fn merge_fields(
        &mut self,
        key: DetailKey,
        fields: HashMap<String, String>,
    ) -> Option<HashMap<String, String>> {
        let slot = self.details.entry(key).or_default();
        let previous = (!slot.is_empty()).then(|| slot.clone());
        slot.extend(fields);
        previous
    }

    fn rollback(&mut self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            match step {
                Undo::Score {
                    set,
                    member,
                    previous: Some(score),
                } => {
                    self.set_mut(&set).insert(member, score);
                }
                Undo::Score {
                    set,
                    member,
                    previous: None,
                } => {
                    self.set_mut(&set).remove(&member);
                }
                Undo::Fields {
                    key,
                    previous: Some(fields),
                } => {
                    self.details.insert(key, fields);
                }
                Undo::Fields { key, previous: None } => {
                    self.details.remove(&key);
                }
            }
        }
    }
}

fn aborted(step: usize, reason: impl ToString) -> PodiumError {
    CacheError::TransactionAborted {
        step,
        reason: reason.to_string(),
    }
    .into()
}

/// In-process [`RankedSet`] + [`DetailStore`] + [`TransactionalCache`].
///
/// `Publish` steps need an attached [`IntentionChannel`]; without one they
/// abort the transaction.
#[derive(Default)]
pub struct InMemoryCache {
    state: RwLock<CacheState>,
    channel: Option<Arc<dyn IntentionChannel>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose transactions publish through `channel`.
    pub fn with_channel(channel: Arc<dyn IntentionChannel>) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            channel: Some(channel),
        }
    }

    /// Drop every leaderboard and detail record.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.sets.clear();
        state.details.clear();
        debug!("Cache cleared");
    }

    /// Leaderboards holding at least one member.
    pub async fn leaderboards(&self) -> Vec<LeaderboardName> {
        let state = self.state.read().await;
        let mut names: Vec<_> = state
            .sets
            .iter()
            .filter(|(_, s)| s.len() > 0)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("has_channel", &self.channel.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RankedSet for InMemoryCache {
    async fn set_score(
        &self,
        set: &LeaderboardName,
        member: &MemberKey,
        score: f64,
    ) -> PodiumResult<bool> {
        let score = validate_score(score)?;
        let mut state = self.state.write().await;
        Ok(state.set_mut(set).insert(member.clone(), score).is_none())
    }

    async fn score(&self, set: &LeaderboardName, member: &MemberKey) -> PodiumResult<Option<f64>> {
        let state = self.state.read().await;
        Ok(state
            .sets
            .get(set)
            .and_then(|s| s.scores.get(member).copied()))
    }

    async fn rank(
        &self,
        set: &LeaderboardName,
        member: &MemberKey,
        order: SortOrder,
    ) -> PodiumResult<Option<u64>> {
        let state = self.state.read().await;
        Ok(state.sets.get(set).and_then(|s| s.position(member, order)))
    }

    async fn range(
        &self,
        set: &LeaderboardName,
        start: u64,
        end: u64,
        order: SortOrder,
    ) -> PodiumResult<Vec<(MemberKey, f64)>> {
        let state = self.state.read().await;
        Ok(state
            .sets
            .get(set)
            .map(|s| s.range(start, end, order))
            .unwrap_or_default())
    }

    async fn count(&self, set: &LeaderboardName) -> PodiumResult<u64> {
        let state = self.state.read().await;
        Ok(state.sets.get(set).map(SortedSet::len).unwrap_or(0))
    }

    async fn remove_member(&self, set: &LeaderboardName, member: &MemberKey) -> PodiumResult<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .sets
            .get_mut(set)
            .and_then(|s| s.remove(member))
            .is_some())
    }
}

#[async_trait]
impl DetailStore for InMemoryCache {
    async fn set_fields(
        &self,
        set: &LeaderboardName,
        member: &MemberKey,
        fields: HashMap<String, String>,
    ) -> PodiumResult<()> {
        let mut state = self.state.write().await;
        state.merge_fields((set.clone(), member.clone()), fields);
        Ok(())
    }

    async fn get_fields(
        &self,
        set: &LeaderboardName,
        member: &MemberKey,
    ) -> PodiumResult<Option<HashMap<String, String>>> {
        let state = self.state.read().await;
        Ok(state.details.get(&(set.clone(), member.clone())).cloned())
    }

    async fn remove_fields(&self, set: &LeaderboardName, member: &MemberKey) -> PodiumResult<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .details
            .remove(&(set.clone(), member.clone()))
            .is_some())
    }
}

#[async_trait]
impl TransactionalCache for InMemoryCache {
    async fn execute(&self, tx: CacheTransaction) -> PodiumResult<TransactionReceipt> {
        // A delivered publish cannot be rolled back, so a second one could
        // leave the first out in the world after an abort.
        if let Some(step) = tx.second_publish() {
            return Err(aborted(step, "at most one publish per transaction"));
        }

        let mut state = self.state.write().await;
        let mut undo = Vec::new();
        let mut outcomes = Vec::with_capacity(tx.len());
        let mut publishes = Vec::new();

        for (step, op) in tx.into_ops().into_iter().enumerate() {
            match op {
                CacheOp::SetScore { set, member, score } => {
                    if let Err(e) = validate_score(score) {
                        state.rollback(undo);
                        return Err(aborted(step, e));
                    }
                    let previous = state.set_mut(&set).insert(member.clone(), score);
                    undo.push(Undo::Score {
                        set,
                        member,
                        previous,
                    });
                    outcomes.push(OpOutcome::ScoreSet {
                        added: previous.is_none(),
                    });
                }
                CacheOp::Rank { set, member, order } => {
                    let rank = state.sets.get(&set).and_then(|s| s.position(&member, order));
                    outcomes.push(OpOutcome::Rank(rank));
                }
                CacheOp::SetFields { set, member, fields } => {
                    let key = (set, member);
                    let previous = state.merge_fields(key.clone(), fields);
                    undo.push(Undo::Fields { key, previous });
                    outcomes.push(OpOutcome::FieldsSet);
                }
                CacheOp::Publish { topic, payload } => {
                    outcomes.push(OpOutcome::Published { receivers: 0 });
                    publishes.push((step, topic, payload));
                }
            }
        }

        for (step, topic, payload) in publishes {
            let Some(channel) = &self.channel else {
                state.rollback(undo);
                return Err(aborted(step, "no intention channel attached"));
            };
            match channel.publish_raw(&topic, payload).await {
                Ok(receivers) => outcomes[step] = OpOutcome::Published { receivers },
                Err(e) => {
                    warn!(step, topic = %topic, error = %e, "Publish failed, rolling back cache transaction");
                    state.rollback(undo);
                    return Err(aborted(step, e));
                }
            }
        }

        Ok(TransactionReceipt { outcomes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podium_core::{ErrorKind, PlayerId};
    use podium_events::{BroadcastChannel, ChannelEvent};

    fn lb() -> LeaderboardName {
        LeaderboardName::global()
    }

    fn key(id: &str) -> MemberKey {
        MemberKey::for_player(&PlayerId::new(id).unwrap())
    }

    async fn seeded() -> InMemoryCache {
        let cache = InMemoryCache::new();
        for (id, score) in [("a", 10.0), ("b", 30.0), ("c", 20.0)] {
            cache.set_score(&lb(), &key(id), score).await.unwrap();
        }
        cache
    }

    #[tokio::test]
    async fn test_rank_in_both_orders() {
        let cache = seeded().await;
        assert_eq!(cache.rank(&lb(), &key("b"), SortOrder::Descending).await.unwrap(), Some(0));
        assert_eq!(cache.rank(&lb(), &key("b"), SortOrder::Ascending).await.unwrap(), Some(2));
        assert_eq!(cache.rank(&lb(), &key("a"), SortOrder::Ascending).await.unwrap(), Some(0));
        assert_eq!(cache.rank(&lb(), &key("zz"), SortOrder::Ascending).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reinsert_overwrites() {
        let cache = seeded().await;
        assert!(!cache.set_score(&lb(), &key("a"), 40.0).await.unwrap());
        assert_eq!(cache.count(&lb()).await.unwrap(), 3);
        assert_eq!(cache.score(&lb(), &key("a")).await.unwrap(), Some(40.0));
        assert_eq!(cache.rank(&lb(), &key("a"), SortOrder::Descending).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_range_clamps_and_orders() {
        let cache = seeded().await;
        let desc = cache.range(&lb(), 0, 10, SortOrder::Descending).await.unwrap();
        let ids: Vec<_> = desc.iter().map(|(m, _)| m.player_id().to_string()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        let asc = cache.range(&lb(), 1, 1, SortOrder::Ascending).await.unwrap();
        assert_eq!(asc, vec![(key("c"), 20.0)]);

        assert!(cache.range(&lb(), 3, 5, SortOrder::Ascending).await.unwrap().is_empty());
        assert!(cache.range(&lb(), 2, 1, SortOrder::Ascending).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ties_break_by_member_and_reverse() {
        let cache = InMemoryCache::new();
        for id in ["x", "y", "z"] {
            cache.set_score(&lb(), &key(id), 5.0).await.unwrap();
        }
        let asc = cache.range(&lb(), 0, 2, SortOrder::Ascending).await.unwrap();
        let mut desc = cache.range(&lb(), 0, 2, SortOrder::Descending).await.unwrap();
        desc.reverse();
        assert_eq!(asc, desc);
        assert_eq!(asc[0].0, key("x"));
    }

    #[tokio::test]
    async fn test_rejects_non_finite_score() {
        let cache = InMemoryCache::new();
        let err = cache.set_score(&lb(), &key("a"), f64::NAN).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(cache.count(&lb()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fields_merge_and_remove() {
        let cache = InMemoryCache::new();
        cache
            .set_fields(&lb(), &key("a"), HashMap::from([("x".into(), "1".into())]))
            .await
            .unwrap();
        cache
            .set_fields(&lb(), &key("a"), HashMap::from([("y".into(), "2".into())]))
            .await
            .unwrap();
        let fields = cache.get_fields(&lb(), &key("a")).await.unwrap().unwrap();
        assert_eq!(fields.len(), 2);

        assert!(cache.remove_fields(&lb(), &key("a")).await.unwrap());
        assert!(cache.get_fields(&lb(), &key("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_member() {
        let cache = seeded().await;
        assert!(cache.remove_member(&lb(), &key("c")).await.unwrap());
        assert!(!cache.remove_member(&lb(), &key("c")).await.unwrap());
        assert_eq!(cache.count(&lb()).await.unwrap(), 2);
        assert_eq!(cache.rank(&lb(), &key("a"), SortOrder::Descending).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_transaction_commits_and_publishes() {
        let channel = Arc::new(BroadcastChannel::new(8));
        let mut sub = channel.subscribe("t").await.unwrap();
        let cache = InMemoryCache::with_channel(channel);
        cache.set_score(&lb(), &key("top"), 100.0).await.unwrap();

        let tx = CacheTransaction::new()
            .set_score(&lb(), &key("a"), 50.0)
            .rank(&lb(), &key("a"), SortOrder::Descending)
            .set_fields(&lb(), &key("a"), HashMap::from([("country".into(), "NZ".into())]))
            .publish("t", "payload");
        let receipt = cache.execute(tx).await.unwrap();

        assert_eq!(receipt.rank(), Some(1));
        assert!(receipt.added());
        assert_eq!(receipt.outcomes[3], OpOutcome::Published { receivers: 1 });
        assert_eq!(sub.recv().await, ChannelEvent::Message("payload".to_string()));
    }

    #[tokio::test]
    async fn test_failed_publish_rolls_back_everything() {
        let cache = InMemoryCache::new();
        cache.set_score(&lb(), &key("a"), 1.0).await.unwrap();
        cache
            .set_fields(&lb(), &key("a"), HashMap::from([("country".into(), "FR".into())]))
            .await
            .unwrap();

        let tx = CacheTransaction::new()
            .set_score(&lb(), &key("a"), 99.0)
            .set_score(&lb(), &key("new"), 5.0)
            .set_fields(&lb(), &key("a"), HashMap::from([("country".into(), "DE".into())]))
            .publish("t", "payload");
        let err = cache.execute(tx).await.unwrap_err();

        assert!(matches!(
            err,
            PodiumError::Cache(CacheError::TransactionAborted { step: 3, .. })
        ));
        assert_eq!(cache.score(&lb(), &key("a")).await.unwrap(), Some(1.0));
        assert_eq!(cache.score(&lb(), &key("new")).await.unwrap(), None);
        let fields = cache.get_fields(&lb(), &key("a")).await.unwrap().unwrap();
        assert_eq!(fields.get("country").map(String::as_str), Some("FR"));
    }

    #[tokio::test]
    async fn test_second_publish_is_rejected_before_any_step() {
        let channel = Arc::new(BroadcastChannel::new(8));
        let mut sub = channel.subscribe("t").await.unwrap();
        let cache = InMemoryCache::with_channel(channel.clone());

        let tx = CacheTransaction::new()
            .set_score(&lb(), &key("a"), 5.0)
            .publish("t", "first")
            .publish("t", "second");
        let err = cache.execute(tx).await.unwrap_err();

        assert!(matches!(
            err,
            PodiumError::Cache(CacheError::TransactionAborted { step: 2, .. })
        ));
        assert_eq!(cache.count(&lb()).await.unwrap(), 0);
        channel.publish_raw("t", "marker".to_string()).await.unwrap();
        assert_eq!(sub.recv().await, ChannelEvent::Message("marker".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_step_rolls_back_previous_steps() {
        let cache = InMemoryCache::new();
        let tx = CacheTransaction::new()
            .set_score(&lb(), &key("a"), 1.0)
            .set_score(&lb(), &key("b"), f64::INFINITY);
        let err = cache.execute(tx).await.unwrap_err();
        assert!(matches!(
            err,
            PodiumError::Cache(CacheError::TransactionAborted { step: 1, .. })
        ));
        assert_eq!(cache.count(&lb()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_and_leaderboards() {
        let cache = seeded().await;
        let other = LeaderboardName::new("weekly").unwrap();
        cache.set_score(&other, &key("a"), 1.0).await.unwrap();
        assert_eq!(cache.leaderboards().await, vec![lb(), other]);
        cache.clear().await;
        assert!(cache.leaderboards().await.is_empty());
    }
}
