//! Atomic multi-step cache transactions.
//!
//! A [`CacheTransaction`] is an ordered batch of ranked-set, detail-store and
//! publish operations. A [`TransactionalCache`] applies the whole batch or
//! none of it: on failure every applied step is undone and nothing is
//! published. A transaction carries at most one publish step, since a
//! delivered message cannot be taken back if a later publish fails.

use async_trait::async_trait;
use podium_core::{LeaderboardName, MemberKey, PodiumResult, SortOrder};
use std::collections::HashMap;

/// One step of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOp {
    SetScore {
        set: LeaderboardName,
        member: MemberKey,
        score: f64,
    },
    /// Read the member's rank as of the preceding steps.
    Rank {
        set: LeaderboardName,
        member: MemberKey,
        order: SortOrder,
    },
    SetFields {
        set: LeaderboardName,
        member: MemberKey,
        fields: HashMap<String, String>,
    },
    /// Publish a payload once every other step has succeeded.
    Publish { topic: String, payload: String },
}

impl CacheOp {
    pub fn name(&self) -> &'static str {
        match self {
            CacheOp::SetScore { .. } => "set_score",
            CacheOp::Rank { .. } => "rank",
            CacheOp::SetFields { .. } => "set_fields",
            CacheOp::Publish { .. } => "publish",
        }
    }
}

/// Ordered batch of [`CacheOp`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheTransaction {
    ops: Vec<CacheOp>,
}

impl CacheTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_score(mut self, set: &LeaderboardName, member: &MemberKey, score: f64) -> Self {
        self.ops.push(CacheOp::SetScore {
            set: set.clone(),
            member: member.clone(),
            score,
        });
        self
    }

    pub fn rank(mut self, set: &LeaderboardName, member: &MemberKey, order: SortOrder) -> Self {
        self.ops.push(CacheOp::Rank {
            set: set.clone(),
            member: member.clone(),
            order,
        });
        self
    }

    pub fn set_fields(
        mut self,
        set: &LeaderboardName,
        member: &MemberKey,
        fields: HashMap<String, String>,
    ) -> Self {
        self.ops.push(CacheOp::SetFields {
            set: set.clone(),
            member: member.clone(),
            fields,
        });
        self
    }

    pub fn publish(mut self, topic: impl Into<String>, payload: impl Into<String>) -> Self {
        self.ops.push(CacheOp::Publish {
            topic: topic.into(),
            payload: payload.into(),
        });
        self
    }

    pub fn ops(&self) -> &[CacheOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<CacheOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Index of the second `Publish` step, if there is one.
    pub fn second_publish(&self) -> Option<usize> {
        self.ops
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, CacheOp::Publish { .. }))
            .nth(1)
            .map(|(step, _)| step)
    }
}

/// Result of one step, in the same position as the step.
#[derive(Debug, Clone, PartialEq)]
pub enum OpOutcome {
    ScoreSet { added: bool },
    Rank(Option<u64>),
    FieldsSet,
    Published { receivers: usize },
}

/// Outcomes of a committed transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionReceipt {
    pub outcomes: Vec<OpOutcome>,
}

impl TransactionReceipt {
    /// First rank read by the transaction.
    pub fn rank(&self) -> Option<u64> {
        self.outcomes.iter().find_map(|o| match o {
            OpOutcome::Rank(rank) => *rank,
            _ => None,
        })
    }

    /// Whether any `SetScore` step created a new member.
    pub fn added(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o, OpOutcome::ScoreSet { added: true }))
    }
}

/// Cache that can apply a [`CacheTransaction`] atomically.
#[async_trait]
pub trait TransactionalCache: Send + Sync {
    /// Apply every step or none. Fails with
    /// [`podium_core::CacheError::TransactionAborted`] naming the failed step.
    async fn execute(&self, tx: CacheTransaction) -> PodiumResult<TransactionReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use podium_core::PlayerId;

    #[test]
    fn test_builder_keeps_step_order() {
        let lb = LeaderboardName::global();
        let member = MemberKey::for_player(&PlayerId::new("p1").unwrap());
        let tx = CacheTransaction::new()
            .set_score(&lb, &member, 1.0)
            .rank(&lb, &member, SortOrder::Descending)
            .set_fields(&lb, &member, HashMap::new())
            .publish("topic", "{}");

        let names: Vec<_> = tx.ops().iter().map(CacheOp::name).collect();
        assert_eq!(names, vec!["set_score", "rank", "set_fields", "publish"]);
        assert_eq!(tx.len(), 4);
        assert_eq!(tx.second_publish(), None);
        assert_eq!(tx.publish("topic", "{}").second_publish(), Some(4));
    }

    #[test]
    fn test_receipt_helpers() {
        let receipt = TransactionReceipt {
            outcomes: vec![
                OpOutcome::ScoreSet { added: true },
                OpOutcome::Rank(Some(3)),
                OpOutcome::FieldsSet,
            ],
        };
        assert_eq!(receipt.rank(), Some(3));
        assert!(receipt.added());
        assert_eq!(TransactionReceipt::default().rank(), None);
    }
}
