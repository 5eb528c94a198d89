//! Write-through writes.
//!
//! One atomic cache transaction updates the score, reads the new rank,
//! writes the detail and publishes an intention. A subscriber on the topic
//! applies the intention to the source of record. If the transaction aborts
//! nothing is published and the cache is untouched.

use podium_core::{
    display_rank, validate_score, CancelSignal, LeaderboardEntry, LeaderboardName, MemberKey,
    PlayerDetail, PlayerId, PlayerScoreResult, PodiumError, PodiumResult, RelayError, SortOrder,
    WriteIntention, WRITE_THROUGH_TOPIC,
};
use podium_storage::{CacheTransaction, OpOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::engine::RankingEngine;

#[derive(Debug, Clone)]
pub struct WriteThrough {
    engine: Arc<RankingEngine>,
    topic: String,
}

impl WriteThrough {
    pub fn new(engine: Arc<RankingEngine>) -> Self {
        Self {
            engine,
            topic: WRITE_THROUGH_TOPIC.to_string(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[instrument(skip_all, fields(leaderboard = %entry.leaderboard, player_id = %entry.player_id))]
    pub async fn add_or_update(
        &self,
        entry: LeaderboardEntry,
        cancel: &CancelSignal,
    ) -> PodiumResult<PlayerScoreResult> {
        entry.validate()?;
        cancel.check()?;
        let intention = WriteIntention::add_or_updated(&entry);
        self.commit(
            &entry.leaderboard,
            &entry.player_id,
            entry.score,
            Some(entry.detail_fields()),
            &intention,
            entry.detail(),
        )
        .await
    }

    /// Score-only change; the display fields are left alone.
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
        if !self.engine.exists(leaderboard, player_id).await? {
            return Err(PodiumError::not_found(leaderboard, player_id));
        }
        let member = MemberKey::for_player(player_id);
        let detail = self.engine.detail_or_blank(leaderboard, &member, cancel).await?;
        let intention = WriteIntention::updated(leaderboard.clone(), player_id.clone(), score);
        self.commit(leaderboard, player_id, score, None, &intention, detail)
            .await
    }

    async fn commit(
        &self,
        leaderboard: &LeaderboardName,
        player_id: &PlayerId,
        score: f64,
        fields: Option<HashMap<String, String>>,
        intention: &WriteIntention,
        detail: PlayerDetail,
    ) -> PodiumResult<PlayerScoreResult> {
        let payload = intention.encode().map_err(|e| RelayError::Malformed {
            reason: e.to_string(),
        })?;
        let member = MemberKey::for_player(player_id);

        let mut tx = CacheTransaction::new()
            .set_score(leaderboard, &member, score)
            .rank(leaderboard, &member, SortOrder::Descending);
        if let Some(fields) = fields {
            tx = tx.set_fields(leaderboard, &member, fields);
        }
        let tx = tx.publish(&self.topic, payload);

        let receipt = self.engine.cache().execute(tx).await?;
        if receipt
            .outcomes
            .iter()
            .any(|o| matches!(o, OpOutcome::Published { receivers: 0 }))
        {
            warn!(
                intention_id = %intention.id(),
                topic = %self.topic,
                "No write-through subscriber; source of record will not see this write"
            );
        }
        let position = receipt.rank().ok_or_else(|| {
            PodiumError::cache_unavailable("rank", "transaction returned no rank")
        })?;
        debug!(intention_id = %intention.id(), position, "Write-through transaction committed");

        Ok(PlayerScoreResult::new(
            leaderboard.clone(),
            player_id.clone(),
            score,
            display_rank(position),
            detail,
        ))
    }
}
