//! Write-behind writes: cache only, then hand the intention to the relays.

use podium_core::{
    validate_score, CancelSignal, LeaderboardEntry, LeaderboardName, MemberKey, PlayerId,
    PlayerScoreResult, PodiumError, PodiumResult, WriteIntention,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::handoff::IntentionHandoff;
use crate::engine::RankingEngine;

#[derive(Debug, Clone)]
pub struct WriteBehind {
    engine: Arc<RankingEngine>,
    handoff: IntentionHandoff,
}

impl WriteBehind {
    pub fn new(engine: Arc<RankingEngine>, handoff: IntentionHandoff) -> Self {
        Self { engine, handoff }
    }

    pub fn handoff(&self) -> &IntentionHandoff {
        &self.handoff
    }

    /// The cache write is the commit point. Store failures surface later in
    /// the relays, never here.
    #[instrument(skip_all, fields(leaderboard = %entry.leaderboard, player_id = %entry.player_id))]
    pub async fn add_or_update(
        &self,
        entry: LeaderboardEntry,
        cancel: &CancelSignal,
    ) -> PodiumResult<PlayerScoreResult> {
        entry.validate()?;
        cancel.check()?;
        let added = self.engine.write_entry(&entry).await?;
        let intention = if added {
            WriteIntention::added(&entry)
        } else {
            WriteIntention::add_or_updated(&entry)
        };
        self.handoff.hand_off(&intention).await;
        debug!(kind = intention.kind_name(), "Write-behind cache write committed");

        let detail = entry.detail();
        self.engine
            .standing(&entry.leaderboard, &entry.player_id, entry.score, detail)
            .await
    }

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
        self.engine
            .cache()
            .set_score(leaderboard, &member, score)
            .await?;
        // The intention may be the only one a relay applies, so it carries
        // the cached detail along with the score.
        let detail = self.engine.detail_or_blank(leaderboard, &member, cancel).await?;
        let intention = WriteIntention::updated_with_detail(
            leaderboard.clone(),
            player_id.clone(),
            score,
            detail.clone(),
        );
        self.handoff.hand_off(&intention).await;

        self.engine
            .standing(leaderboard, player_id, score, detail)
            .await
    }
}
