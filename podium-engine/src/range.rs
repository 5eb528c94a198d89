//! Range queries
//!
//! A range is served from the ranked set when it holds anything in the
//! window. An empty window triggers a full population, because relative
//! ranks are only correct once the whole leaderboard is cached; the
//! requested slice is then taken from the rows as they stream past.

use podium_core::{
    display_rank, CancelSignal, LeaderboardName, PlayerScoreResult, PodiumError, PodiumResult,
    SortOrder, ValidationError,
};
use podium_storage::{RankWindow, RankedSet};
use tracing::{debug, info, instrument};

use crate::engine::{degraded, RankingEngine};

impl RankingEngine {
    /// Reject inverted or oversized windows before any I/O.
    pub fn validate_range(&self, start: u64, end: u64) -> Result<(), ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidRange {
                start,
                end,
                reason: "start is after end".to_string(),
            });
        }
        let width = end - start + 1;
        if width > self.config().max_range_width {
            return Err(ValidationError::InvalidRange {
                start,
                end,
                reason: format!(
                    "window of {} exceeds the limit of {}",
                    width,
                    self.config().max_range_width
                ),
            });
        }
        Ok(())
    }

    /// Standings at 0-based positions `start..=end`, ranked `start + 1`
    /// onwards. Empty when the leaderboard has no entries there.
    #[instrument(skip_all, fields(leaderboard = %leaderboard, start = start, end = end, order = ?order))]
    pub async fn get_range(
        &self,
        leaderboard: &LeaderboardName,
        start: u64,
        end: u64,
        order: SortOrder,
        cancel: &CancelSignal,
    ) -> PodiumResult<Vec<PlayerScoreResult>> {
        self.validate_range(start, end)?;
        cancel.check()?;

        let rows = degraded(
            self.cache().range(leaderboard, start, end, order).await,
            "range",
        )?;
        if !rows.is_empty() {
            debug!(rows = rows.len(), "Range cache hit");
            let mut results = Vec::with_capacity(rows.len());
            for (offset, (member, score)) in (start..).zip(rows) {
                let detail = self.detail_or_blank(leaderboard, &member, cancel).await?;
                results.push(PlayerScoreResult::new(
                    leaderboard.clone(),
                    member.player_id(),
                    score,
                    display_rank(offset),
                    detail,
                ));
            }
            return Ok(results);
        }

        info!("Range cache miss, populating leaderboard");
        let (report, captured) = self
            .populator()
            .populate_capturing(leaderboard, order, Some(RankWindow::new(start, end)), cancel)
            .await?;
        if report.cancelled {
            return Err(PodiumError::Cancelled);
        }

        Ok((start..)
            .zip(captured)
            .map(|(offset, entry)| {
                let detail = entry.detail();
                PlayerScoreResult::new(
                    entry.leaderboard,
                    entry.player_id,
                    entry.score,
                    display_rank(offset),
                    detail,
                )
            })
            .collect())
    }
}
