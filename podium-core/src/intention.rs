//! Write intentions
//!
//! A write intention captures one cache mutation that still has to reach the
//! source of record. It is created at write time, consumed by a relay (or the
//! write-through subscriber) and then discarded; it is never itself a record.

use crate::entities::{LeaderboardEntry, PlayerDetail};
use crate::identity::{new_intention_id, IntentionId, LeaderboardName, MemberKey, PlayerId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Prefix of the per-entry durable log stream.
const STREAM_PREFIX: &str = "intentions";

/// Mutation carried by every intention variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentionPayload {
    pub id: IntentionId,
    pub recorded_at: Timestamp,
    pub leaderboard: LeaderboardName,
    pub player_id: PlayerId,
    pub score: f64,
    /// Display fields; `None` means "leave whatever the store holds".
    #[serde(default)]
    pub detail: Option<PlayerDetail>,
}

/// A pending mutation for the source of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WriteIntention {
    /// The player was not on the leaderboard before this write.
    Added(IntentionPayload),
    /// Score-only change to an existing player.
    Updated(IntentionPayload),
    /// Upsert of score and display fields.
    AddOrUpdated(IntentionPayload),
}

impl WriteIntention {
    fn payload_from(entry: &LeaderboardEntry, detail: Option<PlayerDetail>) -> IntentionPayload {
        IntentionPayload {
            id: new_intention_id(),
            recorded_at: Utc::now(),
            leaderboard: entry.leaderboard.clone(),
            player_id: entry.player_id.clone(),
            score: entry.score,
            detail,
        }
    }

    pub fn added(entry: &LeaderboardEntry) -> Self {
        WriteIntention::Added(Self::payload_from(entry, Some(entry.detail())))
    }

    pub fn add_or_updated(entry: &LeaderboardEntry) -> Self {
        WriteIntention::AddOrUpdated(Self::payload_from(entry, Some(entry.detail())))
    }

    pub fn updated(leaderboard: LeaderboardName, player_id: PlayerId, score: f64) -> Self {
        WriteIntention::Updated(IntentionPayload {
            id: new_intention_id(),
            recorded_at: Utc::now(),
            leaderboard,
            player_id,
            score,
            detail: None,
        })
    }

    /// A score update that also carries the detail known at write time, so
    /// applying it alone still produces a complete row. A blank detail is
    /// left out and the stored one survives.
    pub fn updated_with_detail(
        leaderboard: LeaderboardName,
        player_id: PlayerId,
        score: f64,
        detail: PlayerDetail,
    ) -> Self {
        WriteIntention::Updated(IntentionPayload {
            id: new_intention_id(),
            recorded_at: Utc::now(),
            leaderboard,
            player_id,
            score,
            detail: Some(detail).filter(|d| !d.is_blank()),
        })
    }

    pub fn payload(&self) -> &IntentionPayload {
        match self {
            WriteIntention::Added(p) | WriteIntention::Updated(p) | WriteIntention::AddOrUpdated(p) => p,
        }
    }

    pub fn id(&self) -> IntentionId {
        self.payload().id
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            WriteIntention::Added(_) => "added",
            WriteIntention::Updated(_) => "updated",
            WriteIntention::AddOrUpdated(_) => "add_or_updated",
        }
    }

    pub fn member_key(&self) -> MemberKey {
        MemberKey::for_player(&self.payload().player_id)
    }

    /// Durable log stream holding intentions for this entry.
    pub fn stream_key(&self) -> String {
        let p = self.payload();
        format!("{}:{}:{}", STREAM_PREFIX, p.leaderboard, MemberKey::for_player(&p.player_id))
    }

    /// Build the entry to upsert, given what the store currently holds.
    ///
    /// Display fields from the intention win when present; otherwise the
    /// stored ones are kept. `created_at` always survives.
    pub fn merge_into(&self, existing: Option<LeaderboardEntry>) -> LeaderboardEntry {
        let p = self.payload();
        let mut entry = existing.unwrap_or_else(|| {
            LeaderboardEntry::new(p.leaderboard.clone(), p.player_id.clone(), p.score)
        });
        entry.score = p.score;
        entry.rank = None;
        if let Some(detail) = &p.detail {
            entry = entry.with_detail(detail.clone());
        }
        entry
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
