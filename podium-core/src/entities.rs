//! Leaderboard entry and read-side projection types

use crate::error::ValidationError;
use crate::identity::{LeaderboardName, MemberKey, PlayerId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// DetailStore field names.
pub mod fields {
    pub const PLAYER_ID: &str = "playerId";
    pub const LEADERBOARD: &str = "leaderboardName";
    pub const FIRST_NAME: &str = "firstName";
    pub const LAST_NAME: &str = "lastName";
    pub const COUNTRY: &str = "country";
}

/// Ordering of a leaderboard query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Rank 1 is the highest score.
    #[default]
    Descending,
    /// Rank 1 is the lowest score.
    Ascending,
}

impl SortOrder {
    pub fn from_desc(desc: bool) -> Self {
        if desc {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        }
    }

    pub fn is_desc(self) -> bool {
        matches!(self, SortOrder::Descending)
    }
}

/// Which adjacent rank a neighbor lookup reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborDirection {
    /// One rank closer to rank 1.
    Previous,
    /// One rank further from rank 1.
    Next,
}

impl NeighborDirection {
    pub fn opposite(self) -> Self {
        match self {
            NeighborDirection::Previous => NeighborDirection::Next,
            NeighborDirection::Next => NeighborDirection::Previous,
        }
    }
}

/// Reject scores that cannot be ordered.
pub fn validate_score(score: f64) -> Result<f64, ValidationError> {
    if score.is_finite() {
        Ok(score)
    } else {
        Err(ValidationError::InvalidValue {
            field: "score".to_string(),
            reason: format!("{} is not a finite number", score),
        })
    }
}

/// Convert a 0-based position into a 1-based rank.
pub fn display_rank(position: u64) -> i64 {
    i64::try_from(position).map_or(i64::MAX, |p| p.saturating_add(1))
}

// ============================================================================
// DETAIL
// ============================================================================

/// Display-only attributes of a player. The ranked set holds scores only, so
/// these live in the detail store keyed by the entry's [`MemberKey`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerDetail {
    pub first_name: String,
    pub last_name: String,
    pub country: String,
}

impl PlayerDetail {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            country: country.into(),
        }
    }

    /// True when every field is empty, as for a member cached without detail.
    pub fn is_blank(&self) -> bool {
        self.first_name.is_empty() && self.last_name.is_empty() && self.country.is_empty()
    }

    /// Encode as a detail-store hash.
    pub fn to_fields(
        &self,
        leaderboard: &LeaderboardName,
        player_id: &PlayerId,
    ) -> HashMap<String, String> {
        HashMap::from([
            (fields::PLAYER_ID.to_string(), player_id.to_string()),
            (fields::LEADERBOARD.to_string(), leaderboard.to_string()),
            (fields::FIRST_NAME.to_string(), self.first_name.clone()),
            (fields::LAST_NAME.to_string(), self.last_name.clone()),
            (fields::COUNTRY.to_string(), self.country.clone()),
        ])
    }

    /// Decode a detail-store hash. Missing fields decode as blank.
    pub fn from_fields(map: &HashMap<String, String>) -> Self {
        let get = |name: &str| map.get(name).cloned().unwrap_or_default();
        Self {
            first_name: get(fields::FIRST_NAME),
            last_name: get(fields::LAST_NAME),
            country: get(fields::COUNTRY),
        }
    }
}

// ============================================================================
// ENTRY
// ============================================================================

/// One player's standing on one leaderboard as held by the source of record.
///
/// `rank` is advisory: ranks are computed from the ranked set at query time
/// and are never trusted when read back from a durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub leaderboard: LeaderboardName,
    pub player_id: PlayerId,
    pub score: f64,
    #[serde(default)]
    pub rank: Option<i64>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

impl LeaderboardEntry {
    pub fn new(leaderboard: LeaderboardName, player_id: PlayerId, score: f64) -> Self {
        Self {
            leaderboard,
            player_id,
            score,
            rank: None,
            first_name: String::new(),
            last_name: String::new(),
            country: String::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_detail(mut self, detail: PlayerDetail) -> Self {
        self.first_name = detail.first_name;
        self.last_name = detail.last_name;
        self.country = detail.country;
        self
    }

    pub fn detail(&self) -> PlayerDetail {
        PlayerDetail {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            country: self.country.clone(),
        }
    }

    pub fn member_key(&self) -> MemberKey {
        MemberKey::for_player(&self.player_id)
    }

    /// Detail-store hash for this entry.
    pub fn detail_fields(&self) -> HashMap<String, String> {
        self.detail().to_fields(&self.leaderboard, &self.player_id)
    }

    /// Check the score can be ordered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_score(self.score).map(|_| ())
    }
}

// ============================================================================
// READ-SIDE PROJECTIONS
// ============================================================================

/// A player's score and rank as seen by one query. Built fresh per query and
/// never cached: the rank component goes stale on the next score mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerScoreResult {
    pub player_id: PlayerId,
    pub score: f64,
    pub leaderboard: LeaderboardName,
    /// 1-based rank in the requested order.
    pub rank: i64,
    pub first_name: String,
    pub last_name: String,
    pub country: String,
}

impl PlayerScoreResult {
    pub fn new(
        leaderboard: LeaderboardName,
        player_id: PlayerId,
        score: f64,
        rank: i64,
        detail: PlayerDetail,
    ) -> Self {
        Self {
            player_id,
            score,
            leaderboard,
            rank,
            first_name: detail.first_name,
            last_name: detail.last_name,
            country: detail.country,
        }
    }

    pub fn member_key(&self) -> MemberKey {
        MemberKey::for_player(&self.player_id)
    }
}

/// A player's standing together with the members directly above and below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerScoreWithNeighbors {
    pub previous: Option<PlayerScoreResult>,
    pub current: PlayerScoreResult,
    pub next: Option<PlayerScoreResult>,
}

/// One member of a group lookup.
///
/// `group_order` is the position inside the requested subset (1..=N);
/// `standing.current.rank` keeps the global rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStanding {
    pub group_order: usize,
    pub standing: PlayerScoreWithNeighbors,
}
