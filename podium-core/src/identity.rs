//! Identity types for leaderboard entries
//!
//! Leaderboard names and player ids are validated newtypes: an invalid value
//! cannot reach a store, so every engine operation can reject bad input
//! before it issues any I/O.

use crate::error::ValidationError;
use crate::{DEFAULT_LEADERBOARD, MAX_LEADERBOARD_NAME_LEN, MAX_PLAYER_ID_LEN};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Identifier of a write intention (UUIDv7, sortable by creation time).
pub type IntentionId = Uuid;

/// Generate a new UUIDv7 intention id.
pub fn new_intention_id() -> IntentionId {
    Uuid::now_v7()
}

/// Entity prefix used to derive ranked-set member keys.
const ENTRY_ENTITY: &str = "entry";

// ============================================================================
// LEADERBOARD NAME
// ============================================================================

/// Name of a leaderboard. Doubles as the ranked-set name in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LeaderboardName(String);

impl LeaderboardName {
    /// Validate and wrap a leaderboard name.
    ///
    /// Names are 1..=64 characters drawn from `[A-Za-z0-9_.:-]`.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "leaderboard".to_string(),
            });
        }
        if name.len() > MAX_LEADERBOARD_NAME_LEN {
            return Err(ValidationError::InvalidValue {
                field: "leaderboard".to_string(),
                reason: format!("longer than {} characters", MAX_LEADERBOARD_NAME_LEN),
            });
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
        {
            return Err(ValidationError::InvalidValue {
                field: "leaderboard".to_string(),
                reason: format!("character {:?} is not allowed", bad),
            });
        }
        Ok(Self(name))
    }

    /// The well-known global leaderboard.
    pub fn global() -> Self {
        Self(DEFAULT_LEADERBOARD.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LeaderboardName {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Display for LeaderboardName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LeaderboardName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for LeaderboardName {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LeaderboardName> for String {
    fn from(value: LeaderboardName) -> Self {
        value.0
    }
}

// ============================================================================
// PLAYER ID
// ============================================================================

/// Identifier of a player, unique within one leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerId(String);

impl PlayerId {
    /// Validate and wrap a player id. Ids are non-empty, at most 128 bytes
    /// and contain no whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "player_id".to_string(),
            });
        }
        if id.len() > MAX_PLAYER_ID_LEN {
            return Err(ValidationError::InvalidValue {
                field: "player_id".to_string(),
                reason: format!("longer than {} bytes", MAX_PLAYER_ID_LEN),
            });
        }
        if id.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidValue {
                field: "player_id".to_string(),
                reason: "must not contain whitespace".to_string(),
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PlayerId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for PlayerId {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlayerId> for String {
    fn from(value: PlayerId) -> Self {
        value.0
    }
}

// ============================================================================
// MEMBER KEY
// ============================================================================

/// Ranked-set member and detail-store key for one entry.
///
/// The key is `"entry:<playerId>"`. It is derived from the player id alone, so
/// a member returned by a rank range can be joined back to its detail record
/// and to the source of record without a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemberKey(String);

impl MemberKey {
    /// Derive the member key for a player.
    pub fn for_player(player_id: &PlayerId) -> Self {
        Self(format!("{}:{}", ENTRY_ENTITY, player_id))
    }

    /// Parse a raw member string read back from the ranked set.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let player = raw
            .strip_prefix(ENTRY_ENTITY)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "member".to_string(),
                reason: format!("{:?} is not an {} key", raw, ENTRY_ENTITY),
            })?;
        PlayerId::new(player)?;
        Ok(Self(raw))
    }

    /// Recover the player id this key was derived from.
    pub fn player_id(&self) -> PlayerId {
        // Both constructors guarantee the prefix and a valid id.
        PlayerId(self.0[ENTRY_ENTITY.len() + 1..].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MemberKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<MemberKey> for String {
    fn from(value: MemberKey) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaderboard_name_validation() {
        assert!(LeaderboardName::new("global").is_ok());
        assert!(LeaderboardName::new("season-3:weekly_2.eu").is_ok());
        assert!(matches!(
            LeaderboardName::new(""),
            Err(ValidationError::RequiredFieldMissing { .. })
        ));
        assert!(LeaderboardName::new("has space").is_err());
        assert!(LeaderboardName::new("a".repeat(65)).is_err());
    }

    #[test]
    fn test_default_leaderboard_is_global() {
        assert_eq!(LeaderboardName::default().as_str(), "global");
    }

    #[test]
    fn test_player_id_validation() {
        assert!(PlayerId::new("p1").is_ok());
        assert!(PlayerId::new("").is_err());
        assert!(PlayerId::new("p 1").is_err());
        assert!(PlayerId::new("x".repeat(129)).is_err());
    }

    #[test]
    fn test_member_key_joins_back_to_player() {
        let player = PlayerId::new("p42").unwrap();
        let key = MemberKey::for_player(&player);
        assert_eq!(key.as_str(), "entry:p42");
        assert_eq!(key.player_id(), player);

        let parsed = MemberKey::parse("entry:p42").unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_member_key_rejects_foreign_prefix() {
        assert!(MemberKey::parse("player:p42").is_err());
        assert!(MemberKey::parse("entry:").is_err());
        assert!(MemberKey::parse("entryp42").is_err());
    }

    #[test]
    fn test_player_id_with_colon_survives_key_roundtrip() {
        let player = PlayerId::new("team:alpha").unwrap();
        let key = MemberKey::for_player(&player);
        assert_eq!(key.player_id().as_str(), "team:alpha");
    }

    #[test]
    fn test_serde_rejects_invalid_names() {
        let ok: Result<LeaderboardName, _> = serde_json::from_str("\"global\"");
        assert!(ok.is_ok());
        let bad: Result<LeaderboardName, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }
}
