//! Podium Core - Leaderboard Data Types
//!
//! Pure data structures shared by every other crate: identifiers, the
//! leaderboard entry and its read-side projections, write intentions, the
//! error taxonomy, configuration and the cancellation signal.
//! This crate contains no I/O.

pub mod cancel;
pub mod config;
pub mod constants;
pub mod entities;
pub mod error;
pub mod identity;
pub mod intention;

pub use cancel::{CancelHandle, CancelSignal};
pub use config::{
    CacheConfig, PodiumConfig, RelayConfig, RelayKind, RetryConfig, StrategyConfig, StrategyKind,
};
pub use constants::*;
pub use entities::{
    display_rank, fields, validate_score, GroupStanding, LeaderboardEntry, NeighborDirection,
    PlayerDetail, PlayerScoreResult, PlayerScoreWithNeighbors, SortOrder,
};
pub use error::{
    CacheError, ConfigError, ErrorKind, PodiumError, PodiumResult, RelayError, StoreError,
    ValidationError,
};
pub use identity::{new_intention_id, IntentionId, LeaderboardName, MemberKey, PlayerId, Timestamp};
pub use intention::{IntentionPayload, WriteIntention};

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any valid player id survives the member-key derivation.
        #[test]
        fn prop_member_key_recovers_player(id in "[A-Za-z0-9_:.-]{1,64}") {
            let player = PlayerId::new(id.clone()).unwrap();
            let key = MemberKey::for_player(&player);
            let recovered = key.player_id();
            prop_assert_eq!(recovered.as_str(), id.as_str());
            prop_assert_eq!(MemberKey::parse(key.as_str()).unwrap(), key);
        }

        /// Every finite score is accepted and reaches the merged entry unchanged.
        #[test]
        fn prop_intention_preserves_score(score in -1.0e12f64..1.0e12) {
            let entry = LeaderboardEntry::new(
                LeaderboardName::global(),
                PlayerId::new("p").unwrap(),
                score,
            );
            prop_assert!(entry.validate().is_ok());
            let merged = WriteIntention::add_or_updated(&entry).merge_into(None);
            prop_assert_eq!(merged.score, score);
            prop_assert_eq!(merged.player_id, entry.player_id);
        }
    }
}
