//! Podium Engine - Ranking Queries and Write Strategies
//!
//! The [`RankingEngine`] answers range, standing, neighbor, group and detail
//! queries from the cache and falls back to the source of record on a miss.
//! Writes go through one of the [`WriteStrategy`] variants. The
//! [`LeaderboardService`] ties a read path and a write path together behind
//! string-typed inputs.

mod detail;
mod engine;
mod range;
pub mod read_through;
pub mod service;
pub mod strategy;

pub use engine::{NeighborTarget, RankingEngine};
pub use read_through::ReadThrough;
pub use service::LeaderboardService;
pub use strategy::{
    CacheAside, HandoffTarget, IntentionHandoff, WriteBehind, WriteStrategy, WriteThrough,
};
