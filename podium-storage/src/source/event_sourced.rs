//! Event-sourced source of record.
//!
//! Each entry is an aggregate whose state is the fold of its event stream.
//! Upserts decide which events the target entry implies, append them, and
//! update a read-model projection used for paging.

use async_trait::async_trait;
use chrono::Utc;
use podium_core::{
    validate_score, LeaderboardEntry, LeaderboardName, PlayerDetail, PlayerId, PodiumResult,
    SortOrder, StoreError, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::trace;

use super::traits::{page_of, SourceOfRecord};

/// Facts recorded about one leaderboard entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EntryEvent {
    Registered {
        leaderboard: LeaderboardName,
        player_id: PlayerId,
        score: f64,
        detail: PlayerDetail,
        at: Timestamp,
    },
    ScoreRecorded {
        score: f64,
        at: Timestamp,
    },
    DetailChanged {
        detail: PlayerDetail,
        at: Timestamp,
    },
}

/// Current state of one entry, rebuilt from its events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryAggregate {
    pub version: u64,
    pub entry: Option<LeaderboardEntry>,
}

impl EntryAggregate {
    pub fn fold<'a>(events: impl IntoIterator<Item = &'a EntryEvent>) -> Self {
        let mut aggregate = Self::default();
        for event in events {
            aggregate.apply(event);
        }
        aggregate
    }

    /// Events recorded before registration carry nothing to apply to.
    pub fn apply(&mut self, event: &EntryEvent) {
        self.version += 1;
        match event {
            EntryEvent::Registered {
                leaderboard,
                player_id,
                score,
                detail,
                at,
            } => {
                let mut entry = LeaderboardEntry::new(leaderboard.clone(), player_id.clone(), *score)
                    .with_detail(detail.clone());
                entry.created_at = Some(*at);
                entry.updated_at = Some(*at);
                self.entry = Some(entry);
            }
            EntryEvent::ScoreRecorded { score, at } => {
                if let Some(entry) = self.entry.as_mut() {
                    entry.score = *score;
                    entry.updated_at = Some(*at);
                }
            }
            EntryEvent::DetailChanged { detail, at } => {
                if let Some(entry) = self.entry.as_mut() {
                    entry.first_name = detail.first_name.clone();
                    entry.last_name = detail.last_name.clone();
                    entry.country = detail.country.clone();
                    entry.updated_at = Some(*at);
                }
            }
        }
    }

    /// Events that move this aggregate to `target`. Empty when nothing
    /// changes.
    pub fn decide(&self, target: &LeaderboardEntry, at: Timestamp) -> Vec<EntryEvent> {
        let Some(current) = &self.entry else {
            return vec![EntryEvent::Registered {
                leaderboard: target.leaderboard.clone(),
                player_id: target.player_id.clone(),
                score: target.score,
                detail: target.detail(),
                at,
            }];
        };
        let mut events = Vec::new();
        if current.score.to_bits() != target.score.to_bits() {
            events.push(EntryEvent::ScoreRecorded {
                score: target.score,
                at,
            });
        }
        if current.detail() != target.detail() {
            events.push(EntryEvent::DetailChanged {
                detail: target.detail(),
                at,
            });
        }
        events
    }
}

type StreamKey = (LeaderboardName, PlayerId);

#[derive(Debug, Default)]
struct EventState {
    streams: HashMap<StreamKey, Vec<EntryEvent>>,
    projection: HashMap<StreamKey, LeaderboardEntry>,
}

/// Event-sourced [`SourceOfRecord`].
#[derive(Debug, Default)]
pub struct EventSourcedStore {
    state: RwLock<EventState>,
}

impl EventSourcedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full event stream of one entry.
    pub async fn events(&self, leaderboard: &LeaderboardName, player_id: &PlayerId) -> Vec<EntryEvent> {
        let state = self.state.read().await;
        state
            .streams
            .get(&(leaderboard.clone(), player_id.clone()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SourceOfRecord for EventSourcedStore {
    async fn fetch_one(
        &self,
        leaderboard: &LeaderboardName,
        player_id: &PlayerId,
    ) -> PodiumResult<Option<LeaderboardEntry>> {
        let state = self.state.read().await;
        Ok(state
            .streams
            .get(&(leaderboard.clone(), player_id.clone()))
            .and_then(|events| EntryAggregate::fold(events).entry))
    }

    async fn fetch_page(
        &self,
        leaderboard: &LeaderboardName,
        order: SortOrder,
        offset: usize,
        page_size: usize,
    ) -> PodiumResult<Vec<LeaderboardEntry>> {
        let state = self.state.read().await;
        let matching = state
            .projection
            .values()
            .filter(|e| &e.leaderboard == leaderboard)
            .cloned()
            .collect();
        Ok(page_of(matching, order, offset, page_size))
    }

    async fn upsert(&self, entry: LeaderboardEntry) -> PodiumResult<()> {
        validate_score(entry.score).map_err(|e| StoreError::UpsertRejected {
            leaderboard: entry.leaderboard.to_string(),
            player_id: entry.player_id.to_string(),
            reason: e.to_string(),
        })?;

        let key = (entry.leaderboard.clone(), entry.player_id.clone());
        let mut state = self.state.write().await;
        let stream = state.streams.entry(key.clone()).or_default();
        let mut aggregate = EntryAggregate::fold(stream.iter());
        let events = aggregate.decide(&entry, Utc::now());
        if events.is_empty() {
            return Ok(());
        }
        for event in &events {
            aggregate.apply(event);
        }
        stream.extend(events);
        trace!(
            leaderboard = %entry.leaderboard,
            player_id = %entry.player_id,
            version = aggregate.version,
            "Appended entry events"
        );
        if let Some(projected) = aggregate.entry {
            state.projection.insert(key, projected);
        }
        Ok(())
    }

    async fn count(&self, leaderboard: &LeaderboardName) -> PodiumResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .projection
            .keys()
            .filter(|(lb, _)| lb == leaderboard)
            .count() as u64)
    }
}
