//! Podium Storage - Cache and Source-of-Record Contracts
//!
//! Defines the fast-path contracts (ranked set, detail store, transactional
//! cache), the durable source-of-record contract, in-process implementations
//! of both, and the populator that loads one into the other.

pub mod cache;
pub mod populator;
pub mod source;

pub use cache::{
    CacheOp, CacheTransaction, DetailStore, InMemoryCache, LeaderboardCache, OpOutcome,
    RankedSet, TransactionReceipt, TransactionalCache,
};
pub use populator::{CachePopulator, PopulationReport, RankWindow};
pub use source::{EntryAggregate, EntryEvent, EventSourcedStore, RelationalStore, SourceOfRecord};
