//! Fast-path cache: ranked set, detail store and atomic transactions.

pub mod memory;
pub mod traits;
pub mod transaction;

pub use memory::InMemoryCache;
pub use traits::{DetailStore, LeaderboardCache, RankedSet};
pub use transaction::{CacheOp, CacheTransaction, OpOutcome, TransactionReceipt, TransactionalCache};
