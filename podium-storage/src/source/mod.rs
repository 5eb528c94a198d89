//! Source of record: the contract and two in-process adapters.

pub mod event_sourced;
pub mod relational;
pub mod traits;

pub use event_sourced::{EntryAggregate, EntryEvent, EventSourcedStore};
pub use relational::RelationalStore;
pub use traits::SourceOfRecord;
