//! Append-only event store boundary.
//!
//! Every committed domain event lands here first; aggregates are rebuilt from
//! these streams when a book is opened.

pub mod file;
pub mod in_memory;
pub mod r#trait;

pub use file::FileEventStore;
pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
