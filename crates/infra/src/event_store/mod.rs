//! Append-only event store boundary.
//!
//! An infrastructure-facing abstraction for storing and loading
//! tenant-scoped event streams without making any storage assumptions.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
