//! Persistence Adapters - In-Process Store and Snapshot File
//!
//! Implements the `Store` port with serializable in-memory
//! transactions and atomic JSON snapshots for restart recovery.

pub mod memory;
pub mod snapshot;

pub use memory::{MemoryStore, StoreSnapshot};
pub use snapshot::SnapshotFile;
