//! Persistence Adapters - File-based Order Storage
//!
//! Implements the `OrderStore` port with one atomically replaced JSON
//! record per order and an append-only JSONL audit log. No database
//! dependency; every write is fsynced before it is acknowledged.

pub mod disk_store;
pub mod events;
pub mod records;

pub use disk_store::DiskStore;
pub use events::EventLog;
pub use records::OrderRecords;
