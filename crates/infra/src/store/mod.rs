//! Transactional inventory store boundary.
//!
//! Lots, allocations, adjustments and restock requests are state-stored
//! records keyed by tenant + id. Writes go through one atomic `commit` of a
//! [`ChangeSet`], checked record by record against the version the writer
//! read (optimistic concurrency).

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryInventoryStore;
pub use r#trait::{ChangeSet, InventoryStore};
