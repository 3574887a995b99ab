//! Auxiliary stores that regions spool into.

pub mod memory;
pub mod traits;

pub use memory::InMemoryStore;
pub use traits::{AuxiliaryStore, StorageError};
