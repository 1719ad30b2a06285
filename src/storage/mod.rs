// Storage module - PERSISTENCE
// Peer and feed records behind the `Store` trait, with sled and in-memory backends

mod memory;
mod model;
mod store;

pub use memory::MemoryStore;
pub use model::{Feed, FeedType, Peer};
pub use store::{SledStore, StorageStats, Store, StoreError};
