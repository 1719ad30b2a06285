// Sync module - FEED METADATA GOSSIP
// Two-phase declare/inquire/answer exchange run over authenticated sessions

mod engine;
mod state;

pub use engine::{FeedSyncEngine, SyncConfig, SyncError};
pub use state::{PeerSyncPhase, SyncStats};
