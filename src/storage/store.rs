// Store - persistent peer and feed records
//
// `Store` is the collaborator the handshake and the sync engine write
// through. Every mutation is atomic per record key, so two sessions racing on
// the same peer address or feed key cannot lose an update.

use crate::storage::{Feed, Peer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Key prefixes for organizing data
mod keys {
    pub const PEER_PREFIX: &[u8] = b"peer:";
    pub const FEED_PREFIX: &[u8] = b"feed:";
}

/// Errors from storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Flush failed: {0}")]
    FlushFailed(String),

    #[error("Peer already exists: {0}")]
    PeerExists(String),

    #[error("Feed not found: {0}")]
    FeedNotFound(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

/// Peer and feed persistence used by sessions
pub trait Store: Send + Sync {
    /// Look up a peer by stream-transport address
    fn get_peer(&self, address: &str) -> Result<Option<Peer>, StoreError>;

    /// Insert a new peer. Fails with `PeerExists` if the address is taken.
    fn insert_peer(&self, peer: &Peer) -> Result<(), StoreError>;

    /// Look up a feed by key
    fn get_feed(&self, key: &str) -> Result<Option<Feed>, StoreError>;

    /// Insert `feed` unless the key is already known. Returns whether it was
    /// inserted.
    fn insert_feed_if_absent(&self, feed: &Feed) -> Result<bool, StoreError>;

    /// Create or overwrite the feed's details. An existing record keeps its
    /// own `subscribed` flag; a new one takes the flag from `feed`.
    fn upsert_feed(&self, feed: &Feed) -> Result<Feed, StoreError>;

    /// Flip the local subscription flag
    fn set_subscribed(&self, key: &str, subscribed: bool) -> Result<(), StoreError>;

    /// All known feeds, in key order
    fn list_feeds(&self) -> Result<Vec<Feed>, StoreError>;
}

// ============================================================================
// SLED STORE
// ============================================================================

/// Statistics about the storage
#[derive(Clone, Debug)]
pub struct StorageStats {
    /// Number of keys in the database
    pub key_count: usize,
    /// Approximate disk size in bytes
    pub disk_size_bytes: u64,
}

/// Persistent store backed by sled.
///
/// Values are postcard-encoded; writes are atomic per key and durable after
/// `flush`.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::FlushFailed(e.to_string()))?;
        Ok(())
    }

    /// Get storage statistics
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            key_count: self.db.len(),
            disk_size_bytes: self.db.size_on_disk().unwrap_or(0),
        }
    }

    fn peer_key(address: &str) -> Vec<u8> {
        [keys::PEER_PREFIX, address.as_bytes()].concat()
    }

    fn feed_key(key: &str) -> Vec<u8> {
        [keys::FEED_PREFIX, key.as_bytes()].concat()
    }

    fn load<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StoreError> {
        match self.db.get(key)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    postcard::to_allocvec(value).map_err(|e| StoreError::SerializationFailed(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    postcard::from_bytes(bytes).map_err(|e| StoreError::DeserializationFailed(e.to_string()))
}

impl Store for SledStore {
    fn get_peer(&self, address: &str) -> Result<Option<Peer>, StoreError> {
        self.load(&Self::peer_key(address))
    }

    fn insert_peer(&self, peer: &Peer) -> Result<(), StoreError> {
        let bytes = encode(peer)?;
        self.db
            .compare_and_swap(Self::peer_key(peer.address()), None as Option<&[u8]>, Some(bytes))?
            .map_err(|_| StoreError::PeerExists(peer.address().to_string()))
    }

    fn get_feed(&self, key: &str) -> Result<Option<Feed>, StoreError> {
        self.load(&Self::feed_key(key))
    }

    fn insert_feed_if_absent(&self, feed: &Feed) -> Result<bool, StoreError> {
        let bytes = encode(feed)?;
        let swapped = self
            .db
            .compare_and_swap(Self::feed_key(&feed.key), None as Option<&[u8]>, Some(bytes))?;
        Ok(swapped.is_ok())
    }

    fn upsert_feed(&self, feed: &Feed) -> Result<Feed, StoreError> {
        // Both possible outcomes are encoded up front so the update closure
        // cannot fail halfway.
        let fresh = encode(feed)?;
        let keep_subscribed = encode(&feed.clone().with_subscribed(true))?;
        let keep_unsubscribed = encode(&feed.clone().with_subscribed(false))?;
        let mut corrupt = None;

        let stored = self.db.update_and_fetch(Self::feed_key(&feed.key), |old| match old {
            None => Some(fresh.clone()),
            Some(bytes) => match decode::<Feed>(bytes) {
                Ok(existing) if existing.subscribed => Some(keep_subscribed.clone()),
                Ok(_) => Some(keep_unsubscribed.clone()),
                Err(e) => {
                    corrupt = Some(e);
                    Some(bytes.to_vec())
                }
            },
        })?;

        if let Some(e) = corrupt {
            return Err(e);
        }
        match stored {
            Some(bytes) => decode(&bytes),
            None => Err(StoreError::DatabaseError("feed vanished during upsert".to_string())),
        }
    }

    fn set_subscribed(&self, key: &str, subscribed: bool) -> Result<(), StoreError> {
        let mut failure = None;

        let previous = self.db.fetch_and_update(Self::feed_key(key), |old| {
            let bytes = old?;
            let updated = decode::<Feed>(bytes)
                .map(|feed| feed.with_subscribed(subscribed))
                .and_then(|feed| encode(&feed));
            match updated {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    failure = Some(e);
                    Some(bytes.to_vec())
                }
            }
        })?;

        if let Some(e) = failure {
            return Err(e);
        }
        if previous.is_none() {
            return Err(StoreError::FeedNotFound(key.to_string()));
        }
        Ok(())
    }

    fn list_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        let mut feeds = Vec::new();
        for result in self.db.scan_prefix(keys::FEED_PREFIX) {
            let (_, value) = result?;
            feeds.push(decode(&value)?);
        }
        Ok(feeds)
    }
}
