// In-memory Store, for tests and ephemeral nodes

use crate::storage::{Feed, Peer, Store, StoreError};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// Store kept entirely in memory. Each map sits behind its own lock, so
/// mutations on one entity kind are serialized while reads run concurrently.
#[derive(Default)]
pub struct MemoryStore {
    peers: RwLock<HashMap<String, Peer>>,
    feeds: RwLock<BTreeMap<String, Feed>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with feeds
    pub fn with_feeds(feeds: impl IntoIterator<Item = Feed>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.feeds.write() {
            for feed in feeds {
                map.insert(feed.key.clone(), feed);
            }
        }
        store
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.read().map(|f| f.len()).unwrap_or(0)
    }
}

impl Store for MemoryStore {
    fn get_peer(&self, address: &str) -> Result<Option<Peer>, StoreError> {
        let peers = self.peers.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(peers.get(address).cloned())
    }

    fn insert_peer(&self, peer: &Peer) -> Result<(), StoreError> {
        let mut peers = self.peers.write().map_err(|_| StoreError::LockPoisoned)?;
        if peers.contains_key(peer.address()) {
            return Err(StoreError::PeerExists(peer.address().to_string()));
        }
        peers.insert(peer.address().to_string(), peer.clone());
        Ok(())
    }

    fn get_feed(&self, key: &str) -> Result<Option<Feed>, StoreError> {
        let feeds = self.feeds.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(feeds.get(key).cloned())
    }

    fn insert_feed_if_absent(&self, feed: &Feed) -> Result<bool, StoreError> {
        let mut feeds = self.feeds.write().map_err(|_| StoreError::LockPoisoned)?;
        if feeds.contains_key(&feed.key) {
            return Ok(false);
        }
        feeds.insert(feed.key.clone(), feed.clone());
        Ok(true)
    }

    fn upsert_feed(&self, feed: &Feed) -> Result<Feed, StoreError> {
        let mut feeds = self.feeds.write().map_err(|_| StoreError::LockPoisoned)?;
        let stored = feeds
            .entry(feed.key.clone())
            .and_modify(|existing| existing.merge_details(feed))
            .or_insert_with(|| feed.clone());
        Ok(stored.clone())
    }

    fn set_subscribed(&self, key: &str, subscribed: bool) -> Result<(), StoreError> {
        let mut feeds = self.feeds.write().map_err(|_| StoreError::LockPoisoned)?;
        let feed = feeds
            .get_mut(key)
            .ok_or_else(|| StoreError::FeedNotFound(key.to_string()))?;
        feed.subscribed = subscribed;
        Ok(())
    }

    fn list_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        let feeds = self.feeds.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(feeds.values().cloned().collect())
    }
}
