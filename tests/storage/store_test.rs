// Store Tests
// Both backends run the same behavioural checks

use feedsync::identity::KeyBundle;
use feedsync::storage::{Feed, FeedType, MemoryStore, Peer, SledStore, Store, StoreError};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn with_each_store(check: impl Fn(&dyn Store)) {
    check(&MemoryStore::new());

    let temp_dir = TempDir::new().unwrap();
    let sled = SledStore::open(temp_dir.path()).unwrap();
    check(&sled);
}

fn peer(address: &str) -> Peer {
    let (bundle, _) = KeyBundle::generate_pair(None, None);
    Peer::from_bundle(address, bundle)
}

// ============================================================================
// PEERS
// ============================================================================

#[test]
fn test_peer_insert_and_get() {
    with_each_store(|store| {
        let original = peer("AA:BB").with_name("phone");
        store.insert_peer(&original).unwrap();

        let loaded = store.get_peer("AA:BB").unwrap().unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.name(), Some("phone"));
        assert!(store.get_peer("CC:DD").unwrap().is_none());
    });
}

#[test]
fn test_peer_key_material_is_immutable() {
    with_each_store(|store| {
        let first = peer("AA:BB");
        store.insert_peer(&first).unwrap();

        let result = store.insert_peer(&peer("AA:BB"));
        assert!(matches!(result, Err(StoreError::PeerExists(_))));

        let loaded = store.get_peer("AA:BB").unwrap().unwrap();
        assert_eq!(loaded.shared_key(), first.shared_key());
    });
}

// ============================================================================
// FEEDS
// ============================================================================

#[test]
fn test_upsert_keeps_local_subscription() {
    with_each_store(|store| {
        store.insert_feed_if_absent(&Feed::known("k")).unwrap();
        store.set_subscribed("k", true).unwrap();

        let stored = store
            .upsert_feed(&Feed::resolved("k", FeedType::Http, "h", "80"))
            .unwrap();

        assert!(stored.subscribed);
        assert!(stored.is_resolved());
        assert_eq!(store.get_feed("k").unwrap().unwrap(), stored);
    });
}

#[test]
fn test_upsert_creates_missing_feed() {
    with_each_store(|store| {
        let stored = store
            .upsert_feed(&Feed::resolved("new", FeedType::Tcp, "h", "1"))
            .unwrap();

        assert!(!stored.subscribed);
        assert_eq!(store.list_feeds().unwrap().len(), 1);
    });
}

#[test]
fn test_upsert_overwrites_details() {
    with_each_store(|store| {
        store.upsert_feed(&Feed::resolved("k", FeedType::Tcp, "old", "1")).unwrap();
        store.upsert_feed(&Feed::resolved("k", FeedType::Udp, "new", "2")).unwrap();

        let feed = store.get_feed("k").unwrap().unwrap();
        assert_eq!(feed.host.as_deref(), Some("new"));
        assert_eq!(feed.feed_type, Some(FeedType::Udp));
    });
}

#[test]
fn test_insert_if_absent_does_not_clobber() {
    with_each_store(|store| {
        store.upsert_feed(&Feed::resolved("k", FeedType::Tcp, "h", "1")).unwrap();

        assert!(!store.insert_feed_if_absent(&Feed::known("k")).unwrap());
        assert!(store.get_feed("k").unwrap().unwrap().is_resolved());
    });
}

#[test]
fn test_list_feeds_in_key_order() {
    with_each_store(|store| {
        for key in ["c", "a", "b"] {
            store.insert_feed_if_absent(&Feed::known(key)).unwrap();
        }
        let keys: Vec<String> = store.list_feeds().unwrap().into_iter().map(|f| f.key).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    });
}

#[test]
fn test_set_subscribed_missing_feed() {
    with_each_store(|store| {
        assert!(matches!(
            store.set_subscribed("nope", false),
            Err(StoreError::FeedNotFound(_))
        ));
    });
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[test]
fn test_concurrent_peer_insert_has_one_winner() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SledStore::open(temp_dir.path()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || store.insert_peer(&peer("AA:BB")).is_ok())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(winners, 1);
}

#[test]
fn test_concurrent_feed_creation_has_one_creator() {
    let store = Arc::new(MemoryStore::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || store.insert_feed_if_absent(&Feed::known("k")).unwrap())
        })
        .collect();
    let created = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|created| *created)
        .count();

    assert_eq!(created, 1);
    assert_eq!(store.feed_count(), 1);
}

#[test]
fn test_sled_stats_count_records() {
    let temp_dir = TempDir::new().unwrap();
    let store = SledStore::open(temp_dir.path()).unwrap();
    assert!(store.is_empty());

    store.insert_peer(&peer("AA")).unwrap();
    store.insert_feed_if_absent(&Feed::known("k")).unwrap();

    assert_eq!(store.stats().key_count, 2);
}
