// Feed Sync Engine Tests
// Two engines exchanging envelopes until quiescent

use feedsync::events::{EventSink, LinkEvent};
use feedsync::storage::{Feed, FeedType, MemoryStore, SledStore, Store};
use feedsync::sync::{FeedSyncEngine, PeerSyncPhase, SyncConfig, SyncError};
use feedsync::wire::Envelope;
use std::collections::VecDeque;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

fn engine(store: Arc<dyn Store>) -> (FeedSyncEngine, UnboundedReceiver<LinkEvent>) {
    let (events, rx) = EventSink::channel();
    (FeedSyncEngine::new(store, events, SyncConfig::default()), rx)
}

/// Run phase one between `a` (whose peer is "B") and `b` (whose peer is
/// "A"), delivering envelopes in order in both directions.
fn run_phase_one(a: &FeedSyncEngine, b: &FeedSyncEngine) {
    let mut to_b: VecDeque<Envelope> = a.begin_phase_one("B").unwrap().into();
    a.declarations_sent("B").unwrap();
    let mut to_a: VecDeque<Envelope> = b.begin_phase_one("A").unwrap().into();
    b.declarations_sent("A").unwrap();

    while !to_a.is_empty() || !to_b.is_empty() {
        if let Some(envelope) = to_b.pop_front() {
            to_a.extend(b.handle("A", envelope).unwrap());
        }
        if let Some(envelope) = to_a.pop_front() {
            to_b.extend(a.handle("B", envelope).unwrap());
        }
    }
}

fn drain(rx: &mut UnboundedReceiver<LinkEvent>) -> Vec<LinkEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// CONVERGENCE
// ============================================================================

#[test]
fn test_disjoint_feed_sets_converge() {
    let store_a = Arc::new(MemoryStore::with_feeds([
        Feed::resolved("k1", FeedType::Tcp, "10.0.0.1", "7000").with_subscribed(true),
    ]));
    let store_b = Arc::new(MemoryStore::with_feeds([
        Feed::resolved("k2", FeedType::Mqtt, "10.0.0.2", "1883"),
        Feed::resolved("k3", FeedType::Http, "10.0.0.3", "8080").with_subscribed(true),
    ]));
    let (a, _) = engine(store_a.clone());
    let (b, _) = engine(store_b.clone());

    run_phase_one(&a, &b);

    for key in ["k1", "k2", "k3"] {
        let on_a = store_a.get_feed(key).unwrap().unwrap();
        let on_b = store_b.get_feed(key).unwrap().unwrap();
        assert!(on_a.is_resolved(), "{} unresolved on A", key);
        assert_eq!(on_a.feed_type, on_b.feed_type);
        assert_eq!(on_a.host, on_b.host);
        assert_eq!(on_a.port, on_b.port);
    }

    // Local interest never crosses the wire
    assert!(store_a.get_feed("k1").unwrap().unwrap().subscribed);
    assert!(!store_b.get_feed("k1").unwrap().unwrap().subscribed);
    assert!(!store_a.get_feed("k3").unwrap().unwrap().subscribed);
    assert!(store_b.get_feed("k3").unwrap().unwrap().subscribed);
}

#[test]
fn test_both_sides_reach_phase_one_complete() {
    let store_a = Arc::new(MemoryStore::with_feeds([Feed::resolved("x", FeedType::Udp, "h", "1")]));
    let store_b = Arc::new(MemoryStore::new());
    let (a, mut rx_a) = engine(store_a);
    let (b, mut rx_b) = engine(store_b);

    run_phase_one(&a, &b);

    assert_eq!(a.phase("B"), PeerSyncPhase::PhaseOneComplete);
    assert_eq!(b.phase("A"), PeerSyncPhase::PhaseOneComplete);
    assert!(b.pending_inquiries("A").is_empty());

    let complete = |events: &[LinkEvent], peer: &str| {
        events
            .iter()
            .filter(|e| **e == LinkEvent::PhaseOneComplete { address: peer.to_string() })
            .count()
    };
    assert_eq!(complete(&drain(&mut rx_a), "B"), 1);
    let events_b = drain(&mut rx_b);
    assert_eq!(complete(&events_b, "A"), 1);
    assert!(events_b.contains(&LinkEvent::FeedUpdated {
        key: "x".into(),
        from: "A".into()
    }));
}

#[test]
fn test_half_known_feed_does_not_stall_phase_one() {
    // A learned the key from some third device but never got its details
    let store_a = Arc::new(MemoryStore::with_feeds([
        Feed::known("half"),
        Feed::resolved("full", FeedType::Http, "10.0.0.4", "80"),
    ]));
    let store_b = Arc::new(MemoryStore::new());
    let (a, _) = engine(store_a);
    let (b, mut rx_b) = engine(store_b.clone());

    run_phase_one(&a, &b);

    assert_eq!(b.phase("A"), PeerSyncPhase::PhaseOneComplete);
    assert_eq!(a.phase("B"), PeerSyncPhase::PhaseOneComplete);
    assert!(b.pending_inquiries("A").is_empty());
    assert!(store_b.get_feed("half").unwrap().is_none());
    assert!(store_b.get_feed("full").unwrap().unwrap().is_resolved());
    assert!(drain(&mut rx_b).contains(&LinkEvent::PhaseOneComplete { address: "A".into() }));
}

#[test]
fn test_identical_stores_exchange_no_inquiries() {
    let feeds = || [Feed::resolved("same", FeedType::Tcp, "h", "1")];
    let (a, _) = engine(Arc::new(MemoryStore::with_feeds(feeds())));
    let (b, _) = engine(Arc::new(MemoryStore::with_feeds(feeds())));

    run_phase_one(&a, &b);

    assert_eq!(a.stats().inquiries_sent, 0);
    assert_eq!(b.stats().inquiries_sent, 0);
    assert_eq!(a.stats().declarations_received, 1);
    assert_eq!(a.phase("B"), PeerSyncPhase::PhaseOneComplete);
}

#[test]
fn test_convergence_over_sled() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let store_a = Arc::new(SledStore::open(dir_a.path()).unwrap());
    let store_b = Arc::new(SledStore::open(dir_b.path()).unwrap());
    store_a
        .upsert_feed(&Feed::resolved("radar", FeedType::Tcp, "10.9.9.9", "4000"))
        .unwrap();
    let (a, _) = engine(store_a);
    let (b, _) = engine(store_b.clone());

    run_phase_one(&a, &b);

    let feed = store_b.get_feed("radar").unwrap().unwrap();
    assert_eq!(feed.host.as_deref(), Some("10.9.9.9"));
}

// ============================================================================
// SINGLE ENVELOPES
// ============================================================================

#[test]
fn test_declare_unknown_key_scenario() {
    let store = Arc::new(MemoryStore::new());
    let (engine, _) = engine(store.clone());

    let replies = engine.handle("A", Envelope::declare("K", true)).unwrap();

    assert_eq!(replies, vec![Envelope::inquire("K")]);
    assert_eq!(store.get_feed("K").unwrap().unwrap(), Feed::known("K"));
    assert_eq!(engine.remote_interest("K"), vec![("A".to_string(), true)]);
}

#[test]
fn test_repeated_declaration_does_not_reinquire_same_peer() {
    let (engine, _) = engine(Arc::new(MemoryStore::new()));

    engine.handle("A", Envelope::declare("K", false)).unwrap();
    let again = engine.handle("A", Envelope::declare("K", false)).unwrap();

    assert!(again.is_empty());
    assert_eq!(engine.stats().inquiries_sent, 1);
}

#[test]
fn test_reinquire_can_be_disabled() {
    let store = Arc::new(MemoryStore::with_feeds([Feed::known("K")]));
    let engine = FeedSyncEngine::new(
        store,
        EventSink::disabled(),
        SyncConfig::new().with_reinquire_unresolved(false),
    );

    assert!(engine.handle("A", Envelope::declare("K", true)).unwrap().is_empty());
}

#[test]
fn test_inquiry_answered_with_local_subscription() {
    let store = Arc::new(MemoryStore::with_feeds([
        Feed::resolved("K", FeedType::Http, "h", "80").with_subscribed(true),
    ]));
    let (engine, _) = engine(store);

    let replies = engine.handle("A", Envelope::inquire("K")).unwrap();

    assert_eq!(
        replies,
        vec![Envelope::AnswerFeedQuery {
            feed_key: "K".into(),
            subscribed: true,
            host: "h".into(),
            port: "80".into(),
            feed_type: FeedType::Http,
        }]
    );
}

#[test]
fn test_remote_interest_tracks_each_peer() {
    let store = Arc::new(MemoryStore::with_feeds([Feed::resolved("K", FeedType::Tcp, "h", "1")]));
    let (engine, _) = engine(store);

    engine.handle("B", Envelope::declare("K", false)).unwrap();
    engine.handle("A", Envelope::declare("K", true)).unwrap();
    engine.handle("B", Envelope::declare("K", true)).unwrap();

    assert_eq!(
        engine.remote_interest("K"),
        vec![("A".to_string(), true), ("B".to_string(), true)]
    );
    assert!(engine.remote_interest("other").is_empty());
}

// ============================================================================
// PEER LIFECYCLE
// ============================================================================

#[test]
fn test_end_before_answers_waits() {
    let (engine, _) = engine(Arc::new(MemoryStore::new()));
    engine.begin_phase_one("A").unwrap();
    engine.declarations_sent("A").unwrap();

    engine.handle("A", Envelope::declare("K", false)).unwrap();
    engine.handle("A", Envelope::end_phase_one()).unwrap();
    assert_eq!(engine.phase("A"), PeerSyncPhase::AwaitingAnswers);

    let answer = Envelope::AnswerFeedQuery {
        feed_key: "K".into(),
        subscribed: false,
        host: "h".into(),
        port: "1".into(),
        feed_type: FeedType::Tcp,
    };
    engine.handle("A", answer).unwrap();
    assert_eq!(engine.phase("A"), PeerSyncPhase::PhaseOneComplete);
}

#[test]
fn test_forget_peer_drops_pending_inquiries() {
    let (engine, _) = engine(Arc::new(MemoryStore::new()));
    engine.handle("A", Envelope::declare("K", false)).unwrap();
    assert_eq!(engine.pending_inquiries("A"), vec!["K".to_string()]);

    engine.forget_peer("A");

    assert!(engine.pending_inquiries("A").is_empty());
    assert_eq!(engine.phase("A"), PeerSyncPhase::NotStarted);
    // A later session may inquire again
    assert_eq!(
        engine.handle("B", Envelope::declare("K", false)).unwrap(),
        vec![Envelope::inquire("K")]
    );
}

#[test]
fn test_declarations_cover_every_resolved_feed() {
    let store = Arc::new(MemoryStore::with_feeds([
        Feed::resolved("a", FeedType::Udp, "h", "2"),
        Feed::resolved("b", FeedType::Tcp, "h", "1").with_subscribed(true),
        Feed::known("c"),
    ]));
    let (engine, _) = engine(store);

    let out = engine.begin_phase_one("A").unwrap();

    assert_eq!(engine.phase("A"), PeerSyncPhase::DeclaringKnownFeeds);
    assert_eq!(
        out,
        vec![
            Envelope::declare("a", false),
            Envelope::declare("b", true),
            Envelope::end_phase_one(),
        ]
    );
}

// ============================================================================
// LOCAL INTEREST
// ============================================================================

#[test]
fn test_subscribe_and_unsubscribe() {
    let store = Arc::new(MemoryStore::with_feeds([Feed::known("K")]));
    let (engine, _) = engine(store.clone());

    engine.subscribe("K").unwrap();
    assert!(store.get_feed("K").unwrap().unwrap().subscribed);
    engine.unsubscribe("K").unwrap();
    assert!(!store.get_feed("K").unwrap().unwrap().subscribed);

    assert!(matches!(engine.subscribe("missing"), Err(SyncError::Store(_))));
}
