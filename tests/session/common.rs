// Shared helpers for session tests

use feedsync::events::{EventSink, Handoff, HandoffSink, LinkEvent};
use feedsync::identity::{KeyBundle, PendingBundle};
use feedsync::storage::{Feed, MemoryStore};
use feedsync::{FeedsyncConfig, SessionContext};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout, Instant};

pub const WAIT: Duration = Duration::from_secs(5);

/// Records every handoff it is given
#[derive(Default)]
pub struct CaptureHandoff {
    seen: Mutex<Vec<Handoff>>,
}

impl CaptureHandoff {
    pub fn seen(&self) -> Vec<Handoff> {
        self.seen.lock().unwrap().clone()
    }
}

impl HandoffSink for CaptureHandoff {
    fn begin_secondary(&self, handoff: Handoff) {
        self.seen.lock().unwrap().push(handoff);
    }
}

/// Everything a test needs to observe one node
pub struct Parts {
    pub ctx: SessionContext,
    pub store: Arc<MemoryStore>,
    pub events: UnboundedReceiver<LinkEvent>,
    pub handoffs: Arc<CaptureHandoff>,
}

pub fn parts(bundle: Option<KeyBundle>, feeds: Vec<Feed>, config: FeedsyncConfig) -> Parts {
    let store = Arc::new(MemoryStore::with_feeds(feeds));
    let keys = match bundle {
        Some(bundle) => PendingBundle::with_bundle(bundle),
        None => PendingBundle::new(),
    };
    let (events, rx) = EventSink::channel();
    let handoffs = Arc::new(CaptureHandoff::default());
    let ctx = SessionContext::new(store.clone(), Arc::new(keys), config)
        .with_events(events)
        .with_handoff(handoffs.clone());
    Parts {
        ctx,
        store,
        events: rx,
        handoffs,
    }
}

/// Wait for the first event matching `pred`, discarding the rest
pub async fn next_matching(
    rx: &mut UnboundedReceiver<LinkEvent>,
    pred: impl Fn(&LinkEvent) -> bool,
) -> LinkEvent {
    timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Collect events until one matches `pred` (inclusive)
pub async fn collect_until(
    rx: &mut UnboundedReceiver<LinkEvent>,
    pred: impl Fn(&LinkEvent) -> bool,
) -> Vec<LinkEvent> {
    timeout(WAIT, async {
        let mut events = Vec::new();
        loop {
            match rx.recv().await {
                Some(event) => {
                    let done = pred(&event);
                    events.push(event);
                    if done {
                        return events;
                    }
                }
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out collecting events")
}

pub async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        sleep(Duration::from_millis(10)).await;
    }
}

pub fn is_closed(event: &LinkEvent) -> bool {
    matches!(event, LinkEvent::SessionClosed { .. })
}

pub fn is_complete(event: &LinkEvent) -> bool {
    matches!(event, LinkEvent::PhaseOneComplete { .. })
}
