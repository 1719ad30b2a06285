// Feed Sync Engine - two-phase feed metadata gossip
//
// Phase one, per authenticated peer:
// - Declare: each side sends DECLARE_FEED_KNOWN for every feed it knows,
//   then END_PHASE_ONE
// - Inquire: keys the receiver has never seen are answered with
//   INQUIRE_FEED_DETAILS
// - Answer: the owner replies ANSWER_FEED_QUERY with type, host and port
//
// The engine is transport-agnostic: `handle` consumes one envelope and
// returns the envelopes to send back on the same session.

use crate::events::{EventSink, LinkEvent};
use crate::storage::{Feed, Store, StoreError};
use crate::sync::state::{PeerSyncPhase, SyncBook, SyncStats};
use crate::wire::Envelope;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

/// Sync-related errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Sync bookkeeping lock poisoned")]
    LockPoisoned,
}

/// Configuration for the sync engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Run phase one on the session once it is Trusted; otherwise the
    /// session is closed after the handoff signal
    pub sync_after_trust: bool,
    /// Inquire about a declared key we know but never resolved, unless an
    /// inquiry for it is already outstanding
    pub reinquire_unresolved: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_after_trust: true,
            reinquire_unresolved: true,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sync_after_trust(mut self, enabled: bool) -> Self {
        self.sync_after_trust = enabled;
        self
    }

    pub fn with_reinquire_unresolved(mut self, enabled: bool) -> Self {
        self.reinquire_unresolved = enabled;
        self
    }
}

/// Shared by every session; all methods take `&self`
pub struct FeedSyncEngine {
    store: Arc<dyn Store>,
    events: EventSink,
    config: SyncConfig,
    book: Mutex<SyncBook>,
}

impl FeedSyncEngine {
    pub fn new(store: Arc<dyn Store>, events: EventSink, config: SyncConfig) -> Self {
        Self {
            store,
            events,
            config,
            book: Mutex::new(SyncBook::default()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn stats(&self) -> SyncStats {
        self.book().map(|b| b.stats.clone()).unwrap_or_default()
    }

    pub fn phase(&self, peer: &str) -> PeerSyncPhase {
        self.book().map(|b| b.phase(peer)).unwrap_or_default()
    }

    /// Feed keys we are still waiting on `peer` to answer, sorted
    pub fn pending_inquiries(&self, peer: &str) -> Vec<String> {
        let Ok(book) = self.book() else {
            return Vec::new();
        };
        let mut keys: Vec<String> = book
            .pending
            .iter()
            .filter(|(p, _)| p == peer)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Peers that declared or answered for `key`, with their subscribed flag
    pub fn remote_interest(&self, key: &str) -> Vec<(String, bool)> {
        let Ok(book) = self.book() else {
            return Vec::new();
        };
        book.interest
            .get(key)
            .map(|peers| peers.iter().map(|(p, s)| (p.clone(), *s)).collect())
            .unwrap_or_default()
    }

    // ========================================================================
    // LOCAL INTEREST
    // ========================================================================

    pub fn subscribe(&self, key: &str) -> Result<(), SyncError> {
        self.store.set_subscribed(key, true)?;
        info!(feed = %key, "subscribed");
        Ok(())
    }

    pub fn unsubscribe(&self, key: &str) -> Result<(), SyncError> {
        self.store.set_subscribed(key, false)?;
        info!(feed = %key, "unsubscribed");
        Ok(())
    }

    // ========================================================================
    // PHASE ONE
    // ========================================================================

    /// Declarations for every locally resolved feed, followed by
    /// END_PHASE_ONE. Call `declarations_sent` once they are on the wire.
    ///
    /// A key we hold without details is not declared: the peer would inquire
    /// and we could not answer, leaving its round open for good.
    pub fn begin_phase_one(&self, peer: &str) -> Result<Vec<Envelope>, SyncError> {
        let (feeds, unresolved): (Vec<Feed>, Vec<Feed>) = self
            .store
            .list_feeds()?
            .into_iter()
            .partition(Feed::is_resolved);

        let mut book = self.book()?;
        book.peer_mut(peer).phase = PeerSyncPhase::DeclaringKnownFeeds;
        book.stats.declarations_sent += feeds.len() as u64;
        drop(book);

        debug!(
            peer = %peer,
            feeds = feeds.len(),
            withheld = unresolved.len(),
            "declaring known feeds"
        );
        let mut out: Vec<Envelope> = feeds
            .iter()
            .map(|feed| Envelope::declare(&feed.key, feed.subscribed))
            .collect();
        out.push(Envelope::end_phase_one());
        Ok(out)
    }

    /// Our declarations reached the wire; completion may now be evaluated
    pub fn declarations_sent(&self, peer: &str) -> Result<(), SyncError> {
        let mut book = self.book()?;
        let state = book.peer_mut(peer);
        if state.phase == PeerSyncPhase::DeclaringKnownFeeds {
            state.phase = PeerSyncPhase::AwaitingAnswers;
        }
        let completed = book.refresh_phase(peer);
        drop(book);

        if completed {
            self.phase_one_complete(peer);
        }
        Ok(())
    }

    /// Process one envelope from `peer`, returning the replies to send
    pub fn handle(&self, peer: &str, envelope: Envelope) -> Result<Vec<Envelope>, SyncError> {
        match envelope {
            Envelope::DeclareFeedKnown { feed_key, subscribed } => {
                self.handle_declare(peer, &feed_key, subscribed)
            }
            Envelope::InquireFeedDetails { feed_key } => self.handle_inquire(peer, &feed_key),
            Envelope::AnswerFeedQuery {
                feed_key,
                subscribed,
                host,
                port,
                feed_type,
            } => {
                let details = Feed::resolved(&feed_key, feed_type, &host, &port);
                self.handle_answer(peer, details, subscribed)?;
                Ok(Vec::new())
            }
            Envelope::EndPhaseOne {} => {
                self.handle_end(peer)?;
                Ok(Vec::new())
            }
        }
    }

    /// Drop bookkeeping for a peer whose session ended. Outstanding
    /// inquiries are abandoned; recorded interest is kept.
    pub fn forget_peer(&self, peer: &str) {
        if let Ok(mut book) = self.book() {
            book.pending.retain(|(p, _)| p != peer);
            book.peers.remove(peer);
        }
    }

    fn handle_declare(
        &self,
        peer: &str,
        key: &str,
        subscribed: bool,
    ) -> Result<Vec<Envelope>, SyncError> {
        let created = self.store.insert_feed_if_absent(&Feed::known(key))?;
        let unresolved = !created
            && self.config.reinquire_unresolved
            && self
                .store
                .get_feed(key)?
                .is_some_and(|feed| !feed.is_resolved());

        let mut book = self.book()?;
        book.stats.declarations_received += 1;
        book.record_interest(key, peer, subscribed);
        book.peer_mut(peer);

        let inquire = created || (unresolved && !book.key_is_pending(key));
        if inquire {
            book.pending.insert((peer.to_string(), key.to_string()));
            book.stats.inquiries_sent += 1;
            book.refresh_phase(peer);
        }
        drop(book);

        if created {
            debug!(peer = %peer, feed = %key, "learned feed key");
            self.events.emit(LinkEvent::FeedUpdated {
                key: key.to_string(),
                from: peer.to_string(),
            });
        }
        if inquire {
            Ok(vec![Envelope::inquire(key)])
        } else {
            Ok(Vec::new())
        }
    }

    fn handle_inquire(&self, peer: &str, key: &str) -> Result<Vec<Envelope>, SyncError> {
        let answer = self.store.get_feed(key)?.and_then(|feed| Envelope::answer(&feed));

        let mut book = self.book()?;
        match answer {
            Some(answer) => {
                book.stats.inquiries_answered += 1;
                Ok(vec![answer])
            }
            None => {
                book.stats.inquiries_dropped += 1;
                debug!(peer = %peer, feed = %key, "no details to answer inquiry with");
                Ok(Vec::new())
            }
        }
    }

    fn handle_answer(&self, peer: &str, details: Feed, subscribed: bool) -> Result<(), SyncError> {
        let key = details.key.clone();
        self.store.upsert_feed(&details)?;

        let mut book = self.book()?;
        book.stats.answers_received += 1;
        let solicited = book.pending.remove(&(peer.to_string(), key.clone()));
        if !solicited {
            book.stats.unsolicited_answers += 1;
            debug!(peer = %peer, feed = %key, "unsolicited answer accepted");
        }
        book.record_interest(&key, peer, subscribed);
        let completed = book.refresh_phase(peer);
        drop(book);

        info!(peer = %peer, feed = %key, "feed details updated");
        self.events.emit(LinkEvent::FeedUpdated {
            key,
            from: peer.to_string(),
        });
        if completed {
            self.phase_one_complete(peer);
        }
        Ok(())
    }

    fn handle_end(&self, peer: &str) -> Result<(), SyncError> {
        let mut book = self.book()?;
        book.peer_mut(peer).remote_finished = true;
        let completed = book.refresh_phase(peer);
        drop(book);

        debug!(peer = %peer, "remote finished declaring");
        if completed {
            self.phase_one_complete(peer);
        }
        Ok(())
    }

    fn phase_one_complete(&self, peer: &str) {
        info!(peer = %peer, "phase one complete");
        self.events.emit(LinkEvent::PhaseOneComplete {
            address: peer.to_string(),
        });
    }

    fn book(&self) -> Result<MutexGuard<'_, SyncBook>, SyncError> {
        self.book.lock().map_err(|_| SyncError::LockPoisoned)
    }
}
