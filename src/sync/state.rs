// Per-peer synchronization bookkeeping

use std::collections::{BTreeMap, HashMap, HashSet};

/// Phase-one progress with one peer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PeerSyncPhase {
    #[default]
    NotStarted,
    /// Our declarations are being sent
    DeclaringKnownFeeds,
    /// Our declarations are out; waiting for the remote's END_PHASE_ONE or
    /// for answers to our inquiries
    AwaitingAnswers,
    /// Remote finished declaring and every inquiry to it was answered
    PhaseOneComplete,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct PeerSync {
    pub phase: PeerSyncPhase,
    pub remote_finished: bool,
}

/// Statistics about the sync engine
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub declarations_sent: u64,
    pub declarations_received: u64,
    pub inquiries_sent: u64,
    pub inquiries_answered: u64,
    pub inquiries_dropped: u64,
    pub answers_received: u64,
    pub unsolicited_answers: u64,
}

/// Everything the engine tracks in memory, behind one lock
#[derive(Default)]
pub(crate) struct SyncBook {
    pub peers: HashMap<String, PeerSync>,
    /// Outstanding inquiries as (peer address, feed key)
    pub pending: HashSet<(String, String)>,
    /// Remote interest per feed key: peer address -> subscribed
    pub interest: HashMap<String, BTreeMap<String, bool>>,
    pub stats: SyncStats,
}

impl SyncBook {
    pub fn peer_mut(&mut self, address: &str) -> &mut PeerSync {
        self.peers.entry(address.to_string()).or_default()
    }

    pub fn phase(&self, address: &str) -> PeerSyncPhase {
        self.peers.get(address).map(|p| p.phase).unwrap_or_default()
    }

    pub fn record_interest(&mut self, key: &str, peer: &str, subscribed: bool) {
        self.interest
            .entry(key.to_string())
            .or_default()
            .insert(peer.to_string(), subscribed);
    }

    pub fn has_pending_for(&self, peer: &str) -> bool {
        self.pending.iter().any(|(p, _)| p == peer)
    }

    pub fn key_is_pending(&self, key: &str) -> bool {
        self.pending.iter().any(|(_, k)| k == key)
    }

    /// Move the peer to `PhaseOneComplete` when its conditions hold, or
    /// back to `AwaitingAnswers` when a later inquiry reopened the round.
    /// Returns true on the transition into `PhaseOneComplete`.
    pub fn refresh_phase(&mut self, address: &str) -> bool {
        let waiting = self.has_pending_for(address);
        let Some(peer) = self.peers.get_mut(address) else {
            return false;
        };

        match peer.phase {
            PeerSyncPhase::AwaitingAnswers if peer.remote_finished && !waiting => {
                peer.phase = PeerSyncPhase::PhaseOneComplete;
                true
            }
            PeerSyncPhase::PhaseOneComplete if waiting => {
                peer.phase = PeerSyncPhase::AwaitingAnswers;
                false
            }
            _ => false,
        }
    }
}
