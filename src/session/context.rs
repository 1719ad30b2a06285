// Collaborators shared by every session of one node

use crate::config::FeedsyncConfig;
use crate::events::{EventSink, HandoffSink, LogHandoff};
use crate::identity::KeyMaterialSource;
use crate::storage::Store;
use crate::sync::FeedSyncEngine;
use std::sync::Arc;

pub struct SessionContext {
    store: Arc<dyn Store>,
    keys: Arc<dyn KeyMaterialSource>,
    handoff: Arc<dyn HandoffSink>,
    events: EventSink,
    engine: Arc<FeedSyncEngine>,
    config: FeedsyncConfig,
}

impl SessionContext {
    /// Context with logging-only handoff and no event listener
    pub fn new(
        store: Arc<dyn Store>,
        keys: Arc<dyn KeyMaterialSource>,
        config: FeedsyncConfig,
    ) -> Self {
        let events = EventSink::disabled();
        let engine = Arc::new(FeedSyncEngine::new(
            store.clone(),
            events.clone(),
            config.sync.clone(),
        ));
        Self {
            store,
            keys,
            handoff: Arc::new(LogHandoff),
            events,
            engine,
            config,
        }
    }

    /// Route events to `events`. Rebuilds the sync engine, so call before
    /// any session starts.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.engine = Arc::new(FeedSyncEngine::new(
            self.store.clone(),
            events.clone(),
            self.config.sync.clone(),
        ));
        self.events = events;
        self
    }

    pub fn with_handoff(mut self, handoff: Arc<dyn HandoffSink>) -> Self {
        self.handoff = handoff;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn keys(&self) -> &dyn KeyMaterialSource {
        self.keys.as_ref()
    }

    pub fn handoff(&self) -> &dyn HandoffSink {
        self.handoff.as_ref()
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn engine(&self) -> &Arc<FeedSyncEngine> {
        &self.engine
    }

    pub fn config(&self) -> &FeedsyncConfig {
        &self.config
    }
}
