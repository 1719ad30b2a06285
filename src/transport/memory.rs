// In-Memory Transport
// Loopback stream transport over tokio duplex pipes. Addresses are plain
// strings registered in a shared `MemoryNetwork`.

use crate::transport::{Listener, StreamTransport, TransportError, TransportSession};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

const PIPE_CAPACITY: usize = 64 * 1024;
const BACKLOG: usize = 16;

type Inbound = (DuplexStream, String);

/// Registry of listening addresses shared by every transport in one test
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    listeners: Arc<Mutex<HashMap<String, mpsc::Sender<Inbound>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport for the device reachable at `local_address`
    pub fn transport(&self, local_address: &str) -> MemoryTransport {
        MemoryTransport {
            network: self.clone(),
            local_address: local_address.to_string(),
        }
    }

    fn is_listening(&self, address: &str) -> bool {
        self.listeners
            .lock()
            .map(|l| l.get(address).is_some_and(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }
}

/// One device's view of a `MemoryNetwork`
#[derive(Clone)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    local_address: String,
}

impl MemoryTransport {
    pub fn local_address(&self) -> &str {
        &self.local_address
    }
}

#[async_trait]
impl StreamTransport for MemoryTransport {
    async fn listen(&self) -> Result<Box<dyn Listener>, TransportError> {
        if self.network.is_listening(&self.local_address) {
            return Err(TransportError::BindFailed(format!(
                "{} already has a listener",
                self.local_address
            )));
        }

        let (tx, rx) = mpsc::channel(BACKLOG);
        self.network
            .listeners
            .lock()
            .map_err(|_| TransportError::BindFailed("network registry poisoned".to_string()))?
            .insert(self.local_address.clone(), tx);

        Ok(Box::new(MemoryListener {
            network: self.network.clone(),
            local_address: self.local_address.clone(),
            inbound: rx,
        }))
    }

    async fn connect(&self, remote_address: &str) -> Result<TransportSession, TransportError> {
        let sender = self
            .network
            .listeners
            .lock()
            .map_err(|_| TransportError::ConnectionFailed("network registry poisoned".to_string()))?
            .get(remote_address)
            .cloned()
            .ok_or_else(|| {
                TransportError::ConnectionFailed(format!("no listener at {}", remote_address))
            })?;

        let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
        sender
            .send((remote, self.local_address.clone()))
            .await
            .map_err(|_| {
                TransportError::ConnectionFailed(format!(
                    "listener at {} went away",
                    remote_address
                ))
            })?;

        Ok(TransportSession::new(local, remote_address))
    }
}

struct MemoryListener {
    network: MemoryNetwork,
    local_address: String,
    inbound: mpsc::Receiver<Inbound>,
}

#[async_trait]
impl Listener for MemoryListener {
    async fn accept(&mut self) -> Result<TransportSession, TransportError> {
        let (stream, remote) = self.inbound.recv().await.ok_or(TransportError::Closed)?;
        Ok(TransportSession::new(stream, remote))
    }

    fn local_address(&self) -> String {
        self.local_address.clone()
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.inbound.close();
        if let Ok(mut listeners) = self.network.listeners.lock() {
            if listeners.get(&self.local_address).is_some_and(|tx| tx.is_closed()) {
                listeners.remove(&self.local_address);
            }
        }
    }
}
