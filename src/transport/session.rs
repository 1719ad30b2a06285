// Transport Session
// One connected byte stream plus its lifecycle. `close()` is the only way to
// cancel: every pending read or write on the session returns `Closed`, and
// the stream itself is dropped as soon as no operation holds it, so the
// remote sees end of stream without waiting for the session to be dropped.

use crate::transport::{ConnectionId, TransportError};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tracing::debug;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A connected stream to one remote
pub struct TransportSession {
    id: ConnectionId,
    remote_address: String,
    // Both halves are taken on close; the stream goes away with the second
    reader: Mutex<Option<BoxedReader>>,
    writer: Mutex<Option<BoxedWriter>>,
    closed: watch::Sender<bool>,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl TransportSession {
    /// Wrap an already connected stream
    pub fn new<S>(stream: S, remote_address: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (closed, _) = watch::channel(false);

        Self {
            id: ConnectionId::generate(),
            remote_address: remote_address.into(),
            reader: Mutex::new(Some(Box::new(reader))),
            writer: Mutex::new(Some(Box::new(writer))),
            closed,
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Identifier of the remote end (stream-transport address)
    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Wait until at least one byte is available. End of stream is reported
    /// as `EndOfStream`, never as `Ok(0)`.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = self
            .guarded(async {
                let mut reader = self.reader.lock().await;
                let reader = reader.as_mut().ok_or(TransportError::Closed)?;
                reader
                    .read(buf)
                    .await
                    .map_err(|e| TransportError::ReceiveFailed(e.to_string()))
            })
            .await?;

        if n == 0 && !buf.is_empty() {
            return Err(TransportError::EndOfStream);
        }
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    /// Fill `buf` completely
    pub async fn read_exact(&self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.guarded(async {
            let mut reader = self.reader.lock().await;
            let reader = reader.as_mut().ok_or(TransportError::Closed)?;
            reader.read_exact(buf).await.map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => TransportError::EndOfStream,
                _ => TransportError::ReceiveFailed(e.to_string()),
            })
        })
        .await?;

        self.bytes_received.fetch_add(buf.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Wait until every byte has been handed to the transport
    pub async fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.guarded(async {
            let mut writer = self.writer.lock().await;
            let writer = writer.as_mut().ok_or(TransportError::Closed)?;
            writer
                .write_all(bytes)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            writer
                .flush()
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        })
        .await?;

        self.bytes_sent.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Close the session. Idempotent and callable from any task; blocked
    /// operations on this session return `Closed` promptly and the stream
    /// is released.
    pub fn close(&self) {
        let was_closed = self.closed.send_replace(true);
        if !was_closed {
            debug!(
                connection = %self.id,
                remote = %self.remote_address,
                sent = self.bytes_sent(),
                received = self.bytes_received(),
                "transport session closed"
            );
        }
        self.release();
    }

    /// Drop whichever stream halves no operation is holding. A half that is
    /// busy is dropped by its operation on the way out.
    fn release(&self) {
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }

    async fn guarded<T, F>(&self, op: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        let closed = self.closed.subscribe();
        if *closed.borrow() {
            self.release();
            return Err(TransportError::Closed);
        }

        let result = tokio::select! {
            biased;
            _ = wait_closed(closed) => Err(TransportError::Closed),
            result = op => result,
        };

        // The op and its lock guard are gone by now
        if self.is_closed() {
            self.release();
        }
        result
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("id", &self.id)
            .field("remote_address", &self.remote_address)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}
