// Transport Session Tests
// Lifecycle and cancellation of a connected stream

use feedsync::transport::{TransportError, TransportSession};
use std::sync::Arc;
use std::time::Duration;

fn pair() -> (TransportSession, TransportSession) {
    let (a, b) = tokio::io::duplex(1024);
    (TransportSession::new(a, "B"), TransportSession::new(b, "A"))
}

// ============================================================================
// CLOSE
// ============================================================================

#[tokio::test]
async fn test_close_is_idempotent() {
    let (session, _remote) = pair();

    session.close();
    session.close();
    session.close();

    assert!(session.is_closed());
    let mut buf = [0u8; 4];
    assert_eq!(session.read(&mut buf).await, Err(TransportError::Closed));
}

#[tokio::test]
async fn test_concurrent_close_from_many_tasks() {
    let (session, _remote) = pair();
    let session = Arc::new(session);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let s = session.clone();
        handles.push(tokio::spawn(async move { s.close() }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(session.is_closed());
}

#[tokio::test]
async fn test_write_after_close_fails() {
    let (session, _remote) = pair();
    session.close();

    assert_eq!(session.write(b"late").await, Err(TransportError::Closed));
}

#[tokio::test]
async fn test_close_unblocks_blocked_write() {
    // Pipe too small for the payload and nobody reading: the write blocks
    let (a, _b) = tokio::io::duplex(8);
    let session = Arc::new(TransportSession::new(a, "B"));

    let writer = session.clone();
    let pending = tokio::spawn(async move { writer.write(&[0u8; 4096]).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    session.close();

    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result, Err(TransportError::Closed));
}

#[tokio::test]
async fn test_remote_sees_end_of_stream_after_drop() {
    let (session, remote) = pair();
    drop(session);

    let mut buf = [0u8; 4];
    assert_eq!(remote.read(&mut buf).await, Err(TransportError::EndOfStream));
}

#[tokio::test]
async fn test_close_releases_stream_while_session_alive() {
    let (session, remote) = pair();

    session.close();

    let mut buf = [0u8; 4];
    let result = tokio::time::timeout(Duration::from_secs(1), remote.read(&mut buf))
        .await
        .unwrap();
    assert_eq!(result, Err(TransportError::EndOfStream));
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_close_during_blocked_read_releases_stream() {
    let (session, remote) = pair();
    let session = Arc::new(session);

    let reader = session.clone();
    let pending = tokio::spawn(async move {
        let mut buf = [0u8; 4];
        reader.read(&mut buf).await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The reader half is busy here; the read drops it on the way out
    session.close();
    assert_eq!(pending.await.unwrap(), Err(TransportError::Closed));

    let mut buf = [0u8; 4];
    let result = tokio::time::timeout(Duration::from_secs(1), remote.read(&mut buf))
        .await
        .unwrap();
    assert_eq!(result, Err(TransportError::EndOfStream));
}

#[tokio::test]
async fn test_bytes_written_before_close_still_arrive() {
    let (session, remote) = pair();

    session.write(b"last").await.unwrap();
    session.close();

    let mut buf = [0u8; 4];
    remote.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"last");
    assert_eq!(remote.read(&mut buf).await, Err(TransportError::EndOfStream));
}

// ============================================================================
// READS AND WRITES
// ============================================================================

#[tokio::test]
async fn test_read_exact_spans_writes() {
    let (left, right) = pair();

    left.write(b"ab").await.unwrap();
    left.write(b"cd").await.unwrap();

    let mut buf = [0u8; 4];
    right.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"abcd");
}

#[tokio::test]
async fn test_sessions_have_distinct_ids() {
    let (left, right) = pair();
    assert_ne!(left.id(), right.id());
    assert_eq!(left.remote_address(), "B");
}
