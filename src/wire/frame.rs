//! Framing: 4-byte little-endian length prefix followed by the payload.

use crate::transport::{TransportError, TransportSession};

/// Size of the length prefix
pub const LEN_SIZE: usize = 4;

/// Encode a payload into a single frame.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Interpret the first four bytes as the payload length.
pub fn frame_len(prefix: [u8; LEN_SIZE]) -> usize {
    u32::from_le_bytes(prefix) as usize
}

/// Decode one frame from the front of `bytes`. Returns the payload and the
/// number of bytes consumed; `NeedMore` if the buffer holds a partial frame.
pub fn decode_frame(bytes: &[u8], max_len: usize) -> Result<(&[u8], usize), FrameError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameError::NeedMore);
    }
    let len = frame_len([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if len > max_len {
        return Err(FrameError::TooLarge { len, max: max_len });
    }
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameError::NeedMore);
    }
    Ok((&bytes[LEN_SIZE..LEN_SIZE + len], LEN_SIZE + len))
}

/// Error decoding a frame
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame of {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },
}

/// Send one length-prefixed frame.
pub async fn write_frame(session: &TransportSession, payload: &[u8]) -> Result<(), TransportError> {
    let frame = encode_frame(payload).map_err(|e| TransportError::SendFailed(e.to_string()))?;
    session.write(&frame).await
}

/// Read one length-prefixed frame. An oversized prefix is a transport error:
/// the stream cannot be resynchronised after it.
pub async fn read_frame(
    session: &TransportSession,
    max_len: usize,
) -> Result<Vec<u8>, TransportError> {
    let mut prefix = [0u8; LEN_SIZE];
    session.read_exact(&mut prefix).await?;

    let len = frame_len(prefix);
    if len > max_len {
        return Err(TransportError::FrameTooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    session.read_exact(&mut payload).await?;
    Ok(payload)
}
