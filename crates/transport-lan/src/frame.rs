//! Length-prefixed frames carried over a link.
//!
//! Each frame is a u32 BE length followed by a bincode body.

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Sanity cap to prevent memory exhaustion.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// First frame from the requester.
    Hello {
        endpoint_id: String,
        name: String,
        service_id: String,
    },
    Accept,
    Reject,
    /// Announces a payload: file name, size in bytes.
    PayloadHeader {
        payload_id: i64,
        name: String,
        size: u64,
    },
    Chunk {
        payload_id: i64,
        data: Vec<u8>,
    },
    /// Hex SHA-256 of the whole payload.
    PayloadEnd {
        payload_id: i64,
        sha256: String,
    },
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("frame too large: {0} bytes")]
    TooLarge(usize),
}

pub async fn write_frame<T: AsyncWrite + Unpin + Send>(
    transport: &mut T,
    frame: &Frame,
) -> Result<(), FrameError> {
    let body = bincode::serialize(frame)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(body.len()));
    }

    transport.write_all(&(body.len() as u32).to_be_bytes()).await?;
    transport.write_all(&body).await?;
    transport.flush().await?;
    Ok(())
}

/// Read the next frame. `Ok(None)` means the peer closed the stream cleanly
/// between frames.
pub async fn read_frame<T: AsyncRead + Unpin + Send>(
    transport: &mut T,
) -> Result<Option<Frame>, FrameError> {
    let mut lenb = [0u8; 4];
    match transport.read_exact(&mut lenb).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(lenb) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }

    let mut buf = vec![0u8; len];
    transport.read_exact(&mut buf).await?;
    Ok(Some(bincode::deserialize(&buf)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_a_stream_in_order() {
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);

        let hello = Frame::Hello {
            endpoint_id: "3F2A".into(),
            name: "Pixel: 7a".into(),
            service_id: "dev.handoff.relay".into(),
        };
        let chunk = Frame::Chunk {
            payload_id: 42,
            data: vec![9u8; 1000],
        };
        write_frame(&mut a, &hello).await.unwrap();
        write_frame(&mut a, &chunk).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b).await.unwrap(), Some(hello));
        assert_eq!(read_frame(&mut b).await.unwrap(), Some(chunk));
        assert_eq!(read_frame(&mut b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_length_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes()).await.unwrap();

        match read_frame(&mut b).await {
            Err(FrameError::TooLarge(len)) => assert_eq!(len, MAX_FRAME_LEN + 1),
            other => panic!("expected TooLarge, got {:?}", other),
        }
    }
}
