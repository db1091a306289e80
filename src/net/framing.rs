//! Inbound message framing
//!
//! Client messages arrive as `[opcode u8][length u8][payload]`. Outbound
//! messages already carry their own opcode and size fields, so they are
//! written to the stream as-is.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload a one-byte length can describe
pub const MAX_FRAME_PAYLOAD: usize = u8::MAX as usize;

/// Errors that can occur during message framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Frame too large: {0} bytes (max {1})")]
    FrameTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One decoded client frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

fn closed_on_eof(e: io::Error) -> FramingError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FramingError::ConnectionClosed
    } else {
        FramingError::Io(e)
    }
}

/// Read one frame from a stream
pub async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Frame, FramingError> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await.map_err(closed_on_eof)?;
    let [opcode, len] = header;

    let mut payload = vec![0u8; len as usize];
    if len > 0 {
        stream.read_exact(&mut payload).await.map_err(closed_on_eof)?;
    }
    Ok(Frame { opcode, payload })
}

/// Write one frame in the inbound format (used by test clients)
pub async fn write_frame<W: AsyncWrite + Unpin>(
    stream: &mut W,
    opcode: u8,
    payload: &[u8],
) -> Result<(), FramingError> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(FramingError::FrameTooLarge(payload.len(), MAX_FRAME_PAYLOAD));
    }
    stream.write_all(&[opcode, payload.len() as u8]).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Write an encoded server message, flushing if asked
pub async fn write_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    data: &[u8],
    flush: bool,
) -> Result<(), FramingError> {
    stream.write_all(data).await?;
    if flush {
        stream.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_write_frame() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, 44, b"\0logout\0").await.unwrap();
        assert_eq!(buffer[..2], [44, 8]);

        let mut cursor = Cursor::new(buffer);
        let frame = read_frame(&mut cursor).await.unwrap();
        assert_eq!(frame.opcode, 44);
        assert_eq!(frame.payload, b"\0logout\0");
    }

    #[tokio::test]
    async fn test_empty_payload() {
        let mut cursor = Cursor::new(vec![7u8, 0]);
        let frame = read_frame(&mut cursor).await.unwrap();
        assert_eq!(frame, Frame { opcode: 7, payload: Vec::new() });
    }

    #[tokio::test]
    async fn test_frame_too_large() {
        let mut buffer = Vec::new();
        let result = write_frame(&mut buffer, 1, &[0u8; MAX_FRAME_PAYLOAD + 1]).await;
        assert!(matches!(result, Err(FramingError::FrameTooLarge(256, 255))));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_read_truncated_header() {
        let mut cursor = Cursor::new(vec![44u8]);
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(FramingError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_read_truncated_payload() {
        let mut cursor = Cursor::new(vec![44u8, 10, 1, 2, 3]);
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(FramingError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_multiple_frames() {
        let frames = vec![(1u8, b"first".to_vec()), (2, Vec::new()), (3, b"third one".to_vec())];

        let mut buffer = Vec::new();
        for (opcode, payload) in &frames {
            write_frame(&mut buffer, *opcode, payload).await.unwrap();
        }

        let mut cursor = Cursor::new(buffer);
        for (opcode, payload) in &frames {
            let frame = read_frame(&mut cursor).await.unwrap();
            assert_eq!(frame.opcode, *opcode);
            assert_eq!(&frame.payload, payload);
        }
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let mut stream = tokio_test::io::Builder::new()
            .read(&[44])
            .read(&[3, 0])
            .read(b"a\0")
            .build();
        let frame = read_frame(&mut stream).await.unwrap();
        assert_eq!(frame, Frame { opcode: 44, payload: vec![0, b'a', 0] });
    }

    #[test]
    fn test_write_message_flushes() {
        let mut stream = tokio_test::io::Builder::new().write(&[72, 0, 0]).build();
        tokio_test::block_on(write_message(&mut stream, &[72, 0, 0], true)).unwrap();
    }

    #[tokio::test]
    async fn test_write_message_is_raw() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, &[58], true).await.unwrap();
        write_message(&mut buffer, &[98, 0, 1], false).await.unwrap();
        assert_eq!(buffer, vec![58, 98, 0, 1]);
    }
}
