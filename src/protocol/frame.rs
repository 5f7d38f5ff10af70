//! Length-delimited JSON framing
//!
//! ```text
//! +----------------+---------------------------+
//! | len: u32 (BE)  | body: len bytes of JSON   |
//! +----------------+---------------------------+
//! ```
//!
//! The reader keeps partial frames in its buffer between calls, so
//! [`FrameReader::read`] is safe to use inside `tokio::select!`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::{FRAME_HEADER_LEN, MAX_FRAME_SIZE, READ_BUFFER_SIZE};
use super::error::ProtocolError;

/// Append one encoded frame to `dst`
pub fn encode_frame<T: Serialize>(
    msg: &T,
    max_frame_size: usize,
    dst: &mut BytesMut,
) -> Result<(), ProtocolError> {
    let body = serde_json::to_vec(msg)?;
    if body.len() > max_frame_size || body.len() > u32::MAX as usize {
        return Err(ProtocolError::FrameTooLarge {
            len: body.len(),
            max: max_frame_size,
        });
    }

    dst.reserve(FRAME_HEADER_LEN + body.len());
    dst.put_u32(body.len() as u32);
    dst.put_slice(&body);
    Ok(())
}

/// Split one complete frame body off the front of `src`
///
/// Returns `Ok(None)` if `src` does not hold a complete frame yet. A declared
/// length above `max_frame_size` is rejected before its body arrives.
pub fn try_split_frame(
    src: &mut BytesMut,
    max_frame_size: usize,
) -> Result<Option<Bytes>, ProtocolError> {
    if src.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }

    let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if len > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: max_frame_size,
        });
    }

    if src.len() < FRAME_HEADER_LEN + len {
        src.reserve(FRAME_HEADER_LEN + len - src.len());
        return Ok(None);
    }

    src.advance(FRAME_HEADER_LEN);
    Ok(Some(src.split_to(len).freeze()))
}

/// Decode a frame body
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(body)?)
}

/// Reads framed messages from a byte stream
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_frame_size(inner, MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(inner: R, max_frame_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            max_frame_size,
        }
    }

    /// Read the next message
    ///
    /// Returns `Ok(None)` on a clean end of stream between frames.
    pub async fn read<T: DeserializeOwned>(&mut self) -> Result<Option<T>, ProtocolError> {
        loop {
            if let Some(body) = try_split_frame(&mut self.buf, self.max_frame_size)? {
                return decode_body(&body).map(Some);
            }

            if self.inner.read_buf(&mut self.buf).await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::UnexpectedEof);
            }
        }
    }
}

/// Writes framed messages to a byte stream
pub struct FrameWriter<W> {
    inner: W,
    buf: BytesMut,
    max_frame_size: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_max_frame_size(inner, MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(inner: W, max_frame_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            max_frame_size,
        }
    }

    /// Encode and flush one message
    pub async fn write<T: Serialize>(&mut self, msg: &T) -> Result<(), ProtocolError> {
        self.buf.clear();
        encode_frame(msg, self.max_frame_size, &mut self.buf)?;
        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the write side
    pub async fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{Request, Response};
    use crate::protocol::status::StatusCode;

    #[test]
    fn test_split_waits_for_complete_frame() {
        let mut encoded = BytesMut::new();
        encode_frame(&Response::Ack, MAX_FRAME_SIZE, &mut encoded).unwrap();
        let full = encoded.clone();

        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        assert!(try_split_frame(&mut partial, MAX_FRAME_SIZE).unwrap().is_none());

        partial.put_slice(&full[full.len() - 1..]);
        let body = try_split_frame(&mut partial, MAX_FRAME_SIZE).unwrap().unwrap();
        assert_eq!(&body[..], br#"{"type":"ack"}"#);
        assert!(partial.is_empty());
    }

    #[test]
    fn test_oversize_header_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(64);
        buf.put_slice(b"{}");

        assert!(matches!(
            try_split_frame(&mut buf, 16),
            Err(ProtocolError::FrameTooLarge { len: 64, max: 16 })
        ));
    }

    #[test]
    fn test_oversize_encode_rejected() {
        let mut buf = BytesMut::new();
        let msg = Response::status(StatusCode::Internal, "x".repeat(64));

        assert!(matches!(
            encode_frame(&msg, 16, &mut buf),
            Err(ProtocolError::FrameTooLarge { max: 16, .. })
        ));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_reader_yields_frames_in_order() {
        let mut wire = BytesMut::new();
        encode_frame(
            &Request::Subscribe {
                token: "a".into(),
            },
            MAX_FRAME_SIZE,
            &mut wire,
        )
        .unwrap();
        encode_frame(
            &Request::MarkOpened {
                token: "a".into(),
                id: 1,
                opened: true,
            },
            MAX_FRAME_SIZE,
            &mut wire,
        )
        .unwrap();

        let mut reader = FrameReader::new(&wire[..]);
        assert_eq!(reader.read::<Request>().await.unwrap().unwrap().op(), "subscribe");
        assert_eq!(reader.read::<Request>().await.unwrap().unwrap().op(), "mark_opened");
        assert!(reader.read::<Request>().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_truncated_frame() {
        let mut wire = BytesMut::new();
        encode_frame(&Response::Ack, MAX_FRAME_SIZE, &mut wire).unwrap();
        wire.truncate(wire.len() - 2);

        let mut reader = FrameReader::new(&wire[..]);
        assert!(matches!(
            reader.read::<Response>().await,
            Err(ProtocolError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_reader_malformed_body() {
        let mut wire = BytesMut::new();
        wire.put_u32(5);
        wire.put_slice(b"nope!");

        let mut reader = FrameReader::new(&wire[..]);
        assert!(matches!(
            reader.read::<Request>().await,
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_writer_reader_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server);

        let sent = Response::Page {
            notifications: Vec::new(),
            next_before: Some(9),
        };
        let write = tokio::spawn(async move {
            writer.write(&sent).await.unwrap();
        });

        let received: Response = reader.read().await.unwrap().unwrap();
        write.await.unwrap();
        assert_eq!(
            received,
            Response::Page {
                notifications: Vec::new(),
                next_before: Some(9),
            }
        );
    }
}
