//! Just enough HTTP/3 framing to pump request streams and datagrams.
//!
//! `web-transport-proto` decodes handshake messages out of a buffer. The readers here pull exactly
//! one frame off a stream, so the DATA frames behind a HEADERS frame stay on the stream for the
//! pumps. They also tell a clean FIN at a frame boundary apart from a truncated frame by
//! returning `Ok(None)`, which is how the last DATA frame gets its `stream_ended`.

use bytes::Bytes;
use web_transport_proto::VarInt;

use crate::ReadError;

/// HTTP/3 DATA frame type.
pub const FRAME_DATA: u64 = 0x00;

/// Capsule type of CLOSE_WEBTRANSPORT_SESSION. Its varint encoding starts with `0x68 0x43`.
pub const CAPSULE_CLOSE_SESSION: u64 = 0x2843;

/// Request streams carry small capsules; anything beyond this is not an echo client.
pub const MAX_FRAME_SIZE: u64 = 1 << 20;

/// Appends a QUIC variable-length integer.
///
/// Everything encoded here is a stream id, a frame type or a length, all of which are varints already.
pub fn encode_varint(value: u64, buf: &mut Vec<u8>) {
    VarInt::try_from(value)
        .expect("value fits in a varint")
        .encode(buf);
}

/// Reads a QUIC variable-length integer, or `None` if the stream finished cleanly first.
pub async fn read_varint(recv: &mut quinn::RecvStream) -> Result<Option<u64>, ReadError> {
    let mut buf = [0u8; VarInt::MAX_SIZE];
    match recv.read(&mut buf[..1]).await? {
        Some(1) => {}
        _ => return Ok(None),
    }

    // The two high bits of the first byte give the encoded size.
    let size = 1usize << (buf[0] >> 6);
    recv.read_exact(&mut buf[1..size]).await?;

    let value = VarInt::decode(&mut &buf[..size]).map_err(|_| ReadError::UnexpectedEnd)?;
    Ok(Some(value.into_inner()))
}

/// A single HTTP/3 frame read off a request stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub typ: u64,
    pub payload: Bytes,
}

impl Frame {
    /// Reads the next frame, or `None` if the stream finished cleanly at a frame boundary.
    pub async fn read(recv: &mut quinn::RecvStream) -> Result<Option<Self>, ReadError> {
        let Some(typ) = read_varint(recv).await? else {
            return Ok(None);
        };

        let len = read_varint(recv).await?.ok_or(ReadError::UnexpectedEnd)?;
        if len > MAX_FRAME_SIZE {
            return Err(ReadError::FrameTooLarge(len));
        }

        let mut payload = vec![0u8; len as usize];
        recv.read_exact(&mut payload).await?;

        Ok(Some(Self {
            typ,
            payload: payload.into(),
        }))
    }

    /// Encodes the frame back into its type-length-value form.
    ///
    /// A capsule and a frame share that layout, so a capsule written straight onto the stream
    /// reads back as a frame of the capsule's type and re-encodes to the original bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = Vec::with_capacity(self.payload.len() + 16);
        encode_varint(self.typ, &mut buf);
        encode_varint(self.payload.len() as u64, &mut buf);
        buf.extend_from_slice(&self.payload);
        buf.into()
    }
}
