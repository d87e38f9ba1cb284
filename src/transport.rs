use std::{collections::HashMap, future::Future};

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use web_transport_proto::StreamUni;

use crate::{connect, frame::encode_varint, SessionId, StreamId, TransportError};

/// The outbound half of the transport, as seen by the handshake, router and echo handlers.
///
/// Every operation may wait on transport flow control and nothing else.
pub trait Transport {
    /// Sends a HEADERS response on a request stream, finishing the stream if `end_stream`.
    fn send_response(
        &mut self,
        stream_id: StreamId,
        status: StatusCode,
        end_stream: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Opens a unidirectional stream bound to `session_id`.
    fn open_uni(
        &mut self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<StreamId, TransportError>> + Send;

    /// Writes to a stream opened with [`Transport::open_uni`], finishing it if `end_stream`.
    fn send_stream_data(
        &mut self,
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Abandons a stream opened with [`Transport::open_uni`] with a WebTransport error code.
    fn reset_stream(&mut self, stream_id: StreamId, code: u32) -> Result<(), TransportError>;

    /// Queues an HTTP datagram for `session_id`.
    fn send_datagram(&mut self, session_id: SessionId, data: Bytes) -> Result<(), TransportError>;

    /// Pushes queued datagrams out.
    fn flush(&mut self) -> impl Future<Output = ()> + Send;
}

/// A [`Transport`] over a quinn connection.
///
/// Request streams are registered by the supervisor as they are accepted; outbound
/// streams are tracked from `open_uni` until the write that finishes them.
pub struct QuicTransport {
    conn: quinn::Connection,
    requests: HashMap<StreamId, quinn::SendStream>,
    outbound: HashMap<StreamId, quinn::SendStream>,
}

impl QuicTransport {
    pub fn new(conn: quinn::Connection) -> Self {
        Self {
            conn,
            requests: HashMap::new(),
            outbound: HashMap::new(),
        }
    }

    /// Keeps the send half of a request stream so it can be responded to.
    pub fn register_request(&mut self, stream_id: StreamId, send: quinn::SendStream) {
        self.requests.insert(stream_id, send);
    }
}

impl Transport for QuicTransport {
    async fn send_response(
        &mut self,
        stream_id: StreamId,
        status: StatusCode,
        end_stream: bool,
    ) -> Result<(), TransportError> {
        let send = self
            .requests
            .get_mut(&stream_id)
            .ok_or(TransportError::UnknownStream(stream_id))?;

        let res = connect::write_response(send, status, end_stream).await;

        // An accepted session keeps its CONNECT stream open until the connection goes away.
        if end_stream || res.is_err() {
            self.requests.remove(&stream_id);
        }

        Ok(res?)
    }

    async fn open_uni(&mut self, session_id: SessionId) -> Result<StreamId, TransportError> {
        let mut send = self.conn.open_uni().await?;

        // Each stream starts with its type and the session it belongs to.
        let mut header = Vec::new();
        StreamUni::WEBTRANSPORT.encode(&mut header);
        encode_varint(session_id.0, &mut header);
        write_full_with_max_prio(&mut send, &header).await?;

        let stream_id = StreamId::from(send.id());
        self.outbound.insert(stream_id, send);

        Ok(stream_id)
    }

    async fn send_stream_data(
        &mut self,
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
    ) -> Result<(), TransportError> {
        let send = self
            .outbound
            .get_mut(&stream_id)
            .ok_or(TransportError::UnknownStream(stream_id))?;

        let mut res = send.write_chunk(data).await.map_err(TransportError::from);
        if res.is_ok() && end_stream {
            res = send.finish().map_err(TransportError::from);
        }

        if end_stream || res.is_err() {
            self.outbound.remove(&stream_id);
        }

        res
    }

    fn reset_stream(&mut self, stream_id: StreamId, code: u32) -> Result<(), TransportError> {
        let mut send = self
            .outbound
            .remove(&stream_id)
            .ok_or(TransportError::UnknownStream(stream_id))?;

        // WebTransport error codes are mapped into a reserved range of HTTP/3 codes.
        let code = web_transport_proto::error_to_http3(code);
        let code = quinn::VarInt::from_u64(code).expect("mapped error code fits in a varint");
        send.reset(code)?;

        Ok(())
    }

    fn send_datagram(&mut self, session_id: SessionId, data: Bytes) -> Result<(), TransportError> {
        // Unfortunately, we need to allocate/copy each datagram because of the Quinn API.
        let mut header = Vec::new();
        encode_varint(session_id.quarter_stream_id(), &mut header);

        let mut buf = BytesMut::with_capacity(header.len() + data.len());
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&data);

        self.conn.send_datagram(buf.freeze())?;
        Ok(())
    }

    async fn flush(&mut self) {
        // quinn transmits from its connection driver; yield so it runs before the next event.
        tokio::task::yield_now().await;
    }
}

async fn write_full_with_max_prio(
    send: &mut quinn::SendStream,
    buf: &[u8],
) -> Result<(), TransportError> {
    // Set the stream priority to max and then write the stream header.
    // Otherwise the echo payload could be queued ahead of the header.
    send.set_priority(i32::MAX).ok();
    let res = send.write_all(buf).await.map_err(TransportError::from);
    // Reset the stream priority back to the default of 0.
    send.set_priority(0).ok();
    res
}
