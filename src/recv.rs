use std::io::Cursor;

use bytes::Bytes;
use tokio::sync::mpsc;
use web_transport_proto::VarInt;

use crate::{
    frame::read_varint,
    supervisor::Inbound,
    Event, ReadError, SessionId, StreamId,
};

/// Unidirectional stream types we care about (RFC 9204, WebTransport over HTTP/3).
const STREAM_QPACK_ENCODER: u64 = 0x02;
const STREAM_QPACK_DECODER: u64 = 0x03;
const STREAM_WEBTRANSPORT: u64 = 0x54;

/// Largest chunk handed to the event queue in one go.
const MAX_CHUNK: usize = 64 * 1024;

/// Classifies one inbound unidirectional stream by its header and pumps it if it's WebTransport.
pub(crate) async fn pump_uni(mut recv: quinn::RecvStream, events: mpsc::Sender<Inbound>) {
    let stream_id = StreamId::from(recv.id());

    let typ = match read_varint(&mut recv).await {
        Ok(Some(typ)) => typ,
        Ok(None) => return,
        Err(err) => {
            // The stream was probably reset before its header arrived.
            tracing::debug!(%stream_id, "failed to read stream type: {err}");
            report_reset(stream_id, &events).await;
            return;
        }
    };

    match typ {
        STREAM_WEBTRANSPORT => {
            let session_id = match read_varint(&mut recv).await {
                Ok(Some(id)) => SessionId(id),
                Ok(None) | Err(_) => {
                    tracing::debug!(%stream_id, "WebTransport stream ended before its session id");
                    report_reset(stream_id, &events).await;
                    return;
                }
            };

            tracing::trace!(%stream_id, %session_id, "accepted WebTransport stream");
            pump_webtransport(stream_id, session_id, recv, events).await
        }
        STREAM_QPACK_ENCODER | STREAM_QPACK_DECODER => {
            // We never reference the dynamic table, but the streams must stay open.
            tracing::trace!(%stream_id, typ, "draining QPACK stream");
            while let Ok(Some(_)) = recv.read_chunk(MAX_CHUNK, true).await {}
        }
        _ => {
            tracing::debug!(%stream_id, typ, "ignoring unknown unidirectional stream");
        }
    }
}

async fn pump_webtransport(
    stream_id: StreamId,
    session_id: SessionId,
    mut recv: quinn::RecvStream,
    events: mpsc::Sender<Inbound>,
) {
    loop {
        let (event, done) = match recv.read_chunk(MAX_CHUNK, true).await {
            Ok(Some(chunk)) => (
                Event::StreamDataReceived {
                    stream_id,
                    session_id,
                    data: chunk.bytes,
                    stream_ended: false,
                },
                false,
            ),
            Ok(None) => (
                Event::StreamDataReceived {
                    stream_id,
                    session_id,
                    data: Bytes::new(),
                    stream_ended: true,
                },
                true,
            ),
            Err(err) => {
                let err = ReadError::from(err);
                tracing::debug!(%stream_id, "WebTransport stream failed: {err}");
                (Event::StreamReset { stream_id }, true)
            }
        };

        if events.send(Inbound::Event(event)).await.is_err() || done {
            return;
        }
    }
}

async fn report_reset(stream_id: StreamId, events: &mpsc::Sender<Inbound>) {
    let event = Event::StreamReset { stream_id };
    events.send(Inbound::Event(event)).await.ok();
}

/// Strips the quarter stream ID from an HTTP datagram.
pub fn decode_datagram(mut datagram: Bytes) -> Option<(SessionId, Bytes)> {
    let mut cursor = Cursor::new(&datagram);
    let quarter = VarInt::decode(&mut cursor).ok()?;
    let offset = cursor.position() as usize;
    let payload = datagram.split_off(offset);

    Some((SessionId::from_quarter_stream_id(quarter.into_inner()), payload))
}

/// Feeds every datagram on the connection into the event queue until the connection closes.
pub(crate) async fn pump_datagrams(conn: quinn::Connection, events: mpsc::Sender<Inbound>) {
    loop {
        let datagram = match conn.read_datagram().await {
            Ok(datagram) => datagram,
            Err(err) => {
                tracing::trace!("datagram pump stopped: {err}");
                return;
            }
        };

        let Some((session_id, data)) = decode_datagram(datagram) else {
            tracing::debug!("dropping datagram without a quarter stream id");
            continue;
        };

        let event = Event::DatagramReceived { session_id, data };
        if events.send(Inbound::Event(event)).await.is_err() {
            return;
        }
    }
}
