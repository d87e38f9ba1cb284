//! One task per QUIC connection.
//!
//! Pump tasks read the connection's streams and datagrams and feed a bounded queue. The supervisor
//! is the queue's only consumer, so the router sees every event of its connection one at a time,
//! in arrival order, and needs no locking. Nothing here is shared with other connections.

use std::time::Duration;

use tokio::{sync::mpsc, task::JoinSet};
use tracing::Instrument;

use crate::{
    code, connect, recv, Event, QuicTransport, RequestHeaders, Router, SessionError, Settings,
    StreamId,
};

/// How long a client gets to send its SETTINGS.
const SETTINGS_TIMEOUT: Duration = Duration::from_secs(10);

/// What the pumps hand to the supervisor.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// A new request, with the send half to respond on.
    Request {
        stream_id: StreamId,
        send: quinn::SendStream,
        headers: RequestHeaders,
    },
    Event(Event),
}

/// Why the event loop stopped without an error.
#[derive(Debug)]
enum Exit {
    SessionClosed,
    ConnectionClosed(quinn::ConnectionError),
}

/// Serves one connection until it closes, then closes it with the matching HTTP/3 error code.
pub(crate) async fn run(conn: quinn::Connection, event_capacity: usize) {
    let span = tracing::info_span!(
        "conn",
        id = conn.stable_id(),
        remote = %conn.remote_address()
    );

    async move {
        tracing::info!("connection established");

        match serve(&conn, event_capacity).await {
            Ok(Exit::SessionClosed) => {
                tracing::info!("closing connection");
                close(&conn, code::H3_NO_ERROR, b"session closed");
            }
            Ok(Exit::ConnectionClosed(err)) => {
                tracing::info!("connection closed: {err}");
            }
            Err(err) => {
                tracing::warn!("closing connection: {err}");
                close(&conn, err.close_code(), err.to_string().as_bytes());
            }
        }
    }
    .instrument(span)
    .await
}

async fn serve(conn: &quinn::Connection, event_capacity: usize) -> Result<Exit, SessionError> {
    // Held until the connection is done; dropping the control stream is an error for the peer.
    let _settings = Settings::exchange(conn, SETTINGS_TIMEOUT).await?;

    let (events, mut queue) = mpsc::channel(event_capacity);

    let mut pumps = JoinSet::new();
    pumps.spawn(accept_requests(conn.clone(), events.clone()).in_current_span());
    pumps.spawn(accept_streams(conn.clone(), events.clone()).in_current_span());
    pumps.spawn(recv::pump_datagrams(conn.clone(), events).in_current_span());

    let mut transport = QuicTransport::new(conn.clone());
    let mut router = Router::new();

    let res = loop {
        let inbound = tokio::select! {
            Some(inbound) = queue.recv() => inbound,
            err = conn.closed() => break Ok(Exit::ConnectionClosed(err)),
        };

        let event = match inbound {
            Inbound::Request {
                stream_id,
                send,
                headers,
            } => {
                transport.register_request(stream_id, send);
                Event::HeadersReceived { stream_id, headers }
            }
            Inbound::Event(event) => event,
        };

        if let Err(err) = router.handle(&mut transport, event).await {
            break Err(err);
        }

        if router.is_closed() {
            break Ok(Exit::SessionClosed);
        }
    };

    router.on_connection_closed();
    pumps.abort_all();

    res
}

async fn accept_requests(conn: quinn::Connection, events: mpsc::Sender<Inbound>) {
    loop {
        let (send, recv) = match conn.accept_bi().await {
            Ok(streams) => streams,
            Err(err) => {
                tracing::trace!("stopped accepting requests: {err}");
                return;
            }
        };

        tokio::spawn(connect::pump_request(send, recv, events.clone()).in_current_span());
    }
}

async fn accept_streams(conn: quinn::Connection, events: mpsc::Sender<Inbound>) {
    loop {
        let recv = match conn.accept_uni().await {
            Ok(recv) => recv,
            Err(err) => {
                tracing::trace!("stopped accepting streams: {err}");
                return;
            }
        };

        tokio::spawn(recv::pump_uni(recv, events.clone()).in_current_span());
    }
}

fn close(conn: &quinn::Connection, code: u32, reason: &[u8]) {
    conn.close(quinn::VarInt::from_u32(code), reason);
}
