use std::{collections::HashSet, fmt};

use crate::{
    handshake, EchoMode, EchoStats, Event, Handler, RequestHeaders, SessionError, SessionId,
    StreamId, Transport, TransportError,
};

/// The first two bytes of a CLOSE_WEBTRANSPORT_SESSION capsule.
///
/// This is capsule type `0x2843` encoded as a two byte QUIC varint (`0x4000 | 0x2843`).
pub const CLOSE_WEBTRANSPORT_SESSION: [u8; 2] = [0x68, 0x43];

/// The WebTransport session of a connection, created by a successful handshake.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    handler: Handler,
}

impl Session {
    fn new(id: SessionId, mode: EchoMode) -> Self {
        Self {
            id,
            handler: Handler::new(id, mode),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> EchoMode {
        self.handler.mode()
    }

    pub fn stats(&self) -> EchoStats {
        self.handler.stats()
    }

    /// Whether `data` on `stream_id` asks for this session to be torn down.
    fn is_close_signal(&self, stream_id: StreamId, data: &[u8], stream_ended: bool) -> bool {
        stream_id == self.id.connect_stream()
            && stream_ended
            && data.starts_with(&CLOSE_WEBTRANSPORT_SESSION)
    }

    fn close(mut self, reason: &str) {
        self.handler.session_closed();

        let stats = self.handler.stats();
        tracing::info!(
            session_id = %self.id,
            mode = %self.mode(),
            streams = stats.streams,
            bytes = stats.bytes,
            datagrams = stats.datagrams,
            "session closed: {reason}"
        );
    }
}

/// The lifecycle of one connection. Only ever moves forward.
#[derive(Debug, Default)]
pub enum ConnectionState {
    #[default]
    AwaitingHandshake,
    SessionActive(Session),
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::AwaitingHandshake => f.write_str("awaiting handshake"),
            ConnectionState::SessionActive(session) => {
                write!(f, "session {} active ({})", session.id, session.mode())
            }
            ConnectionState::Closed => f.write_str("closed"),
        }
    }
}

/// Routes the events of one connection: handshakes to the negotiator, everything else to the
/// session's handler.
///
/// Events must be handed over one at a time, in arrival order.
#[derive(Debug, Default)]
pub struct Router {
    state: ConnectionState,

    /// Streams whose first data arrived before any session, and so went unechoed.
    orphaned: HashSet<StreamId>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            ConnectionState::SessionActive(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ConnectionState::Closed)
    }

    /// Processes one event.
    ///
    /// An error means the connection has to be closed, with [`SessionError::close_code`].
    pub async fn handle<T: Transport>(
        &mut self,
        transport: &mut T,
        event: Event,
    ) -> Result<(), SessionError> {
        if self.is_closed() {
            tracing::trace!(?event, "connection closed, ignoring event");
            return Ok(());
        }

        match event {
            Event::HeadersReceived { stream_id, headers } => {
                self.on_headers(transport, stream_id, &headers).await
            }
            Event::DataReceived {
                stream_id,
                ref data,
                stream_ended,
            } if self
                .session()
                .is_some_and(|s| s.is_close_signal(stream_id, data, stream_ended)) =>
            {
                self.close("closed by client");
                Ok(())
            }
            Event::StreamDataReceived {
                stream_id,
                stream_ended,
                ..
            } if self.orphaned.contains(&stream_id) => {
                // Echoing the tail of a stream whose head was dropped would truncate the echo.
                tracing::trace!(%stream_id, "ignoring the rest of a stream that predates the session");
                if stream_ended {
                    self.orphaned.remove(&stream_id);
                }
                Ok(())
            }
            Event::StreamReset { stream_id } => {
                self.orphaned.remove(&stream_id);

                // Resets only release per-stream state, even on the CONNECT stream.
                if let ConnectionState::SessionActive(session) = &mut self.state {
                    session.handler.stream_closed(transport, stream_id).await;
                }
                Ok(())
            }
            event => self.forward(transport, event).await,
        }
    }

    /// The transport reports the connection is gone for good.
    pub fn on_connection_closed(&mut self) {
        self.close("connection closed");
    }

    async fn on_headers<T: Transport>(
        &mut self,
        transport: &mut T,
        stream_id: StreamId,
        headers: &RequestHeaders,
    ) -> Result<(), SessionError> {
        let active = self.session().map(Session::id);
        if active.map(SessionId::connect_stream) == Some(stream_id) {
            tracing::trace!(%stream_id, "ignoring trailers on the CONNECT stream");
            return Ok(());
        }

        let Some(mode) = handshake::negotiate(transport, stream_id, headers, active).await? else {
            return Ok(());
        };

        let session = Session::new(SessionId::from(stream_id), mode);
        tracing::info!(session_id = %session.id, %mode, "session established");
        self.state = ConnectionState::SessionActive(session);

        Ok(())
    }

    async fn forward<T: Transport>(
        &mut self,
        transport: &mut T,
        event: Event,
    ) -> Result<(), SessionError> {
        let ConnectionState::SessionActive(session) = &mut self.state else {
            tracing::trace!(?event, "no session, ignoring event");
            if let Event::StreamDataReceived {
                stream_id,
                stream_ended: false,
                ..
            } = event
            {
                self.orphaned.insert(stream_id);
            }
            return Ok(());
        };

        match session.handler.on_event(transport, event).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                log_dropped(&err);
                Ok(())
            }
        }
    }

    fn close(&mut self, reason: &str) {
        match std::mem::replace(&mut self.state, ConnectionState::Closed) {
            ConnectionState::SessionActive(session) => session.close(reason),
            ConnectionState::AwaitingHandshake => tracing::debug!("{reason} before any session"),
            ConnectionState::Closed => {}
        }
    }
}

fn log_dropped(err: &TransportError) {
    // The peer stopping a stream we echo on is its own business.
    match err {
        TransportError::Stopped(_) | TransportError::ClosedStream => {
            tracing::debug!("echo stream abandoned: {err}")
        }
        _ => tracing::warn!("failed to echo: {err}"),
    }
}
