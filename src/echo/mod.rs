//! The per-session echo handlers.
//!
//! A [`Handler`] is picked once, when the session is accepted, from the request's [`EchoMode`].
//! It is never re-selected; events are dispatched on the variant.

mod datagram;
mod stream;

pub use datagram::*;
pub use stream::*;

use crate::{Delivery, EchoMode, Event, SessionId, StreamId, Transport, TransportError};

/// Counters kept for the lifetime of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EchoStats {
    /// Outbound streams opened.
    pub streams: u64,
    /// Payload bytes written to outbound streams.
    pub bytes: u64,
    /// Datagrams echoed.
    pub datagrams: u64,
}

/// The echo behaviour of one session.
#[derive(Debug)]
pub enum Handler {
    Stream(StreamEcho),
    Datagram(DatagramEcho),
}

impl Handler {
    pub fn new(session_id: SessionId, mode: EchoMode) -> Self {
        match mode.delivery() {
            Delivery::Stream => Handler::Stream(StreamEcho::new(session_id, mode)),
            Delivery::Datagram => Handler::Datagram(DatagramEcho::new(session_id, mode)),
        }
    }

    pub fn session_id(&self) -> SessionId {
        match self {
            Handler::Stream(h) => h.session_id(),
            Handler::Datagram(h) => h.session_id(),
        }
    }

    pub fn mode(&self) -> EchoMode {
        match self {
            Handler::Stream(h) => h.mode(),
            Handler::Datagram(h) => h.mode(),
        }
    }

    pub fn stats(&self) -> EchoStats {
        match self {
            Handler::Stream(h) => h.stats(),
            Handler::Datagram(h) => h.stats(),
        }
    }

    /// Delivers one event. Events the variant has no use for, or for another session, are dropped.
    pub async fn on_event<T: Transport>(
        &mut self,
        transport: &mut T,
        event: Event,
    ) -> Result<(), TransportError> {
        match self {
            Handler::Stream(h) => match event {
                Event::StreamDataReceived {
                    stream_id,
                    session_id,
                    data,
                    stream_ended,
                } if session_id == h.session_id() => {
                    h.on_stream_data(transport, stream_id, data, stream_ended)
                        .await
                }
                Event::StreamReset { stream_id } => {
                    h.stream_closed(transport, stream_id).await;
                    Ok(())
                }
                _ => Ok(()),
            },
            Handler::Datagram(h) => match event {
                Event::DatagramReceived { session_id, data } if session_id == h.session_id() => {
                    h.on_datagram(transport, data).await
                }
                _ => Ok(()),
            },
        }
    }

    /// Releases whatever is held for an inbound stream. Unknown streams are fine.
    pub async fn stream_closed<T: Transport>(&mut self, transport: &mut T, stream_id: StreamId) {
        if let Handler::Stream(h) = self {
            h.stream_closed(transport, stream_id).await;
        }
    }

    /// The client closed the session.
    pub fn session_closed(&mut self) {
        match self {
            Handler::Stream(h) => h.session_closed(),
            Handler::Datagram(h) => h.session_closed(),
        }
    }
}
