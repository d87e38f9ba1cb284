use std::fmt;

use bytes::Bytes;

/// The QUIC stream ID of a stream on a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<quinn::StreamId> for StreamId {
    fn from(id: quinn::StreamId) -> Self {
        Self(quinn::VarInt::from(id).into_inner())
    }
}

/// A WebTransport session ID, which is the stream ID of the CONNECT request that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    /// The stream carrying the CONNECT request.
    pub fn connect_stream(self) -> StreamId {
        StreamId(self.0)
    }

    /// HTTP datagrams carry the session as a quarter stream ID (RFC 9297).
    pub fn quarter_stream_id(self) -> u64 {
        self.0 / 4
    }

    pub fn from_quarter_stream_id(quarter: u64) -> Self {
        Self(quarter * 4)
    }
}

impl From<StreamId> for SessionId {
    fn from(id: StreamId) -> Self {
        Self(id.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The decoded header list of an HTTP/3 request, pseudo-headers included.
///
/// Pseudo-headers can't live in an [`http::HeaderMap`], so this is a plain ordered list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    fields: Vec<(String, String)>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Returns the first value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP/3 or QUIC level event for one connection, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A request HEADERS frame arrived on a client bidirectional stream.
    HeadersReceived {
        stream_id: StreamId,
        headers: RequestHeaders,
    },

    /// A DATA frame arrived on a request stream.
    DataReceived {
        stream_id: StreamId,
        data: Bytes,
        stream_ended: bool,
    },

    /// Payload arrived on an inbound WebTransport unidirectional stream.
    StreamDataReceived {
        stream_id: StreamId,
        session_id: SessionId,
        data: Bytes,
        stream_ended: bool,
    },

    /// An HTTP datagram arrived for a session.
    DatagramReceived { session_id: SessionId, data: Bytes },

    /// The peer reset a stream, or it otherwise failed before its end.
    StreamReset { stream_id: StreamId },
}
