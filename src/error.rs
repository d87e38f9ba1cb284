use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::{SessionId, StreamId};

/// HTTP/3 error codes used when closing a connection (RFC 9114, section 8.1).
pub mod code {
    pub const H3_NO_ERROR: u32 = 0x100;
    pub const H3_GENERAL_PROTOCOL_ERROR: u32 = 0x101;
    pub const H3_INTERNAL_ERROR: u32 = 0x102;
    pub const H3_SETTINGS_ERROR: u32 = 0x109;
}

/// An error during the HTTP/3 SETTINGS frame exchange.
#[derive(Error, Debug, Clone)]
pub enum SettingsError {
    #[error("protocol error: {0}")]
    ProtoError(#[from] web_transport_proto::SettingsError),

    #[error("WebTransport is not supported")]
    WebTransportUnsupported,

    #[error("first unidirectional stream has type {0:#x}, not control")]
    NotControlStream(u64),

    #[error("no SETTINGS from peer within {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    ConnectionError(#[from] quinn::ConnectionError),

    #[error("read error: {0}")]
    ReadError(#[from] ReadError),

    #[error("write error: {0}")]
    WriteError(#[from] quinn::WriteError),
}

/// An error while reading the request off a CONNECT stream or writing its response.
#[derive(Error, Debug, Clone)]
pub enum ConnectError {
    #[error("protocol error: {0}")]
    ProtoError(#[from] web_transport_proto::ConnectError),

    #[error("read error: {0}")]
    ReadError(#[from] ReadError),

    #[error("write error: {0}")]
    WriteError(#[from] quinn::WriteError),

    #[error("stream closed")]
    ClosedStream,
}

impl From<quinn::ClosedStream> for ConnectError {
    fn from(_: quinn::ClosedStream) -> Self {
        ConnectError::ClosedStream
    }
}

/// An error when reading an inbound stream. Similar to [`quinn::ReadError`].
#[derive(Error, Debug, Clone)]
pub enum ReadError {
    #[error("RESET_STREAM: {0}")]
    Reset(u64),

    #[error("connection lost: {0}")]
    ConnectionLost(quinn::ConnectionError),

    #[error("stream ended in the middle of a frame")]
    UnexpectedEnd,

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(u64),

    #[error("stream already closed")]
    ClosedStream,
}

impl From<quinn::ReadError> for ReadError {
    fn from(value: quinn::ReadError) -> Self {
        match value {
            quinn::ReadError::Reset(code) => ReadError::Reset(code.into_inner()),
            quinn::ReadError::ConnectionLost(e) => ReadError::ConnectionLost(e),
            _ => ReadError::ClosedStream,
        }
    }
}

impl From<quinn::ReadExactError> for ReadError {
    fn from(e: quinn::ReadExactError) -> Self {
        match e {
            quinn::ReadExactError::FinishedEarly(_) => ReadError::UnexpectedEnd,
            quinn::ReadExactError::ReadError(e) => e.into(),
        }
    }
}

/// An error returned by a [`crate::Transport`] operation.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection lost: {0}")]
    ConnectionLost(#[from] quinn::ConnectionError),

    #[error("STOP_SENDING: {0}")]
    Stopped(u64),

    #[error("stream closed")]
    ClosedStream,

    #[error("unknown stream: {0}")]
    UnknownStream(StreamId),

    #[error("send datagram error: {0}")]
    SendDatagram(#[from] quinn::SendDatagramError),

    #[error("failed to write response: {0}")]
    Response(#[from] ConnectError),
}

impl TransportError {
    /// Whether the error means the whole connection is gone, rather than a single stream or datagram.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionLost(_)
                | TransportError::SendDatagram(quinn::SendDatagramError::ConnectionLost(_))
        )
    }
}

impl From<quinn::WriteError> for TransportError {
    fn from(e: quinn::WriteError) -> Self {
        match e {
            quinn::WriteError::Stopped(code) => TransportError::Stopped(code.into_inner()),
            quinn::WriteError::ConnectionLost(e) => TransportError::ConnectionLost(e),
            _ => TransportError::ClosedStream,
        }
    }
}

impl From<quinn::ClosedStream> for TransportError {
    fn from(_: quinn::ClosedStream) -> Self {
        TransportError::ClosedStream
    }
}

/// An error that ends one connection, and only that connection.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("duplicate WebTransport session on stream {attempted}, session {active} is active")]
    DuplicateSession {
        active: SessionId,
        attempted: StreamId,
    },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to exchange h3 settings: {0}")]
    Settings(#[from] SettingsError),
}

impl SessionError {
    /// The HTTP/3 error code used to close the connection.
    pub fn close_code(&self) -> u32 {
        match self {
            SessionError::DuplicateSession { .. } => code::H3_GENERAL_PROTOCOL_ERROR,
            SessionError::Settings(SettingsError::WebTransportUnsupported) => {
                code::H3_SETTINGS_ERROR
            }
            _ => code::H3_INTERNAL_ERROR,
        }
    }
}

/// An error while configuring or binding the server.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to read {path}: {source}")]
    ReadPem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificate found in {0}")]
    NoCertificate(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("tls config is not usable for QUIC: {0}")]
    Crypto(#[from] quinn::crypto::rustls::NoInitialCipherSuite),

    #[error("invalid idle timeout: {0:?}")]
    InvalidIdleTimeout(Duration),

    #[error("failed to bind endpoint: {0}")]
    Bind(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_session_is_a_protocol_error() {
        let err = SessionError::DuplicateSession {
            active: SessionId(0),
            attempted: StreamId(4),
        };
        assert_eq!(err.close_code(), code::H3_GENERAL_PROTOCOL_ERROR);
        assert_eq!(
            err.to_string(),
            "duplicate WebTransport session on stream 4, session 0 is active"
        );
    }

    #[test]
    fn stream_errors_are_not_fatal() {
        assert!(!TransportError::Stopped(0).is_fatal());
        assert!(!TransportError::ClosedStream.is_fatal());
        assert!(!TransportError::UnknownStream(StreamId(3)).is_fatal());
        assert!(TransportError::ConnectionLost(quinn::ConnectionError::TimedOut).is_fatal());
    }
}
