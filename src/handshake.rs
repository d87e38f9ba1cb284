//! Validates extended CONNECT requests and answers them.
//!
//! Exactly one HEADERS response is written per request: `200` with the stream left open when a
//! session is created, `400` or `404` with the stream finished otherwise. A valid CONNECT on a
//! connection that already has a session gets no response at all; it is a connection error.

use http::StatusCode;

use crate::{EchoMode, RequestHeaders, SessionError, SessionId, StreamId, Transport};

/// Why a request did not become a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Not `:method = CONNECT` with `:protocol = webtransport`.
    NotWebTransport,
    /// `:authority` or `:path` is missing.
    MissingTarget,
    /// `:path` is not in the routing table.
    UnknownPath,
}

impl Rejection {
    pub fn status(self) -> StatusCode {
        match self {
            Rejection::NotWebTransport | Rejection::MissingTarget => StatusCode::BAD_REQUEST,
            Rejection::UnknownPath => StatusCode::NOT_FOUND,
        }
    }
}

/// The outcome of looking at a request's headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept(EchoMode),
    Reject(Rejection),
    /// A valid WebTransport CONNECT, but this connection already has a session.
    Duplicate(SessionId),
}

impl Verdict {
    /// Decides what to do with a request, given the connection's current session if any.
    pub fn of(headers: &RequestHeaders, active: Option<SessionId>) -> Self {
        let is_connect = headers.get(":method") == Some("CONNECT");
        let is_webtransport = headers.get(":protocol") == Some("webtransport");
        if !(is_connect && is_webtransport) {
            return Verdict::Reject(Rejection::NotWebTransport);
        }

        let (Some(_authority), Some(path)) = (headers.get(":authority"), headers.get(":path"))
        else {
            return Verdict::Reject(Rejection::MissingTarget);
        };

        if let Some(session_id) = active {
            return Verdict::Duplicate(session_id);
        }

        match EchoMode::from_path(path) {
            Some(mode) => Verdict::Accept(mode),
            None => Verdict::Reject(Rejection::UnknownPath),
        }
    }
}

/// Answers the request on `stream_id`, returning the new session's mode if it was accepted.
///
/// Fails only when the connection must be torn down: a duplicate session or a lost connection.
pub async fn negotiate<T: Transport>(
    transport: &mut T,
    stream_id: StreamId,
    headers: &RequestHeaders,
    active: Option<SessionId>,
) -> Result<Option<EchoMode>, SessionError> {
    let (status, end_stream, mode) = match Verdict::of(headers, active) {
        Verdict::Accept(mode) => (StatusCode::OK, false, Some(mode)),
        Verdict::Reject(rejection) => {
            tracing::debug!(%stream_id, ?rejection, "rejecting request");
            (rejection.status(), true, None)
        }
        Verdict::Duplicate(active) => {
            return Err(SessionError::DuplicateSession {
                active,
                attempted: stream_id,
            })
        }
    };

    match transport.send_response(stream_id, status, end_stream).await {
        Ok(()) => Ok(mode),
        Err(err) if err.is_fatal() => Err(err.into()),
        Err(err) => {
            // The client gave up on the request; there is nobody to hold a session for.
            tracing::warn!(%stream_id, %status, "failed to send response: {err}");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::RecordingTransport;

    fn connect(path: &str) -> RequestHeaders {
        RequestHeaders::new()
            .with(":method", "CONNECT")
            .with(":protocol", "webtransport")
            .with(":scheme", "https")
            .with(":authority", "localhost:4433")
            .with(":path", path)
    }

    #[test]
    fn every_route_is_accepted() {
        for mode in EchoMode::ALL {
            assert_eq!(
                Verdict::of(&connect(mode.path()), None),
                Verdict::Accept(mode)
            );
        }
    }

    #[test]
    fn wrong_method_or_protocol() {
        let get = RequestHeaders::new()
            .with(":method", "GET")
            .with(":authority", "localhost")
            .with(":path", "/audio/echo/stream");
        assert_eq!(
            Verdict::of(&get, None),
            Verdict::Reject(Rejection::NotWebTransport)
        );

        let websocket = RequestHeaders::new()
            .with(":method", "CONNECT")
            .with(":protocol", "websocket")
            .with(":authority", "localhost")
            .with(":path", "/audio/echo/stream");
        assert_eq!(
            Verdict::of(&websocket, None),
            Verdict::Reject(Rejection::NotWebTransport)
        );

        assert_eq!(
            Verdict::of(&RequestHeaders::new(), None),
            Verdict::Reject(Rejection::NotWebTransport)
        );
    }

    #[test]
    fn missing_authority_or_path() {
        let no_authority = RequestHeaders::new()
            .with(":method", "CONNECT")
            .with(":protocol", "webtransport")
            .with(":path", "/audio/echo/stream");
        assert_eq!(
            Verdict::of(&no_authority, None),
            Verdict::Reject(Rejection::MissingTarget)
        );

        let no_path = RequestHeaders::new()
            .with(":method", "CONNECT")
            .with(":protocol", "webtransport")
            .with(":authority", "localhost");
        assert_eq!(
            Verdict::of(&no_path, None),
            Verdict::Reject(Rejection::MissingTarget)
        );
    }

    #[test]
    fn unknown_path() {
        assert_eq!(
            Verdict::of(&connect("/chat"), None),
            Verdict::Reject(Rejection::UnknownPath)
        );
        assert_eq!(Rejection::UnknownPath.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn duplicate_is_detected_before_routing() {
        let active = Some(SessionId(0));
        assert_eq!(
            Verdict::of(&connect("/video/echo/stream"), active),
            Verdict::Duplicate(SessionId(0))
        );
        assert_eq!(
            Verdict::of(&connect("/nope"), active),
            Verdict::Duplicate(SessionId(0))
        );
        // Malformed requests are still just malformed.
        assert_eq!(
            Verdict::of(&RequestHeaders::new(), active),
            Verdict::Reject(Rejection::NotWebTransport)
        );
    }

    #[tokio::test]
    async fn accepted_keeps_the_stream_open() {
        let mut transport = RecordingTransport::new();
        let mode = negotiate(
            &mut transport,
            StreamId(0),
            &connect("/audio/echo/datagram"),
            None,
        )
        .await
        .unwrap();

        assert_eq!(mode, Some(EchoMode::AudioDatagram));
        assert_eq!(
            transport.responses(),
            vec![(StreamId(0), StatusCode::OK, false)]
        );
    }

    #[tokio::test]
    async fn rejected_ends_the_stream() {
        let mut transport = RecordingTransport::new();
        let no_path = RequestHeaders::new()
            .with(":method", "CONNECT")
            .with(":protocol", "webtransport")
            .with(":authority", "localhost");

        assert_eq!(
            negotiate(&mut transport, StreamId(0), &no_path, None)
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            negotiate(&mut transport, StreamId(4), &connect("/x"), None)
                .await
                .unwrap(),
            None
        );

        assert_eq!(
            transport.responses(),
            vec![
                (StreamId(0), StatusCode::BAD_REQUEST, true),
                (StreamId(4), StatusCode::NOT_FOUND, true),
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_sends_nothing() {
        let mut transport = RecordingTransport::new();
        let err = negotiate(
            &mut transport,
            StreamId(4),
            &connect("/audio/echo/stream"),
            Some(SessionId(0)),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            SessionError::DuplicateSession {
                active: SessionId(0),
                attempted: StreamId(4)
            }
        ));
        assert!(transport.sent.is_empty());
    }
}
