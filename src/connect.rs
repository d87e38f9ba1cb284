use bytes::Bytes;
use http::StatusCode;
use tokio::sync::mpsc;
use url::Url;
use web_transport_proto::{ConnectRequest, ConnectResponse};

use crate::{
    frame::{Frame, CAPSULE_CLOSE_SESSION, FRAME_DATA},
    supervisor::Inbound,
    ConnectError, Event, RequestHeaders, StreamId,
};

/// Reads the HEADERS frame of a request stream.
///
/// The codec only decodes extended CONNECT requests for WebTransport, so the header list is
/// rebuilt from the request URL. That URL is normalised: `.` and `..` segments are resolved and
/// backslashes become slashes, so `/video/x/../echo/stream` routes like `/video/echo/stream`.
/// Case and everything else in the path are kept as sent.
pub async fn read_request(recv: &mut quinn::RecvStream) -> Result<RequestHeaders, ConnectError> {
    let frame = Frame::read(recv)
        .await?
        .ok_or(web_transport_proto::ConnectError::UnexpectedEnd)?;

    let request = ConnectRequest::decode(&mut frame.to_bytes())?;
    tracing::debug!("received CONNECT request: {request:?}");

    Ok(request_headers(&request.url))
}

fn request_headers(url: &Url) -> RequestHeaders {
    let mut headers = RequestHeaders::new()
        .with(":method", "CONNECT")
        .with(":protocol", "webtransport")
        .with(":scheme", url.scheme());

    if let Some(host) = url.host_str() {
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        headers.insert(":authority", authority);
    }

    let path = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    };
    headers.insert(":path", path);

    headers
}

/// Writes the HEADERS response, optionally finishing the stream after it.
///
/// The codec adds the `sec-webtransport-http3-draft: draft02` marker to every response.
pub async fn write_response(
    send: &mut quinn::SendStream,
    status: StatusCode,
    end_stream: bool,
) -> Result<(), ConnectError> {
    let resp = ConnectResponse { status };

    tracing::debug!("sending CONNECT response: {resp:?}");

    let mut buf = Vec::new();
    resp.encode(&mut buf);
    send.write_all(&buf).await?;

    if end_stream {
        send.finish()?;
    }

    Ok(())
}

/// Feeds one client bidirectional stream into the connection's event queue.
///
/// The send half travels with the request so the response can be written on it later.
pub(crate) async fn pump_request(
    send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    events: mpsc::Sender<Inbound>,
) {
    let stream_id = StreamId::from(recv.id());

    let (headers, readable) = match read_request(&mut recv).await {
        Ok(headers) => (headers, true),
        Err(err) => {
            tracing::debug!(%stream_id, "failed to decode request: {err}");
            (undecoded_headers(&err), false)
        }
    };

    let request = Inbound::Request {
        stream_id,
        send,
        headers,
    };
    if events.send(request).await.is_err() || !readable {
        return;
    }

    pump_data(stream_id, recv, events).await
}

/// The headers a request is judged by when it could not be decoded.
///
/// The codec checks `:authority` and `:path` before the method and protocol. A request missing
/// either is answered as a CONNECT without a target; anything else as not WebTransport at all.
fn undecoded_headers(err: &ConnectError) -> RequestHeaders {
    use web_transport_proto::ConnectError::{WrongAuthority, WrongPath};

    match err {
        ConnectError::ProtoError(WrongAuthority | WrongPath) => RequestHeaders::new()
            .with(":method", "CONNECT")
            .with(":protocol", "webtransport"),
        _ => RequestHeaders::new(),
    }
}

// Each DATA frame is held back until the next frame or FIN shows up,
// so the last one can carry `stream_ended`.
async fn pump_data(stream_id: StreamId, mut recv: quinn::RecvStream, events: mpsc::Sender<Inbound>) {
    let mut held: Option<Bytes> = None;

    loop {
        let (event, done) = match Frame::read(&mut recv).await {
            Ok(Some(frame)) => {
                let data = match frame.typ {
                    FRAME_DATA => frame.payload,
                    // Some clients write capsules straight onto the stream, outside DATA frames.
                    CAPSULE_CLOSE_SESSION => frame.to_bytes(),
                    typ => {
                        tracing::trace!(%stream_id, typ, "skipping frame");
                        continue;
                    }
                };

                match held.replace(data) {
                    Some(data) => (
                        Event::DataReceived {
                            stream_id,
                            data,
                            stream_ended: false,
                        },
                        false,
                    ),
                    None => continue,
                }
            }
            Ok(None) => (
                Event::DataReceived {
                    stream_id,
                    data: held.take().unwrap_or_default(),
                    stream_ended: true,
                },
                true,
            ),
            Err(err) => {
                tracing::debug!(%stream_id, "request stream failed: {err}");
                (Event::StreamReset { stream_id }, true)
            }
        };

        if events.send(Inbound::Event(event)).await.is_err() || done {
            return;
        }
    }
}
