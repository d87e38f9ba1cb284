use std::collections::HashMap;

use bytes::Bytes;

use super::EchoStats;
use crate::{EchoMode, SessionId, StreamId, Transport, TransportError};

/// Error code used when an outbound echo stream is abandoned because its inbound stream was reset.
pub const ECHO_ABORTED: u32 = 0;

/// Inbound stream id to the outbound stream echoing it.
///
/// An inbound stream gets its outbound stream on first data and keeps it until it ends or is reset.
#[derive(Debug, Default)]
pub struct StreamMap {
    inner: HashMap<StreamId, StreamId>,
}

impl StreamMap {
    pub fn get(&self, inbound: StreamId) -> Option<StreamId> {
        self.inner.get(&inbound).copied()
    }

    /// Records a mapping. Panics in debug builds if `inbound` is already mapped.
    pub fn insert(&mut self, inbound: StreamId, outbound: StreamId) {
        let previous = self.inner.insert(inbound, outbound);
        debug_assert!(previous.is_none(), "inbound stream {inbound} remapped");
    }

    /// Removes a mapping, returning the outbound stream if there was one.
    pub fn remove(&mut self, inbound: StreamId) -> Option<StreamId> {
        self.inner.remove(&inbound)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Echoes every inbound unidirectional stream of a session on a fresh outbound one.
#[derive(Debug)]
pub struct StreamEcho {
    session_id: SessionId,
    mode: EchoMode,
    streams: StreamMap,
    stats: EchoStats,
}

impl StreamEcho {
    pub fn new(session_id: SessionId, mode: EchoMode) -> Self {
        Self {
            session_id,
            mode,
            streams: StreamMap::default(),
            stats: EchoStats::default(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn mode(&self) -> EchoMode {
        self.mode
    }

    pub fn stats(&self) -> EchoStats {
        self.stats
    }

    pub fn streams(&self) -> &StreamMap {
        &self.streams
    }

    /// Forwards one chunk of an inbound stream, opening its outbound stream on first use.
    ///
    /// The end-of-stream flag is passed through, so the outbound stream finishes with the inbound one.
    pub async fn on_stream_data<T: Transport>(
        &mut self,
        transport: &mut T,
        stream_id: StreamId,
        data: Bytes,
        stream_ended: bool,
    ) -> Result<(), TransportError> {
        let outbound = match self.streams.get(stream_id) {
            Some(outbound) => outbound,
            None => {
                let outbound = transport.open_uni(self.session_id).await?;
                tracing::debug!(inbound = %stream_id, %outbound, mode = %self.mode, "echoing stream");

                self.streams.insert(stream_id, outbound);
                self.stats.streams += 1;
                outbound
            }
        };

        let len = data.len() as u64;
        let res = transport
            .send_stream_data(outbound, data, stream_ended)
            .await;

        if stream_ended {
            self.streams.remove(stream_id);
        }

        res?;
        self.stats.bytes += len;
        Ok(())
    }

    /// Releases the mapping of an inbound stream that ended abnormally.
    ///
    /// Its outbound stream is reset. Calling this for an unknown or already released stream does nothing.
    pub async fn stream_closed<T: Transport>(&mut self, transport: &mut T, stream_id: StreamId) {
        let Some(outbound) = self.streams.remove(stream_id) else {
            return;
        };

        tracing::debug!(inbound = %stream_id, %outbound, "inbound stream reset");
        if let Err(err) = transport.reset_stream(outbound, ECHO_ABORTED) {
            tracing::debug!(%outbound, "failed to reset echo stream: {err}");
        }
    }

    /// Outbound streams are left to the connection's own teardown.
    pub fn session_closed(&mut self) {
        tracing::debug!(
            session_id = %self.session_id,
            open = self.streams.len(),
            "stream echo session closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{RecordingTransport, Sent};

    fn echo() -> StreamEcho {
        StreamEcho::new(SessionId(0), EchoMode::VideoStream)
    }

    #[tokio::test]
    async fn chunks_are_forwarded_in_order() {
        let mut transport = RecordingTransport::new();
        let mut echo = echo();
        let inbound = StreamId(2);

        let chunks: [&'static [u8]; 4] = [b"a", b"bc", b"", b"def"];
        for (i, chunk) in chunks.iter().enumerate() {
            let last = i == chunks.len() - 1;
            echo.on_stream_data(&mut transport, inbound, Bytes::from_static(chunk), last)
                .await
                .unwrap();
        }

        let outbound = StreamId(3);
        let mut expected = vec![Sent::Opened {
            session_id: SessionId(0),
            stream_id: outbound,
        }];
        for (i, chunk) in chunks.iter().enumerate() {
            expected.push(Sent::StreamData {
                stream_id: outbound,
                data: Bytes::from_static(chunk),
                end_stream: i == chunks.len() - 1,
            });
        }
        assert_eq!(transport.sent, expected);
        assert!(echo.streams().is_empty());
        assert_eq!(echo.stats().bytes, 6);
    }

    #[tokio::test]
    async fn open_stream_keeps_its_mapping() {
        let mut transport = RecordingTransport::new();
        let mut echo = echo();

        echo.on_stream_data(&mut transport, StreamId(2), Bytes::from_static(b"x"), false)
            .await
            .unwrap();
        echo.on_stream_data(&mut transport, StreamId(2), Bytes::from_static(b"y"), false)
            .await
            .unwrap();

        assert_eq!(transport.opened(), vec![StreamId(3)]);
        assert_eq!(echo.streams().get(StreamId(2)), Some(StreamId(3)));
    }

    #[tokio::test]
    async fn streams_get_distinct_outbound_streams() {
        let mut transport = RecordingTransport::new();
        let mut echo = echo();

        // Interleaved chunks of two inbound streams.
        for (inbound, chunk, end) in [
            (StreamId(2), &b"a1"[..], false),
            (StreamId(6), &b"b1"[..], false),
            (StreamId(2), &b"a2"[..], true),
            (StreamId(6), &b"b2"[..], true),
            (StreamId(10), &b"c"[..], true),
        ] {
            echo.on_stream_data(&mut transport, inbound, Bytes::copy_from_slice(chunk), end)
                .await
                .unwrap();
        }

        assert_eq!(
            transport.opened(),
            vec![StreamId(3), StreamId(7), StreamId(11)]
        );

        let written_to = |outbound: StreamId| -> Vec<(Bytes, bool)> {
            transport
                .sent
                .iter()
                .filter_map(|sent| match sent {
                    Sent::StreamData {
                        stream_id,
                        data,
                        end_stream,
                    } if *stream_id == outbound => Some((data.clone(), *end_stream)),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(
            written_to(StreamId(3)),
            vec![
                (Bytes::from_static(b"a1"), false),
                (Bytes::from_static(b"a2"), true)
            ]
        );
        assert_eq!(
            written_to(StreamId(7)),
            vec![
                (Bytes::from_static(b"b1"), false),
                (Bytes::from_static(b"b2"), true)
            ]
        );
        assert_eq!(echo.stats().streams, 3);
    }

    #[tokio::test]
    async fn empty_stream_is_echoed_empty() {
        let mut transport = RecordingTransport::new();
        let mut echo = echo();

        echo.on_stream_data(&mut transport, StreamId(2), Bytes::new(), true)
            .await
            .unwrap();

        assert_eq!(
            transport.sent,
            vec![
                Sent::Opened {
                    session_id: SessionId(0),
                    stream_id: StreamId(3)
                },
                Sent::StreamData {
                    stream_id: StreamId(3),
                    data: Bytes::new(),
                    end_stream: true
                },
            ]
        );
    }

    #[tokio::test]
    async fn reset_releases_and_resets_outbound() {
        let mut transport = RecordingTransport::new();
        let mut echo = echo();

        echo.on_stream_data(&mut transport, StreamId(2), Bytes::from_static(b"x"), false)
            .await
            .unwrap();
        echo.stream_closed(&mut transport, StreamId(2)).await;

        assert!(echo.streams().is_empty());
        assert_eq!(
            transport.sent.last(),
            Some(&Sent::Reset {
                stream_id: StreamId(3),
                code: ECHO_ABORTED
            })
        );
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let mut transport = RecordingTransport::new();
        let mut echo = echo();

        // A reset for a stream whose first byte never arrived.
        echo.stream_closed(&mut transport, StreamId(14)).await;
        assert!(transport.sent.is_empty());

        echo.on_stream_data(&mut transport, StreamId(2), Bytes::from_static(b"x"), true)
            .await
            .unwrap();
        let before = transport.sent.clone();

        echo.stream_closed(&mut transport, StreamId(2)).await;
        echo.stream_closed(&mut transport, StreamId(2)).await;

        assert_eq!(transport.sent, before);
        assert!(echo.streams().is_empty());
    }

    #[tokio::test]
    async fn failed_write_still_releases_ended_stream() {
        let mut transport = RecordingTransport::new();
        transport.fail_writes = true;
        let mut echo = echo();

        let res = echo
            .on_stream_data(&mut transport, StreamId(2), Bytes::from_static(b"x"), true)
            .await;

        assert!(matches!(res, Err(TransportError::Stopped(0))));
        assert!(echo.streams().is_empty());
        assert_eq!(echo.stats().bytes, 0);
    }

    #[test]
    fn map_answers_absent_explicitly() {
        let mut map = StreamMap::default();
        assert_eq!(map.get(StreamId(2)), None);

        // Outbound stream 0 is a legitimate value, not a stand-in for "absent".
        map.insert(StreamId(2), StreamId(0));
        assert_eq!(map.get(StreamId(2)), Some(StreamId(0)));
        assert_eq!(map.remove(StreamId(2)), Some(StreamId(0)));
        assert_eq!(map.remove(StreamId(2)), None);
    }
}
