use std::time::Duration;

use web_transport_proto::StreamUni;

use crate::{
    frame::{read_varint, Frame},
    SettingsError,
};

/// The HTTP/3 control streams of one connection, after SETTINGS were exchanged.
///
/// Closing either control stream is a connection error for the peer,
/// so this must outlive every request on the connection.
pub struct Settings {
    #[allow(dead_code)]
    control: quinn::SendStream,

    #[allow(dead_code)]
    peer_control: quinn::RecvStream,
}

impl Settings {
    /// Sends our SETTINGS and waits for the peer's, giving up after `timeout`.
    ///
    /// Our SETTINGS enable WebTransport, which implies extended CONNECT and HTTP datagrams.
    /// The peer's first unidirectional stream must be its control stream, as browsers do.
    pub async fn exchange(
        conn: &quinn::Connection,
        timeout: Duration,
    ) -> Result<Self, SettingsError> {
        let exchange = async {
            tokio::try_join!(Self::send_local(conn), Self::recv_peer(conn))
        };

        let (control, peer_control) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| SettingsError::Timeout(timeout))??;

        Ok(Self {
            control,
            peer_control,
        })
    }

    async fn send_local(conn: &quinn::Connection) -> Result<quinn::SendStream, SettingsError> {
        let mut settings = web_transport_proto::Settings::default();
        settings.enable_webtransport(1);

        tracing::trace!(?settings, "sending SETTINGS");

        let mut buf = Vec::new();
        settings.encode(&mut buf);

        let mut control = conn.open_uni().await?;
        control.write_all(&buf).await?;

        Ok(control)
    }

    async fn recv_peer(conn: &quinn::Connection) -> Result<quinn::RecvStream, SettingsError> {
        let mut peer_control = conn.accept_uni().await?;

        let typ = read_varint(&mut peer_control)
            .await?
            .ok_or(web_transport_proto::SettingsError::UnexpectedEnd)?;
        if typ != StreamUni::CONTROL.0.into_inner() {
            return Err(SettingsError::NotControlStream(typ));
        }

        let frame = Frame::read(&mut peer_control)
            .await?
            .ok_or(web_transport_proto::SettingsError::UnexpectedEnd)?;
        let settings = decode_settings(&frame)?;

        let webtransport = settings.supports_webtransport();
        tracing::debug!(webtransport, "received SETTINGS: {settings:?}");

        if webtransport == 0 {
            return Err(SettingsError::WebTransportUnsupported);
        }

        Ok(peer_control)
    }
}

/// Decodes the first frame of a control stream, which must be SETTINGS.
fn decode_settings(frame: &Frame) -> Result<web_transport_proto::Settings, SettingsError> {
    let mut buf = Vec::new();
    StreamUni::CONTROL.encode(&mut buf);
    buf.extend_from_slice(&frame.to_bytes());

    Ok(web_transport_proto::Settings::decode(&mut &buf[..])?)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use web_transport_proto::VarInt;

    use super::*;
    use crate::frame::encode_varint;

    fn control_frame(settings: &web_transport_proto::Settings) -> Frame {
        let mut encoded = Vec::new();
        settings.encode(&mut encoded);

        let mut buf = &encoded[..];
        let stream = VarInt::decode(&mut buf).unwrap();
        assert_eq!(stream, StreamUni::CONTROL.0);

        let typ = VarInt::decode(&mut buf).unwrap().into_inner();
        let len = VarInt::decode(&mut buf).unwrap().into_inner() as usize;
        assert_eq!(buf.len(), len);

        Frame {
            typ,
            payload: Bytes::copy_from_slice(buf),
        }
    }

    #[test]
    fn webtransport_settings_decode() {
        let mut settings = web_transport_proto::Settings::default();
        settings.enable_webtransport(1);

        let decoded = decode_settings(&control_frame(&settings)).unwrap();
        assert!(decoded.supports_webtransport() > 0);
    }

    #[test]
    fn plain_http3_settings_lack_webtransport() {
        let decoded =
            decode_settings(&control_frame(&web_transport_proto::Settings::default())).unwrap();
        assert_eq!(decoded.supports_webtransport(), 0);
    }

    #[test]
    fn other_frames_are_rejected() {
        let mut varint = Vec::new();
        encode_varint(7, &mut varint);
        let frame = Frame {
            typ: 0x00,
            payload: varint.into(),
        };

        assert!(matches!(
            decode_settings(&frame),
            Err(SettingsError::ProtoError(
                web_transport_proto::SettingsError::UnexpectedFrame(_)
            ))
        ));
    }
}
