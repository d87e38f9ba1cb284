use bytes::Bytes;

use super::EchoStats;
use crate::{EchoMode, SessionId, Transport, TransportError};

/// Sends every datagram of a session straight back.
#[derive(Debug)]
pub struct DatagramEcho {
    session_id: SessionId,
    mode: EchoMode,
    stats: EchoStats,
}

impl DatagramEcho {
    pub fn new(session_id: SessionId, mode: EchoMode) -> Self {
        Self {
            session_id,
            mode,
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

    /// Echoes one datagram and flushes, so it leaves before the next event is looked at.
    pub async fn on_datagram<T: Transport>(
        &mut self,
        transport: &mut T,
        data: Bytes,
    ) -> Result<(), TransportError> {
        let len = data.len();
        transport.send_datagram(self.session_id, data)?;
        transport.flush().await;

        self.stats.datagrams += 1;
        tracing::trace!(session_id = %self.session_id, len, "echoed datagram");
        Ok(())
    }

    pub fn session_closed(&mut self) {
        tracing::debug!(
            session_id = %self.session_id,
            datagrams = self.stats.datagrams,
            "datagram echo session closed"
        );
    }
}
