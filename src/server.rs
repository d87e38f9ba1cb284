use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use n0_future::{boxed::BoxFuture, FuturesUnordered, StreamExt};
use quinn::{crypto::rustls::QuicServerConfig, TransportConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::{
    code, config, supervisor, CongestionControl, Config, ServerError, ALPN_H3, DEFAULT_BIND,
};

/// Construct an echo [Server] using sane defaults.
///
/// This is optional; most users want [Server::bind].
pub struct ServerBuilder {
    addr: SocketAddr,
    transport_config: TransportConfig,
    idle_timeout: Duration,
    event_capacity: usize,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    /// Create a server builder with sane defaults.
    pub fn new() -> Self {
        let mut transport_config = TransportConfig::default();
        transport_config.keep_alive_interval(Some(Duration::from_secs(1)));
        transport_config.datagram_receive_buffer_size(Some(65536));

        Self {
            addr: DEFAULT_BIND,
            transport_config,
            idle_timeout: Duration::from_secs(30),
            event_capacity: 1024,
        }
    }

    /// Everything but the certificate and key, taken from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_addr(config.bind)
            .with_idle_timeout(config.idle_timeout)
            .with_keep_alive(config.keep_alive)
            .with_congestion_control(config.congestion)
            .with_datagram_buffer(config.datagram_buffer)
            .with_event_capacity(config.event_capacity)
    }

    /// Listen on the specified address.
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Enable the specified congestion controller.
    pub fn with_congestion_control(mut self, algorithm: CongestionControl) -> Self {
        match algorithm {
            CongestionControl::LowLatency => {
                let cc = Arc::new(quinn::congestion::BbrConfig::default());
                self.transport_config.congestion_controller_factory(cc);
            }
            CongestionControl::Throughput => {
                let cc = Arc::new(quinn::congestion::CubicConfig::default());
                self.transport_config.congestion_controller_factory(cc);
            }
            CongestionControl::Default => {}
        };
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.transport_config.keep_alive_interval(Some(interval));
        self
    }

    /// Limits both the buffered and the largest accepted datagram.
    pub fn with_datagram_buffer(mut self, size: usize) -> Self {
        self.transport_config.datagram_receive_buffer_size(Some(size));
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Binds the endpoint. Must be called from within a tokio runtime.
    pub fn build(
        mut self,
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Server, ServerError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut tls = rustls::ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .with_no_client_auth()
            .with_single_cert(chain, key)?;
        tls.alpn_protocols = vec![ALPN_H3.as_bytes().to_vec()];

        let idle_timeout = self
            .idle_timeout
            .try_into()
            .map_err(|_| ServerError::InvalidIdleTimeout(self.idle_timeout))?;
        self.transport_config.max_idle_timeout(Some(idle_timeout));

        let crypto = QuicServerConfig::try_from(tls)?;
        let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(crypto));
        server_config.transport_config(Arc::new(self.transport_config));

        let endpoint =
            quinn::Endpoint::server(server_config, self.addr).map_err(ServerError::Bind)?;

        Ok(Server::new(endpoint, self.event_capacity))
    }
}

/// An echo server: accepts QUIC connections and runs each in its own task.
pub struct Server {
    endpoint: quinn::Endpoint,
    event_capacity: usize,
    handshakes: FuturesUnordered<BoxFuture<Result<quinn::Connection, quinn::ConnectionError>>>,
}

impl Server {
    /// Loads the certificate and key named by `config` and binds its address.
    pub fn bind(config: &Config) -> Result<Self, ServerError> {
        let chain = config::load_certificate_chain(&config.certificate)?;
        let key = config::load_private_key(&config.private_key)?;

        ServerBuilder::from_config(config).build(chain, key)
    }

    /// Creates a new server with a manually constructed [`quinn::Endpoint`].
    ///
    /// The endpoint must negotiate [`ALPN_H3`].
    pub fn new(endpoint: quinn::Endpoint, event_capacity: usize) -> Self {
        Self {
            endpoint,
            event_capacity,
            handshakes: Default::default(),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Accept the next established QUIC connection, or `None` once the endpoint is closed.
    ///
    /// QUIC handshakes run concurrently, so a slow client doesn't hold up the others.
    pub async fn accept(&mut self) -> Option<quinn::Connection> {
        loop {
            tokio::select! {
                res = self.endpoint.accept() => {
                    let incoming = res?;
                    self.handshakes.push(Box::pin(async move { incoming.await }));
                }
                Some(res) = self.handshakes.next() => {
                    match res {
                        Ok(conn) => return Some(conn),
                        Err(err) => tracing::debug!("QUIC handshake failed: {err}"),
                    }
                }
            }
        }
    }

    /// Serves connections until the endpoint is closed.
    pub async fn run(&mut self) {
        if let Ok(addr) = self.local_addr() {
            tracing::info!(%addr, "listening");
        }

        while let Some(conn) = self.accept().await {
            tokio::spawn(supervisor::run(conn, self.event_capacity));
        }

        tracing::info!("endpoint closed");
    }

    /// Stops accepting and closes every connection.
    pub fn close(&self) {
        self.endpoint
            .close(quinn::VarInt::from_u32(code::H3_NO_ERROR), b"server shutting down");
    }

    /// Waits until every connection has been closed cleanly, or timed out.
    pub async fn wait_idle(&self) {
        self.endpoint.wait_idle().await
    }
}
