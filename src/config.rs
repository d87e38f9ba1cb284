use std::{
    fs,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::{Path, PathBuf},
    time::Duration,
};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::ServerError;

/// Where the server listens unless told otherwise.
pub const DEFAULT_BIND: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 4433));

/// Allows specifying a class of congestion control algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum CongestionControl {
    /// Whatever quinn picks.
    #[default]
    Default,
    /// Cubic.
    Throughput,
    /// BBR.
    LowLatency,
}

/// Everything needed to run the echo server.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,

    /// PEM file with the certificate chain, leaf first.
    pub certificate: PathBuf,

    /// PEM file with the private key of the leaf certificate.
    pub private_key: PathBuf,

    /// Connections with no traffic for this long are dropped.
    pub idle_timeout: Duration,

    pub keep_alive: Duration,

    pub congestion: CongestionControl,

    /// Bytes of incoming datagrams buffered per connection, and the largest datagram accepted.
    pub datagram_buffer: usize,

    /// Events a connection can queue before its pumps wait for the supervisor.
    pub event_capacity: usize,
}

impl Config {
    /// A config with the default settings for the given certificate and key.
    pub fn new(certificate: impl Into<PathBuf>, private_key: impl Into<PathBuf>) -> Self {
        Self {
            bind: DEFAULT_BIND,
            certificate: certificate.into(),
            private_key: private_key.into(),
            idle_timeout: Duration::from_secs(30),
            keep_alive: Duration::from_secs(1),
            congestion: CongestionControl::Default,
            datagram_buffer: 65536,
            event_capacity: 1024,
        }
    }
}

/// Reads every certificate from a PEM file.
pub fn load_certificate_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let pem = read_pem(path)?;

    let chain = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ServerError::ReadPem {
            path: path.to_path_buf(),
            source,
        })?;

    if chain.is_empty() {
        return Err(ServerError::NoCertificate(path.to_path_buf()));
    }

    Ok(chain)
}

/// Reads the first private key from a PEM file. PKCS#1, PKCS#8 and SEC1 keys are accepted.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let pem = read_pem(path)?;

    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|source| ServerError::ReadPem {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| ServerError::NoPrivateKey(path.to_path_buf()))
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ServerError> {
    fs::read(path).map_err(|source| ServerError::ReadPem {
        path: path.to_path_buf(),
        source,
    })
}
