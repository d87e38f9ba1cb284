//! A WebTransport echo server.
//!
//! WebTransport is layered on top of HTTP/3 which is then layered on top of QUIC.
//! A browser opens a session with an extended CONNECT request, and the request's path picks how
//! the server echoes:
//!
//! | Path | Echo |
//! |---|---|
//! | `/audio/echo/stream` | each unidirectional stream on a new one |
//! | `/video/echo/stream` | each unidirectional stream on a new one |
//! | `/audio/echo/datagram` | each datagram |
//! | `/video/echo/datagram` | each datagram |
//!
//! The audio and video labels only show up in logs.
//!
//! # Limitations
//!
//! WebTransport is able to be pooled with HTTP/3 and multiple WebTransport sessions.
//! This crate avoids that complexity: a connection carries exactly one session, and a second
//! CONNECT on the same connection closes it with `H3_GENERAL_PROTOCOL_ERROR`.
//! Clients that want another session should dial a new QUIC connection instead.
//!
//! # Layout
//!
//! Each connection gets a supervisor task. Pump tasks turn the connection's streams and
//! datagrams into [`Event`]s, which the supervisor hands one at a time to a [`Router`].
//! The router answers handshakes and passes everything else to the session's [`Handler`].
//! All outbound traffic goes through the [`Transport`] trait.

mod config;
mod connect;
mod echo;
mod error;
mod event;
mod frame;
mod handshake;
mod mode;
mod recv;
mod server;
mod session;
mod settings;
mod supervisor;
mod transport;

pub use config::*;
pub use connect::{read_request, write_response};
pub use echo::*;
pub use error::*;
pub use event::*;
pub use handshake::*;
pub use mode::*;
pub use recv::decode_datagram;
pub use server::*;
pub use session::*;
pub use settings::*;
pub use transport::*;

/// The HTTP/3 ALPN is required when negotiating a QUIC connection.
pub const ALPN_H3: &str = "h3";

/// Re-export the http crate because it's in the public API.
pub use http;
