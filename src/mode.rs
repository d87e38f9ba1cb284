use std::fmt;

/// The media label carried by a route. It selects a route only; both labels echo identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Media {
    Audio,
    Video,
}

impl Media {
    pub fn as_str(self) -> &'static str {
        match self {
            Media::Audio => "audio",
            Media::Video => "video",
        }
    }
}

/// How a session's payload travels back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// Each inbound unidirectional stream is echoed on a new outbound one.
    Stream,
    /// Each inbound datagram is echoed as a datagram.
    Datagram,
}

/// One of the four echo modes, selected by the CONNECT request's `:path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EchoMode {
    AudioStream,
    VideoStream,
    AudioDatagram,
    VideoDatagram,
}

impl EchoMode {
    /// Every routable mode, in routing table order.
    pub const ALL: [EchoMode; 4] = [
        EchoMode::AudioStream,
        EchoMode::VideoStream,
        EchoMode::AudioDatagram,
        EchoMode::VideoDatagram,
    ];

    /// Look up a path in the routing table. Matching is exact and case-sensitive.
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.path() == path)
    }

    pub fn path(self) -> &'static str {
        match self {
            EchoMode::AudioStream => "/audio/echo/stream",
            EchoMode::VideoStream => "/video/echo/stream",
            EchoMode::AudioDatagram => "/audio/echo/datagram",
            EchoMode::VideoDatagram => "/video/echo/datagram",
        }
    }

    pub fn media(self) -> Media {
        match self {
            EchoMode::AudioStream | EchoMode::AudioDatagram => Media::Audio,
            EchoMode::VideoStream | EchoMode::VideoDatagram => Media::Video,
        }
    }

    pub fn delivery(self) -> Delivery {
        match self {
            EchoMode::AudioStream | EchoMode::VideoStream => Delivery::Stream,
            EchoMode::AudioDatagram | EchoMode::VideoDatagram => Delivery::Datagram,
        }
    }
}

impl fmt::Display for EchoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let delivery = match self.delivery() {
            Delivery::Stream => "stream",
            Delivery::Datagram => "datagram",
        };
        write!(f, "{}-{}", self.media().as_str(), delivery)
    }
}
