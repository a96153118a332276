use bytes::Bytes;

/// Events a server endpoint hands to the host application. They are returned from
///  [crate::server::Server::tick] (and [crate::server::Server::deactivate]) in the
///  order they occurred; the host drains them once per tick.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ServerEvent {
    /// A client completed the registration handshake.
    SessionEstablished {
        session_id: u32,
    },
    /// A fully reassembled message arrived on one of a session's channels.
    ///  Per-channel order is the reliable stream's delivery order; order across
    ///  channels is unspecified.
    Message {
        session_id: u32,
        channel: u8,
        payload: Bytes,
    },
    /// The session timed out or the endpoint was deactivated.
    SessionLost {
        session_id: u32,
    },
}

/// Client-side mirror of [ServerEvent].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClientEvent {
    /// The server issued a credential and this client adopted it.
    Connected {
        session_id: u32,
    },
    Message {
        channel: u8,
        payload: Bytes,
    },
    /// The server went silent past the timeout limit (or the endpoint was
    ///  deactivated). The client falls back to anonymous probing afterwards.
    Disconnected,
}
