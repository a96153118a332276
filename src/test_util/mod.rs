//! In-memory doubles for the two collaborator seams - a datagram network and a
//!  reliable stream - used by this crate's own tests and demos. They are regular
//!  (non-`#[cfg(test)]`) modules so that applications embedding the protocol can
//!  test against them as well.

pub mod net;
pub mod stream;


#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;
    use bytes::Bytes;
    use tokio::time::Instant;
    use crate::client::Client;
    use crate::config::{ClientConfig, ServerConfig};
    use crate::event::{ClientEvent, ServerEvent};
    use crate::server::Server;
    use crate::test_util::net::TestNet;
    use crate::test_util::stream::DirectStreamFactory;

    fn server_addr() -> SocketAddr {
        SocketAddr::from_str("10.9.0.1:25565").unwrap()
    }

    fn client_addr() -> SocketAddr {
        SocketAddr::from_str("10.9.0.2:40000").unwrap()
    }

    /// The full lifecycle over an in-memory network, with both endpoints running
    ///  the real state machines: anonymous probe, credential issue, confirmation,
    ///  established sessions on both sides, channel messaging in both directions,
    ///  eviction after silence, and transparent re-registration.
    #[test]
    fn test_session_lifecycle_end_to_end() {
        let net = TestNet::new();

        let mut server = Server::new(ServerConfig::new(server_addr()), Arc::new(DirectStreamFactory));
        server.activate_with(Box::new(net.attach(server_addr())));
        let mut client = Client::new(ClientConfig::new(server_addr()), Arc::new(DirectStreamFactory));
        client.activate_with(Box::new(net.attach(client_addr())));

        // anonymous probe -> pending pass -> adoption
        let t0 = Instant::now();
        assert!(client.tick(t0).is_empty());
        assert!(server.tick(t0).is_empty());
        assert_eq!(client.tick(t0), vec![ClientEvent::Connected { session_id: 1 }]);
        assert_eq!(server.num_sessions(), 0);

        // the client's next heartbeat echoes the credential and registers
        let t1 = t0 + Duration::from_millis(1500);
        assert!(client.tick(t1).is_empty());
        assert_eq!(server.tick(t1), vec![ServerEvent::SessionEstablished { session_id: 1 }]);
        assert_eq!(server.num_sessions(), 1);
        assert_eq!(server.session_peer_addr(1), Some(client_addr()));

        // channel messaging, both directions, channels kept apart
        let t2 = t1 + Duration::from_millis(1200);
        client.send(3, b"ping").unwrap();
        client.send(7, b"aux").unwrap();
        let mut events = server.tick(t2);
        events.sort_by_key(|e| match e {
            ServerEvent::Message { channel, .. } => *channel,
            _ => 0,
        });
        assert_eq!(events, vec![
            ServerEvent::Message { session_id: 1, channel: 3, payload: Bytes::from_static(b"ping") },
            ServerEvent::Message { session_id: 1, channel: 7, payload: Bytes::from_static(b"aux") },
        ]);

        server.send(1, 3, b"pong").unwrap();
        let events = client.tick(t2);
        assert_eq!(events, vec![ClientEvent::Message { channel: 3, payload: Bytes::from_static(b"pong") }]);

        // the client goes silent; the server drains what is already queued, then
        //  evicts after the timeout limit
        assert!(server.tick(t2).is_empty());
        let t3 = t2 + Duration::from_secs(9);
        assert_eq!(server.tick(t3), vec![ServerEvent::SessionLost { session_id: 1 }]);
        assert_eq!(server.num_sessions(), 0);

        // the client sees the server's parting heartbeat, then silence, and drops
        //  its credential too
        let t4 = t3 + Duration::from_secs(9);
        assert!(client.tick(t4).is_empty());
        let t5 = t4 + Duration::from_secs(9);
        assert_eq!(client.tick(t5), vec![ClientEvent::Disconnected]);

        // re-registration happens transparently, with a fresh session id
        let t6 = t5 + Duration::from_secs(2);
        assert!(client.tick(t6).is_empty());
        assert!(server.tick(t6).is_empty());
        assert_eq!(client.tick(t6), vec![ClientEvent::Connected { session_id: 2 }]);
        let t7 = t6 + Duration::from_millis(1500);
        assert!(client.tick(t7).is_empty());
        assert_eq!(server.tick(t7), vec![ServerEvent::SessionEstablished { session_id: 2 }]);
    }

    /// Registration must survive a lossy start: the client keeps probing until a
    ///  pending reply makes it through, and the server re-issues the same pending
    ///  pass for every repeated probe.
    #[test]
    fn test_handshake_survives_lost_server_replies() {
        use crate::pass::Pass;
        use crate::transport::DatagramTransport;
        use crate::wire::{Frame, FramingMode};

        let net = TestNet::new();
        let mut server = Server::new(ServerConfig::new(server_addr()), Arc::new(DirectStreamFactory));
        server.activate_with(Box::new(net.attach(server_addr())));

        let probe = {
            let mut buf = bytes::BytesMut::new();
            Frame::Control { pass: Pass::NONE }.ser(FramingMode::Multiplexed, &mut buf);
            buf.to_vec()
        };

        // the client is not attached yet: everything the server sends vanishes,
        //  like UDP to a host behind a dropping NAT
        let flaky_client = SocketAddr::from_str("10.9.0.3:40001").unwrap();
        let t0 = Instant::now();
        net.inject(flaky_client, server_addr(), &probe);
        server.tick(t0);
        net.inject(flaky_client, server_addr(), &probe);
        server.tick(t0 + Duration::from_secs(1));
        assert_eq!(server.num_pending(), 1);

        // now the route exists; one more probe gets the pending pass through
        let client_transport = net.attach(flaky_client);
        net.inject(flaky_client, server_addr(), &probe);
        server.tick(t0 + Duration::from_secs(2));

        let mut buf = [0u8; 64];
        let (num_read, from) = client_transport.try_recv_from(&mut buf).unwrap();
        assert_eq!(from, server_addr());

        // echoing it back registers - proving the re-issued reply carried the
        //  original credential
        net.inject(flaky_client, server_addr(), &buf[..num_read]);
        let events = server.tick(t0 + Duration::from_secs(3));
        assert_eq!(events, vec![ServerEvent::SessionEstablished { session_id: 1 }]);
    }
}
