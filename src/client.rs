use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::bail;
use bytes::BytesMut;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use crate::channel::ChannelSet;
use crate::config::ClientConfig;
use crate::event::ClientEvent;
use crate::pass::Pass;
use crate::reliable::ReliableStreamFactory;
use crate::transport::{send_frame, DatagramTransport, UdpTransport};
use crate::wire::{Frame, FramingMode};

struct ActiveState {
    transport: Box<dyn DatagramTransport>,
    /// [Pass::NONE] while unauthenticated - which makes the periodic heartbeat
    ///  double as the anonymous credential request
    pass: Pass,
    /// `None` until the first authenticated datagram arrives
    last_recv: Option<Instant>,
    /// `None` forces a probe/heartbeat on the next tick
    last_heartbeat_sent: Option<Instant>,
    channels: ChannelSet,
    recv_buf: Vec<u8>,
    send_buf: BytesMut,
}

/// The client endpoint: mirror of the server's state machine for a single session
///  with a single configured server.
///
/// From activation the client probes with a zero credential on the heartbeat
///  cadence. The first datagram that comes back carries its pass; from then on it
///  heartbeats with that pass, accepts only datagrams carrying it, and multiplexes
///  channels exactly like the server side. If the server goes silent past the
///  timeout limit the client drops its credential and starts probing again - a
///  fresh registration, with a fresh session id, happens transparently.
pub struct Client {
    config: ClientConfig,
    stream_factory: Arc<dyn ReliableStreamFactory>,
    active: Option<ActiveState>,
}

impl Client {
    pub fn new(config: ClientConfig, stream_factory: Arc<dyn ReliableStreamFactory>) -> Client {
        Client {
            config,
            stream_factory,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.active.as_ref().map(|s| s.pass.is_valid()).unwrap_or(false)
    }

    /// The session id issued by the server, once authenticated.
    pub fn session_id(&self) -> Option<u32> {
        self.active.as_ref()
            .filter(|s| s.pass.is_valid())
            .map(|s| s.pass.id)
    }

    /// Binds an ephemeral UDP socket and starts probing the configured server.
    ///  Activating an active client is a no-op.
    pub async fn activate(&mut self) -> anyhow::Result<()> {
        if self.active.is_some() {
            return Ok(());
        }
        self.config.validate()?;
        let bind_addr: SocketAddr = if self.config.server_addr.is_ipv6() {
            "[::]:0".parse()?
        }
        else {
            "0.0.0.0:0".parse()?
        };
        let transport = UdpTransport::bind(bind_addr).await?;
        self.activate_with(Box::new(transport));
        Ok(())
    }

    /// Same as [Client::activate], but over a caller-provided transport.
    pub fn activate_with(&mut self, transport: Box<dyn DatagramTransport>) {
        if self.active.is_some() {
            return;
        }
        info!("client activated, probing {:?}", self.config.server_addr);
        self.active = Some(ActiveState {
            transport,
            pass: Pass::NONE,
            last_recv: None,
            last_heartbeat_sent: None,
            channels: ChannelSet::new(0),
            recv_buf: vec![0; self.config.recv_buffer_size],
            send_buf: BytesMut::new(),
        });
    }

    /// Drops the session (reporting it if one was established) and releases the
    ///  socket.
    pub fn deactivate(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        if let Some(state) = self.active.take() {
            if state.pass.is_valid() {
                events.push(ClientEvent::Disconnected);
            }
            info!("client deactivated");
        }
        events
    }

    /// Queues one message for ordered, reliable delivery on a channel. Fails until
    ///  the registration handshake has completed.
    pub fn send(&mut self, channel: u8, message: &[u8]) -> anyhow::Result<()> {
        let Some(state) = &mut self.active else {
            bail!("client is not active");
        };
        if !state.pass.is_valid() {
            bail!("no session credential yet");
        }
        if self.config.framing == FramingMode::Legacy && channel != 0 {
            bail!("legacy framing carries a single implicit channel - cannot send on channel {}", channel);
        }

        let segments = state.channels.send(channel, message, self.stream_factory.as_ref())?;
        let pass = state.pass;
        for segment in segments {
            send_frame(
                state.transport.as_ref(),
                &mut state.send_buf,
                self.config.framing,
                &Frame::Payload { pass, channel, payload: segment },
                self.config.server_addr,
            );
        }
        Ok(())
    }

    /// One scheduling tick: stream clocks, heartbeat/probe, inbound drain, message
    ///  delivery, timeout supervision - in that order.
    pub fn tick(&mut self, now: Instant) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        let Some(state) = &mut self.active else {
            return events;
        };

        // stream clocks (channels only exist while authenticated)
        for (channel, segment) in state.channels.update_all(now) {
            send_frame(
                state.transport.as_ref(),
                &mut state.send_buf,
                self.config.framing,
                &Frame::Payload { pass: state.pass, channel, payload: segment },
                self.config.server_addr,
            );
        }

        // heartbeat - or, with a zero pass, the anonymous credential request
        let due = match state.last_heartbeat_sent {
            Some(at) => now.duration_since(at) > self.config.heartbeat_interval,
            None => true,
        };
        if due && send_frame(
            state.transport.as_ref(),
            &mut state.send_buf,
            self.config.framing,
            &Frame::Control { pass: state.pass },
            self.config.server_addr,
        ) {
            state.last_heartbeat_sent = Some(now);
        }

        // inbound drain
        loop {
            let (num_read, _from) = match state.transport.try_recv_from(&mut state.recv_buf) {
                Some(x) => x,
                None => break,
            };

            let frame = match Frame::deser(self.config.framing, &state.recv_buf[..num_read]) {
                Ok(frame) => frame,
                Err(_) => {
                    debug!("malformed datagram - dropping");
                    continue;
                }
            };

            // whatever reaches this socket first is the server's answer to our
            //  probe - adopt it (the socket only converses with one server)
            if !state.pass.is_valid() {
                state.pass = frame.pass();
                if state.pass.is_valid() {
                    info!("adopted pass {} from server", state.pass.id);
                    state.channels = ChannelSet::new(state.pass.id);
                    events.push(ClientEvent::Connected { session_id: state.pass.id });
                }
            }

            if state.pass.is_valid() && frame.pass() == state.pass {
                state.last_recv = Some(now);
                if let Frame::Payload { channel, payload, .. } = frame {
                    state.channels.input(channel, &payload, self.stream_factory.as_ref());
                }
            }
        }

        // message delivery
        state.channels.drain_received(|channel, payload| {
            events.push(ClientEvent::Message { channel, payload });
        });

        // timeout supervision - falls back to probing, does not deactivate
        if state.pass.is_valid() {
            if let Some(last_recv) = state.last_recv {
                if now.duration_since(last_recv) > self.config.timeout_limit {
                    warn!("session {} timed out - dropping credential", state.pass.id);
                    state.pass = Pass::NONE;
                    state.last_recv = None;
                    state.channels = ChannelSet::new(0);
                    events.push(ClientEvent::Disconnected);
                }
            }
        }

        events
    }
}
