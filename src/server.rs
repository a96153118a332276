use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::bail;
use bytes::BytesMut;
use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::{debug, info, span, trace, warn, Level};
use uuid::Uuid;
use crate::channel::ChannelSet;
use crate::config::ServerConfig;
use crate::event::ServerEvent;
use crate::pass::Pass;
use crate::reliable::ReliableStreamFactory;
use crate::transport::{send_frame, DatagramTransport, UdpTransport};
use crate::util::random::{PassRandom, RngPassRandom};
use crate::wire::{Frame, FramingMode};

/// An address that requested a credential but has not echoed it back yet. This is
///  ephemeral proof-of-request state: no heartbeats, no channels, evicted on the
///  same timeout limit as sessions.
struct PendingSession {
    pass: Pass,
    created_at: Instant,
}

struct Session {
    pass: Pass,
    /// the most recent authenticated source address - mutable, since a client may
    ///  resurface from a new address after NAT rebinding
    peer_addr: SocketAddr,
    last_recv: Instant,
    /// `None` forces a heartbeat on the next tick
    last_heartbeat_sent: Option<Instant>,
    channels: ChannelSet,
}

/// Everything that only exists while the server is bound to a socket. Dropping it
///  *is* deactivation: sessions, pending entries and their streams go with it.
struct ActiveState {
    transport: Box<dyn DatagramTransport>,
    pending: FxHashMap<SocketAddr, PendingSession>,
    sessions: FxHashMap<u32, Session>,
    next_session_id: u32,
    recv_buf: Vec<u8>,
    send_buf: BytesMut,
}

/// The server endpoint: owns the session and pending-session tables and runs the
///  registration handshake, address redirection, liveness supervision and channel
///  demultiplexing over a single datagram socket.
///
/// All state lives in this one object; the host drives it with periodic
///  [Server::tick] calls from a single scheduling context and drains the returned
///  events. Nothing here blocks, and nothing here reads the clock - `now` is
///  threaded in from outside.
pub struct Server<R: PassRandom = RngPassRandom> {
    config: ServerConfig,
    stream_factory: Arc<dyn ReliableStreamFactory>,
    active: Option<ActiveState>,
    pd: PhantomData<R>,
}

impl Server<RngPassRandom> {
    pub fn new(config: ServerConfig, stream_factory: Arc<dyn ReliableStreamFactory>) -> Server<RngPassRandom> {
        Self::new_with_random(config, stream_factory)
    }
}

impl<R: PassRandom> Server<R> {
    pub fn new_with_random(config: ServerConfig, stream_factory: Arc<dyn ReliableStreamFactory>) -> Server<R> {
        Server {
            config,
            stream_factory,
            active: None,
            pd: PhantomData,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Binds the configured UDP socket and starts accepting registrations. A bind
    ///  failure leaves the server inactive. Activating an active server is a no-op.
    pub async fn activate(&mut self) -> anyhow::Result<()> {
        if self.active.is_some() {
            return Ok(());
        }
        self.config.validate()?;
        let transport = UdpTransport::bind(self.config.bind_addr).await?;
        self.activate_with(Box::new(transport));
        Ok(())
    }

    /// Same as [Server::activate], but over a caller-provided transport. This is
    ///  the seam for tests and for tunneling the protocol through something other
    ///  than a plain UDP socket.
    pub fn activate_with(&mut self, transport: Box<dyn DatagramTransport>) {
        if self.active.is_some() {
            return;
        }
        info!("server activated on {:?}", transport.local_addr());
        self.active = Some(ActiveState {
            transport,
            pending: FxHashMap::default(),
            sessions: FxHashMap::default(),
            next_session_id: 1,
            recv_buf: vec![0; self.config.recv_buffer_size],
            send_buf: BytesMut::new(),
        });
    }

    /// Immediately destroys all sessions (reporting each as lost) and releases the
    ///  socket. There is no graceful drain.
    pub fn deactivate(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        if let Some(state) = self.active.take() {
            for session_id in state.sessions.keys() {
                events.push(ServerEvent::SessionLost { session_id: *session_id });
            }
            info!("server deactivated");
        }
        events
    }

    pub fn num_sessions(&self) -> usize {
        self.active.as_ref().map(|s| s.sessions.len()).unwrap_or(0)
    }

    pub fn num_pending(&self) -> usize {
        self.active.as_ref().map(|s| s.pending.len()).unwrap_or(0)
    }

    pub fn session_peer_addr(&self, session_id: u32) -> Option<SocketAddr> {
        self.active.as_ref()?.sessions.get(&session_id).map(|s| s.peer_addr)
    }

    /// Queues one message for ordered, reliable delivery on one of the session's
    ///  channels, creating the channel on first use. Wire segments the stream
    ///  produces right away are sent in this call; the rest follow from `tick`.
    pub fn send(&mut self, session_id: u32, channel: u8, message: &[u8]) -> anyhow::Result<()> {
        let Some(state) = &mut self.active else {
            bail!("server is not active");
        };
        if self.config.framing == FramingMode::Legacy && channel != 0 {
            bail!("legacy framing carries a single implicit channel - cannot send on channel {}", channel);
        }
        let Some(session) = state.sessions.get_mut(&session_id) else {
            bail!("no session {}", session_id);
        };

        let segments = session.channels.send(channel, message, self.stream_factory.as_ref())?;
        let (pass, peer_addr) = (session.pass, session.peer_addr);
        for segment in segments {
            send_frame(
                state.transport.as_ref(),
                &mut state.send_buf,
                self.config.framing,
                &Frame::Payload { pass, channel, payload: segment },
                peer_addr,
            );
        }
        Ok(())
    }

    /// One scheduling tick. Phases run in a fixed order: stream clocks, heartbeats,
    ///  inbound drain, pending expiry, session expiry, message delivery. Inbound
    ///  datagrams are fully drained before any delivery event is emitted, so a
    ///  burst arriving within one tick is ingested as a whole.
    pub fn tick(&mut self, now: Instant) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        let Some(state) = &mut self.active else {
            return events;
        };

        state.update_stream_clocks(self.config.framing, now);
        state.send_heartbeats(&self.config, now);
        state.drain_inbound::<R>(&self.config, self.stream_factory.as_ref(), now, &mut events);
        state.expire_pending(&self.config, now);
        state.expire_sessions(&self.config, now, &mut events);
        state.deliver_messages(&mut events);

        events
    }
}

impl ActiveState {
    fn update_stream_clocks(&mut self, framing: FramingMode, now: Instant) {
        for session in self.sessions.values_mut() {
            for (channel, segment) in session.channels.update_all(now) {
                send_frame(
                    self.transport.as_ref(),
                    &mut self.send_buf,
                    framing,
                    &Frame::Payload { pass: session.pass, channel, payload: segment },
                    session.peer_addr,
                );
            }
        }
    }

    fn send_heartbeats(&mut self, config: &ServerConfig, now: Instant) {
        for session in self.sessions.values_mut() {
            let due = match session.last_heartbeat_sent {
                Some(at) => now.duration_since(at) > config.heartbeat_interval,
                None => true,
            };
            // an unsent heartbeat is retried next tick, it does not tear anything down
            if due && send_frame(
                self.transport.as_ref(),
                &mut self.send_buf,
                config.framing,
                &Frame::Control { pass: session.pass },
                session.peer_addr,
            ) {
                session.last_heartbeat_sent = Some(now);
            }
        }
    }

    fn drain_inbound<R: PassRandom>(
        &mut self,
        config: &ServerConfig,
        stream_factory: &dyn ReliableStreamFactory,
        now: Instant,
        events: &mut Vec<ServerEvent>,
    ) {
        loop {
            let (num_read, from) = match self.transport.try_recv_from(&mut self.recv_buf) {
                Some(x) => x,
                None => break,
            };

            let correlation_id = Uuid::new_v4();
            let span = span!(Level::TRACE, "datagram_received", ?correlation_id);
            let _entered = span.enter();

            let frame = match Frame::deser(config.framing, &self.recv_buf[..num_read]) {
                Ok(frame) => frame,
                Err(_) => {
                    debug!("malformed datagram from {:?} - dropping", from);
                    continue;
                }
            };

            if frame.pass().id == 0 {
                self.handle_anonymous::<R>(config, from, now);
            }
            else {
                self.handle_credentialed(stream_factory, frame, from, now, events);
            }
        }
    }

    /// An anonymous request: make sure the address has a pending credential and
    ///  reply with it. The reply is idempotent - a retrying client gets the same
    ///  pass again until it either confirms or the pending entry expires.
    fn handle_anonymous<R: PassRandom>(&mut self, config: &ServerConfig, from: SocketAddr, now: Instant) {
        let next_session_id = &mut self.next_session_id;
        let pending = self.pending.entry(from).or_insert_with(|| {
            let id = *next_session_id;
            *next_session_id += 1;
            let key = loop {
                let key = R::next_u32();
                if key != 0 {
                    break key;
                }
            };
            info!("issuing pending pass {} for {:?}", id, from);
            PendingSession {
                pass: Pass { id, key },
                created_at: now,
            }
        });

        let pass = pending.pass;
        if send_frame(self.transport.as_ref(), &mut self.send_buf, config.framing, &Frame::Control { pass }, from) {
            debug!("sent pending pass {} to {:?}", pass.id, from);
        }
    }

    fn handle_credentialed(
        &mut self,
        stream_factory: &dyn ReliableStreamFactory,
        frame: Frame,
        from: SocketAddr,
        now: Instant,
        events: &mut Vec<ServerEvent>,
    ) {
        let pass = frame.pass();

        // redirect: the full credential from a new address re-points the session.
        //  Id alone is not enough - the key is what makes this rebinding-tolerant
        //  without being hijackable.
        if let Some(session) = self.sessions.get_mut(&pass.id) {
            if session.pass == pass && session.peer_addr != from {
                info!("redirecting session {} to {:?}", pass.id, from);
                session.peer_addr = from;
            }
        }

        // register: promote a pending entry whose credential is echoed back exactly
        let registration_valid = self.pending.get(&from)
            .map(|pending| pending.pass == pass)
            .unwrap_or(false);
        if registration_valid {
            if self.sessions.contains_key(&pass.id) {
                // id reuse before the old session timed out; never overwrite a live
                //  session, the pending entry expires on its own
                warn!("registration for pass {} collides with a live session - ignoring", pass.id);
            }
            else {
                self.pending.remove(&from);
                info!("registering session {} for {:?}", pass.id, from);
                self.sessions.insert(pass.id, Session {
                    pass,
                    peer_addr: from,
                    last_recv: now,
                    last_heartbeat_sent: None,
                    channels: ChannelSet::new(pass.id),
                });
                events.push(ServerEvent::SessionEstablished { session_id: pass.id });
            }
        }

        // an authenticated datagram refreshes liveness; if it carries payload bytes,
        //  they are routed into the addressed channel
        if let Some(session) = self.sessions.get_mut(&pass.id) {
            if session.pass == pass {
                session.last_recv = now;
                if let Frame::Payload { channel, payload, .. } = frame {
                    session.channels.input(channel, &payload, stream_factory);
                }
                return;
            }
        }

        // no reply for unknown or mismatched credentials: not leaking which ids
        //  exist is part of the handshake's spoof resistance
        trace!("unauthorized datagram for pass {} from {:?} - dropping", pass.id, from);
    }

    fn expire_pending(&mut self, config: &ServerConfig, now: Instant) {
        self.pending.retain(|addr, pending| {
            if now.duration_since(pending.created_at) > config.timeout_limit {
                info!("pending pass {} for {:?} timed out", pending.pass.id, addr);
                false
            }
            else {
                true
            }
        });
    }

    fn expire_sessions(&mut self, config: &ServerConfig, now: Instant, events: &mut Vec<ServerEvent>) {
        let expired = self.sessions.iter()
            .filter(|(_, session)| now.duration_since(session.last_recv) > config.timeout_limit)
            .map(|(session_id, _)| *session_id)
            .collect::<Vec<_>>();

        for session_id in expired {
            self.sessions.remove(&session_id);
            info!("session {} timed out", session_id);
            events.push(ServerEvent::SessionLost { session_id });
        }
    }

    fn deliver_messages(&mut self, events: &mut Vec<ServerEvent>) {
        for (session_id, session) in self.sessions.iter_mut() {
            session.channels.drain_received(|channel, payload| {
                events.push(ServerEvent::Message {
                    session_id: *session_id,
                    channel,
                    payload,
                });
            });
        }
    }
}
