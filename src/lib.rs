//! A session-oriented, multiplexed transport for latency-sensitive client/server
//!  applications on top of UDP.
//!
//! ## Design goals
//!
//! Plain UDP is connectionless, unordered and spoofable. This crate adds the three
//!  things a client/server application actually needs from a "connection", while
//!  staying out of the way of the reliability engine that runs inside it:
//! * Establish an authenticated session between an anonymous client and a listening
//!   server without a TCP-style handshake protocol
//!   * the server issues an 8-byte credential (the *pass*: session id + session key)
//!     in response to an anonymous request, and promotes the requester to a session
//!     only once it echoes the full credential back - a sender that spoofed its
//!     source address never sees the key and never gets a session
//! * Survive client address changes (NAT rebinding, network switches) without
//!   losing session state
//!   * any datagram carrying a session's exact credential re-points the session to
//!     its source address; session identity is the pass, not the address
//! * Carry up to 256 independent ordered byte-streams ("channels") over one UDP
//!   socket per session
//!   * channels are identified by a single tag byte and created lazily on first
//!     use, on both the sending and the receiving side
//!   * per-channel reliable delivery (ARQ, retransmission, reassembly) is *not*
//!     part of this crate - it is plugged in through the [reliable::ReliableStream]
//!     trait, one instance per (session, channel)
//! * No internal threads and no blocking calls: everything is driven by an external
//!   periodic `tick(now)` on a single scheduling context, with non-blocking polled
//!   socket I/O. Events (session established / message / session lost) are returned
//!   from `tick` for the host to drain.
//!
//! ## Wire format
//!
//! All datagrams start with the 8-byte pass, fields in little-endian byte order:
//!
//! ```ascii
//! 0:  session id (u32) - 0 means "no credential" (anonymous request)
//! 4:  session key (u32)
//! ```
//!
//! What follows depends on total datagram length and framing mode:
//!
//! ```ascii
//! len == 8:  control datagram - a handshake step or a heartbeat, no payload
//! len >= 9:  multiplexed framing:
//!              8:   channel tag (u8)
//!              9..: reliable-stream payload fragment for that channel
//!                    (may be empty: an explicit heartbeat on that channel)
//!            legacy framing (single-stream peers):
//!              8..: reliable-stream payload fragment, implicitly channel 0
//! len < 8:   malformed - discarded without a reply
//! ```
//!
//! ## Handshake
//!
//! ```ascii
//! client                                server
//!   | ---- {id: 0, key: 0}  ------------> |   anonymous request (probe)
//!   | <--- {id: n, key: k}  ------------- |   pending pass issued for the source address
//!   | ---- {id: n, key: k}  ------------> |   confirmation: pending -> session, established
//!   | <==== heartbeats / channel data ==> |   both sides heartbeat every interval;
//!   |                                     |   8s without inbound traffic evicts
//! ```
//!
//! The pending reply is idempotent: every anonymous request from an address is
//!  answered with that address's current pending pass, so lost replies are covered
//!  by the client's probe cadence.

pub mod pass;
pub mod wire;
pub mod config;
pub mod event;
pub mod transport;
pub mod reliable;
pub mod channel;
pub mod server;
pub mod client;
pub mod util;
pub mod test_util;
