use bytes::Bytes;
#[cfg(test)] use mockall::automock;
use tokio::time::Instant;

/// The reliable-delivery engine that runs inside each channel: ordered, reliable,
///  byte-oriented delivery over the unreliable datagram fragments this crate
///  routes in and out. One instance exists per (session, channel); the engine
///  itself (sliding window, retransmission, segmentation) is not part of this
///  crate.
///
/// Wire segments the engine wants transmitted are *returned* from [ReliableStream::send]
///  and [ReliableStream::update] rather than pushed through an output callback, so
///  streams can be owned plainly by their session without back-references. The
///  endpoint wraps every returned segment with the session's pass and the channel
///  tag before it reaches the wire.
#[cfg_attr(test, automock)]
pub trait ReliableStream: Send + 'static {
    /// Feed one raw payload fragment that arrived from the wire into reassembly.
    fn input(&mut self, fragment: &[u8]);

    /// Accept one application message for ordered delivery to the peer. Returns
    ///  the wire segments that became ready immediately (an engine with send
    ///  batching may return nothing here and emit from `update` instead).
    fn send(&mut self, message: &[u8]) -> anyhow::Result<Vec<Bytes>>;

    /// Drive the engine's clock: retransmission timers, delayed sends. Returns
    ///  the wire segments that became ready.
    fn update(&mut self, now: Instant) -> Vec<Bytes>;

    /// Size of the next fully reassembled inbound message, if one is ready.
    fn peek_size(&mut self) -> Option<usize>;

    /// Move the next fully reassembled inbound message into `buf`, returning the
    ///  number of bytes written. `None` if nothing is ready (or `buf` is too
    ///  small - pair this with [ReliableStream::peek_size]).
    fn receive(&mut self, buf: &mut [u8]) -> Option<usize>;
}

#[cfg_attr(test, automock)]
pub trait ReliableStreamFactory: Send + Sync + 'static {
    fn create(&self, session_id: u32, channel: u8) -> Box<dyn ReliableStream>;
}
