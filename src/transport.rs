use std::io::ErrorKind;
use std::net::SocketAddr;
use bytes::BytesMut;
#[cfg(test)] use mockall::automock;
use tokio::net::UdpSocket;
use tracing::{error, info, warn};
use crate::wire::{Frame, FramingMode};

/// This is an abstraction for non-blocking datagram I/O, introduced to facilitate
///  mocking the socket away for testing (and to let applications tunnel the
///  protocol through something other than a UDP socket).
///
/// Both operations are polled: absence of inbound data is a regular `None`, and a
///  send that could not be completed reports `false` without blocking. Neither is
///  an error condition for the protocol - a failed send is simply retried by the
///  next heartbeat cycle.
#[cfg_attr(test, automock)]
pub trait DatagramTransport: Send + 'static {
    fn send_to(&self, packet: &[u8], to: SocketAddr) -> bool;

    fn try_recv_from(&self, buf: &mut [u8]) -> Option<(usize, SocketAddr)>;

    fn local_addr(&self) -> Option<SocketAddr>;
}

/// The production transport: a tokio UDP socket polled through its `try_*` API.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<UdpTransport> {
        let socket = UdpSocket::bind(addr).await?;
        info!("bound UDP socket to {:?}", socket.local_addr()?);
        Ok(UdpTransport {
            socket,
        })
    }
}

impl DatagramTransport for UdpTransport {
    fn send_to(&self, packet: &[u8], to: SocketAddr) -> bool {
        match self.socket.try_send_to(packet, to) {
            Ok(num_sent) if num_sent == packet.len() => true,
            Ok(num_sent) => {
                warn!("short send to {:?}: {} of {} bytes", to, num_sent, packet.len());
                false
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(e) => {
                error!("error sending UDP packet to {:?}: {}", to, e);
                false
            }
        }
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
        match self.socket.try_recv_from(buf) {
            Ok(x) => Some(x),
            Err(e) if e.kind() == ErrorKind::WouldBlock => None,
            Err(e) => {
                error!("socket error: {}", e);
                None
            }
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }
}

/// Serializes `frame` into the reused scratch buffer and puts it on the wire.
///  Returns whether the transport accepted the whole datagram.
pub(crate) fn send_frame(
    transport: &dyn DatagramTransport,
    send_buf: &mut BytesMut,
    framing: FramingMode,
    frame: &Frame,
    to: SocketAddr,
) -> bool {
    send_buf.clear();
    frame.ser(framing, send_buf);
    transport.send_to(send_buf.as_ref(), to)
}
