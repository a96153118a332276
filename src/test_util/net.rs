use std::cmp::min;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use rustc_hash::FxHashMap;
use crate::transport::DatagramTransport;

#[derive(Default)]
struct TestNetInner {
    queues: FxHashMap<SocketAddr, VecDeque<(Vec<u8>, SocketAddr)>>,
}

/// An in-memory datagram network: lossless, in-order, but with real UDP send
///  semantics - a send to an unattached address "succeeds" and the datagram
///  vanishes, exactly like UDP to a dead host.
///
/// [TestNet::inject] delivers a raw datagram impersonating any source address,
///  which is what makes spoofing and address-migration scenarios testable.
#[derive(Clone, Default)]
pub struct TestNet {
    inner: Arc<Mutex<TestNetInner>>,
}

impl TestNet {
    pub fn new() -> TestNet {
        TestNet::default()
    }

    /// Attaches an address to the network, creating its inbound queue. Attaching
    ///  the same address again returns another handle to the same queue.
    pub fn attach(&self, addr: SocketAddr) -> TestNetTransport {
        self.inner.lock().unwrap().queues.entry(addr).or_default();
        TestNetTransport {
            addr,
            inner: self.inner.clone(),
        }
    }

    /// Queues a raw datagram for `to`, with an arbitrary claimed source address.
    pub fn inject(&self, from: SocketAddr, to: SocketAddr, datagram: &[u8]) {
        self.inner.lock().unwrap().queues
            .entry(to)
            .or_default()
            .push_back((datagram.to_vec(), from));
    }
}

pub struct TestNetTransport {
    addr: SocketAddr,
    inner: Arc<Mutex<TestNetInner>>,
}

impl DatagramTransport for TestNetTransport {
    fn send_to(&self, packet: &[u8], to: SocketAddr) -> bool {
        if let Some(queue) = self.inner.lock().unwrap().queues.get_mut(&to) {
            queue.push_back((packet.to_vec(), self.addr));
        }
        true
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
        let (datagram, from) = self.inner.lock().unwrap()
            .queues
            .get_mut(&self.addr)?
            .pop_front()?;
        let num_read = min(datagram.len(), buf.len());
        buf[..num_read].copy_from_slice(&datagram[..num_read]);
        Some((num_read, from))
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.addr)
    }
}
