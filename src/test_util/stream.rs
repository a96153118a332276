use std::collections::VecDeque;
use bytes::Bytes;
use tokio::time::Instant;
use crate::reliable::{ReliableStream, ReliableStreamFactory};

/// A pass-through [ReliableStream]: every message becomes exactly one wire
///  segment, every inbound fragment is one delivered message. On a lossless
///  in-order transport (like [crate::test_util::net::TestNet] or loopback UDP)
///  this behaves like a real ARQ engine that never has to retransmit, which is
///  all the crate's own tests and demos need.
pub struct DirectStream {
    received: VecDeque<Bytes>,
}

impl ReliableStream for DirectStream {
    fn input(&mut self, fragment: &[u8]) {
        // a zero-length fragment is a channel heartbeat, it carries no message
        if !fragment.is_empty() {
            self.received.push_back(Bytes::copy_from_slice(fragment));
        }
    }

    fn send(&mut self, message: &[u8]) -> anyhow::Result<Vec<Bytes>> {
        Ok(vec![Bytes::copy_from_slice(message)])
    }

    fn update(&mut self, _now: Instant) -> Vec<Bytes> {
        Vec::new()
    }

    fn peek_size(&mut self) -> Option<usize> {
        self.received.front().map(|message| message.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Option<usize> {
        let message = self.received.front()?;
        if buf.len() < message.len() {
            return None;
        }
        let message = self.received.pop_front()?;
        buf[..message.len()].copy_from_slice(&message);
        Some(message.len())
    }
}

pub struct DirectStreamFactory;

impl ReliableStreamFactory for DirectStreamFactory {
    fn create(&self, _session_id: u32, _channel: u8) -> Box<dyn ReliableStream> {
        Box::new(DirectStream {
            received: VecDeque::new(),
        })
    }
}
