use bytes::Bytes;
use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::debug;
use crate::reliable::{ReliableStream, ReliableStreamFactory};

/// The per-session channel table: up to 256 independent reliable streams, keyed
///  by the channel tag and created lazily on first use (first outbound send or
///  first inbound fragment). A channel, once created, lives exactly as long as
///  its session - the whole set is dropped with it.
///
/// The map is sparse on purpose: a typical session touches a handful of tags.
pub struct ChannelSet {
    session_id: u32,
    streams: FxHashMap<u8, Box<dyn ReliableStream>>,
}

impl ChannelSet {
    pub fn new(session_id: u32) -> ChannelSet {
        ChannelSet {
            session_id,
            streams: FxHashMap::default(),
        }
    }

    fn ensure_channel(&mut self, channel: u8, factory: &dyn ReliableStreamFactory) -> &mut Box<dyn ReliableStream> {
        let session_id = self.session_id;
        self.streams.entry(channel)
            .or_insert_with(|| {
                debug!("creating channel {} for session {}", channel, session_id);
                factory.create(session_id, channel)
            })
    }

    /// Routes one inbound payload fragment into its channel's reassembly. An empty
    ///  fragment is an explicit channel heartbeat: it creates the channel but
    ///  carries nothing to reassemble.
    pub fn input(&mut self, channel: u8, fragment: &[u8], factory: &dyn ReliableStreamFactory) {
        let stream = self.ensure_channel(channel, factory);
        if !fragment.is_empty() {
            stream.input(fragment);
        }
    }

    /// Accepts one outbound message, returning the wire segments the stream
    ///  produced for it.
    pub fn send(&mut self, channel: u8, message: &[u8], factory: &dyn ReliableStreamFactory) -> anyhow::Result<Vec<Bytes>> {
        self.ensure_channel(channel, factory).send(message)
    }

    /// Drives every channel's stream clock, collecting produced wire segments
    ///  tagged with their channel.
    pub fn update_all(&mut self, now: Instant) -> Vec<(u8, Bytes)> {
        let mut segments = Vec::new();
        for (channel, stream) in self.streams.iter_mut() {
            for segment in stream.update(now) {
                segments.push((*channel, segment));
            }
        }
        segments
    }

    /// Drains every channel's receive queue until empty, invoking `on_message` once
    ///  per fully reassembled message in the stream's delivery order. Order across
    ///  channels is unspecified.
    pub fn drain_received(&mut self, mut on_message: impl FnMut(u8, Bytes)) {
        for (channel, stream) in self.streams.iter_mut() {
            while let Some(size) = stream.peek_size() {
                let mut buf = vec![0u8; size];
                let num_read = match stream.receive(&mut buf) {
                    Some(n) => n,
                    None => break,
                };
                buf.truncate(num_read);
                on_message(*channel, Bytes::from(buf));
            }
        }
    }

    pub fn num_channels(&self) -> usize {
        self.streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reliable::{MockReliableStream, MockReliableStreamFactory};
    use mockall::predicate::eq;

    fn factory_expecting(session_id: u32, channel: u8, stream: MockReliableStream) -> MockReliableStreamFactory {
        let mut factory = MockReliableStreamFactory::new();
        factory.expect_create()
            .with(eq(session_id), eq(channel))
            .times(1)
            .return_once(move |_, _| Box::new(stream));
        factory
    }

    #[test]
    fn test_input_creates_channel_once_and_feeds_fragments() {
        let mut stream = MockReliableStream::new();
        stream.expect_input()
            .withf(|fragment| fragment == &[1u8, 2, 3][..])
            .times(1)
            .return_const(());
        stream.expect_input()
            .withf(|fragment| fragment == &[4u8][..])
            .times(1)
            .return_const(());
        let factory = factory_expecting(7, 3, stream);

        let mut channels = ChannelSet::new(7);
        channels.input(3, &[1, 2, 3], &factory);
        channels.input(3, &[4], &factory);
        assert_eq!(channels.num_channels(), 1);
    }

    #[test]
    fn test_empty_fragment_creates_channel_without_input() {
        let mut stream = MockReliableStream::new();
        stream.expect_input().times(0);
        let factory = factory_expecting(1, 200, stream);

        let mut channels = ChannelSet::new(1);
        channels.input(200, &[], &factory);
        assert_eq!(channels.num_channels(), 1);
    }

    #[test]
    fn test_send_returns_produced_segments() {
        let mut stream = MockReliableStream::new();
        stream.expect_send()
            .withf(|message| message == &[9u8, 9][..])
            .times(1)
            .returning(|_| Ok(vec![Bytes::from_static(&[9, 9, 0])]));
        let factory = factory_expecting(2, 0, stream);

        let mut channels = ChannelSet::new(2);
        let segments = channels.send(0, &[9, 9], &factory).unwrap();
        assert_eq!(segments, vec![Bytes::from_static(&[9, 9, 0])]);
    }

    #[test]
    fn test_update_all_tags_segments_with_their_channel() {
        let mut stream_a = MockReliableStream::new();
        stream_a.expect_input().return_const(());
        stream_a.expect_update()
            .times(1)
            .returning(|_| vec![Bytes::from_static(&[1])]);
        let mut stream_b = MockReliableStream::new();
        stream_b.expect_input().return_const(());
        stream_b.expect_update()
            .times(1)
            .returning(|_| vec![Bytes::from_static(&[2]), Bytes::from_static(&[3])]);

        let mut factory = MockReliableStreamFactory::new();
        factory.expect_create()
            .with(eq(5), eq(10))
            .return_once(move |_, _| Box::new(stream_a));
        factory.expect_create()
            .with(eq(5), eq(20))
            .return_once(move |_, _| Box::new(stream_b));

        let mut channels = ChannelSet::new(5);
        channels.input(10, &[0], &factory);
        channels.input(20, &[0], &factory);

        let mut segments = channels.update_all(Instant::now());
        segments.sort_by_key(|(channel, _)| *channel);
        assert_eq!(segments, vec![
            (10, Bytes::from_static(&[1])),
            (20, Bytes::from_static(&[2])),
            (20, Bytes::from_static(&[3])),
        ]);
    }

    #[test]
    fn test_drain_received_loops_until_empty() {
        use std::collections::VecDeque;
        use std::sync::{Arc, Mutex};

        let mut stream = MockReliableStream::new();
        stream.expect_input().return_const(());

        let queue = Arc::new(Mutex::new(VecDeque::from(vec![
            Bytes::from_static(&[1, 2]),
            Bytes::from_static(&[3]),
        ])));
        let peek_queue = queue.clone();
        stream.expect_peek_size()
            .returning(move || peek_queue.lock().unwrap().front().map(|m| m.len()));
        stream.expect_receive()
            .returning(move |buf| {
                let msg = queue.lock().unwrap().pop_front()?;
                buf[..msg.len()].copy_from_slice(&msg);
                Some(msg.len())
            });
        let factory = factory_expecting(8, 4, stream);

        let mut channels = ChannelSet::new(8);
        channels.input(4, &[0], &factory);

        let mut delivered = Vec::new();
        channels.drain_received(|channel, msg| delivered.push((channel, msg)));
        assert_eq!(delivered, vec![
            (4, Bytes::from_static(&[1, 2])),
            (4, Bytes::from_static(&[3])),
        ]);
    }
}
