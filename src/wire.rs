use bytes::{BufMut, Bytes, BytesMut};
use crate::pass::Pass;

/// Wire layout of the bytes following the pass.
///
/// [FramingMode::Multiplexed] is the current protocol generation: payload datagrams
///  carry a channel tag byte between the pass and the payload. [FramingMode::Legacy]
///  interoperates with single-stream peers that place payload bytes directly after
///  the pass; all their traffic maps to channel 0.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FramingMode {
    Multiplexed,
    Legacy,
}

/// A decoded datagram. Exactly 8 bytes is a control datagram (handshake step or
///  heartbeat); anything longer addresses a channel of the session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Frame {
    Control {
        pass: Pass,
    },
    /// NB: `payload` may be empty - that is a valid explicit heartbeat on the
    ///  tagged channel, not a malformed datagram.
    Payload {
        pass: Pass,
        channel: u8,
        payload: Bytes,
    },
}

impl Frame {
    pub fn pass(&self) -> Pass {
        match self {
            Frame::Control { pass } => *pass,
            Frame::Payload { pass, .. } => *pass,
        }
    }

    pub fn ser(&self, mode: FramingMode, buf: &mut BytesMut) {
        match self {
            Frame::Control { pass } => {
                pass.ser(buf);
            }
            Frame::Payload { pass, channel, payload } => {
                pass.ser(buf);
                match mode {
                    FramingMode::Multiplexed => {
                        buf.put_u8(*channel);
                        buf.put_slice(payload);
                    }
                    FramingMode::Legacy => {
                        // legacy peers have a single implicit channel; the endpoint
                        //  rejects sends on any other channel before getting here
                        buf.put_slice(payload);
                    }
                }
            }
        }
    }

    /// Decodes one received datagram. A datagram too short to carry a pass is an
    ///  error - the caller drops it without replying.
    pub fn deser(mode: FramingMode, datagram: &[u8]) -> anyhow::Result<Frame> {
        let mut buf = datagram;
        let pass = Pass::deser(&mut buf)?;

        if buf.is_empty() {
            return Ok(Frame::Control { pass });
        }

        let (channel, payload) = match mode {
            FramingMode::Multiplexed => (buf[0], Bytes::copy_from_slice(&buf[1..])),
            FramingMode::Legacy => (0, Bytes::copy_from_slice(buf)),
        };

        Ok(Frame::Payload {
            pass,
            channel,
            payload,
        })
    }
}
