use bytes::{Buf, BufMut};
use crate::util::buf_ext::BufExt;

/// The session credential: issued by the server during pre-registration, echoed
///  by the client to confirm registration, and prefixed to every datagram of the
///  session afterwards.
///
/// A pass with `id == 0` is "no credential" - it is what an anonymous client sends
///  to request one. The server allocates ids starting at 1, so a valid pass always
///  has a non-zero id. The key is random and unpredictable; it is what makes the
///  handshake spoof-resistant, since only the real owner of the source address
///  receives it. Authorization is exact equality on both fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Pass {
    pub id: u32,
    pub key: u32,
}

impl Pass {
    pub const SERIALIZED_LEN: usize = 8;

    /// the anonymous "no credential" pass
    pub const NONE: Pass = Pass { id: 0, key: 0 };

    pub fn is_valid(&self) -> bool {
        self.id != 0
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.id);
        buf.put_u32_le(self.key);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<Pass> {
        let id = buf.try_get_u32_le()?;
        let key = buf.try_get_u32_le()?;
        Ok(Pass {
            id,
            key,
        })
    }
}
