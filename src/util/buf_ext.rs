macro_rules! get_try_impl {
    ($try_getter: ident, $ty:ty, $getter: ident) => {
        fn $try_getter(&mut self) -> anyhow::Result<$ty> {
            if self.remaining() < size_of::<$ty>() {
                return Err(anyhow::anyhow!("buffer underflow"));
            }
            Ok(self.$getter())
        }
    }
}

/// Fallible variants of the little-endian accessors of [bytes::Buf], which panic
///  on underflow - a received datagram must never be able to panic the endpoint.
pub trait BufExt: bytes::Buf {
    get_try_impl!(try_get_u32_le, u32, get_u32_le);
}

impl<T: bytes::Buf> BufExt for T {
}
