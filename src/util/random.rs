use rand::RngCore;
#[cfg(test)] use std::sync::Mutex;


#[cfg(test)]
/// automock expectations for static methods are global - hold this lock to avoid races
pub static MOCK_RANDOM_MUTEX: Mutex<()> = Mutex::new(());

/// Randomness seam for session key generation. Keys need to be unpredictable to a
///  spoofing sender, not unique - collisions across session ids are fine.
#[cfg_attr(test, mockall::automock)]
pub trait PassRandom {
    fn next_u32() -> u32;
}

pub struct RngPassRandom {}
impl PassRandom for RngPassRandom {
    fn next_u32() -> u32 {
        rand::thread_rng().next_u32()
    }
}
