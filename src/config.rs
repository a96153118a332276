use std::net::SocketAddr;
use std::time::Duration;
use anyhow::bail;
use crate::pass::Pass;
use crate::wire::FramingMode;

pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    /// A heartbeat control datagram is sent to every session that has not been sent
    ///  one for this long. This is what keeps NAT mappings alive and lets the peer's
    ///  timeout supervision distinguish "idle" from "gone".
    pub heartbeat_interval: Duration,

    /// A session (or a pending registration) that has not produced an authenticated
    ///  datagram for this long is evicted. Must be comfortably larger than the
    ///  heartbeat interval.
    pub timeout_limit: Duration,

    /// Size of the receive buffer a single datagram is read into. Datagrams larger
    ///  than this are truncated by the OS, so this should stay at the maximum UDP
    ///  payload size unless the reliable stream engine guarantees smaller segments.
    pub recv_buffer_size: usize,

    pub framing: FramingMode,
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> ServerConfig {
        ServerConfig {
            bind_addr,
            heartbeat_interval: Duration::from_secs(1),
            timeout_limit: Duration::from_secs(8),
            recv_buffer_size: 65535,
            framing: FramingMode::Multiplexed,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_shared(self.heartbeat_interval, self.timeout_limit, self.recv_buffer_size)
    }
}

pub struct ClientConfig {
    /// The one server this client talks to. A client does not multiplex across
    ///  servers - whatever arrives on its socket is attributed to this address.
    pub server_addr: SocketAddr,

    pub heartbeat_interval: Duration,
    pub timeout_limit: Duration,
    pub recv_buffer_size: usize,
    pub framing: FramingMode,
}

impl ClientConfig {
    pub fn new(server_addr: SocketAddr) -> ClientConfig {
        ClientConfig {
            server_addr,
            heartbeat_interval: Duration::from_secs(1),
            timeout_limit: Duration::from_secs(8),
            recv_buffer_size: 65535,
            framing: FramingMode::Multiplexed,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_shared(self.heartbeat_interval, self.timeout_limit, self.recv_buffer_size)
    }
}

fn validate_shared(heartbeat_interval: Duration, timeout_limit: Duration, recv_buffer_size: usize) -> anyhow::Result<()> {
    if heartbeat_interval.is_zero() {
        bail!("heartbeat interval must be non-zero");
    }
    if timeout_limit <= heartbeat_interval {
        bail!("timeout limit must be bigger than the heartbeat interval - a session would be evicted between heartbeats");
    }
    if recv_buffer_size < Pass::SERIALIZED_LEN + 1 {
        bail!("receive buffer too small to hold a framed datagram");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    fn addr() -> SocketAddr {
        SocketAddr::from_str("127.0.0.1:25565").unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(ServerConfig::new(addr()).validate().is_ok());
        assert!(ClientConfig::new(addr()).validate().is_ok());
    }

    #[rstest]
    #[case::zero_heartbeat(Duration::ZERO, Duration::from_secs(8), 65535)]
    #[case::timeout_equals_heartbeat(Duration::from_secs(1), Duration::from_secs(1), 65535)]
    #[case::timeout_below_heartbeat(Duration::from_secs(2), Duration::from_secs(1), 65535)]
    #[case::tiny_recv_buffer(Duration::from_secs(1), Duration::from_secs(8), 8)]
    fn test_validate_rejects(#[case] heartbeat: Duration, #[case] timeout: Duration, #[case] recv_buffer: usize) {
        let mut config = ServerConfig::new(addr());
        config.heartbeat_interval = heartbeat;
        config.timeout_limit = timeout;
        config.recv_buffer_size = recv_buffer;
        assert!(config.validate().is_err());
    }
}
