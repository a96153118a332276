use passlink::client::Client;
use passlink::config::{ClientConfig, ServerConfig};
use passlink::event::{ClientEvent, ServerEvent};
use passlink::server::Server;
use passlink::test_util::stream::DirectStreamFactory;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, Level};

fn init_logging() {
    tracing_subscriber::fmt()
        // .with_max_level(Level::TRACE)
        .with_max_level(Level::DEBUG)
        .try_init()
        .ok();
}

/// A server and a client in one process, talking through the loopback interface:
///  the client registers, pings on two channels, the server echoes, and both
///  sides heartbeat until the loop ends.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let server_addr = SocketAddr::from_str("127.0.0.1:25565")?;

    let mut server = Server::new(ServerConfig::new(server_addr), Arc::new(DirectStreamFactory));
    server.activate().await?;

    let mut client = Client::new(ClientConfig::new(server_addr), Arc::new(DirectStreamFactory));
    client.activate().await?;

    let mut sent_greeting = false;
    for _ in 0..50 {
        let now = Instant::now();

        for event in server.tick(now) {
            match event {
                ServerEvent::SessionEstablished { session_id } => {
                    info!("server: session {} established", session_id);
                }
                ServerEvent::Message { session_id, channel, payload } => {
                    info!("server: session {} sent {:?} on channel {}", session_id, payload, channel);
                    server.send(session_id, channel, b"pong")?;
                }
                ServerEvent::SessionLost { session_id } => {
                    info!("server: session {} lost", session_id);
                }
            }
        }

        for event in client.tick(now) {
            match event {
                ClientEvent::Connected { session_id } => {
                    info!("client: connected as session {}", session_id);
                }
                ClientEvent::Message { channel, payload } => {
                    info!("client: received {:?} on channel {}", payload, channel);
                }
                ClientEvent::Disconnected => {
                    info!("client: disconnected");
                }
            }
        }

        if client.is_authenticated() && !sent_greeting {
            client.send(0, b"ping")?;
            client.send(5, b"hello on another channel")?;
            sent_greeting = true;
        }

        sleep(Duration::from_millis(100)).await;
    }

    client.deactivate();
    server.deactivate();
    Ok(())
}
