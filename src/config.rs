use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3536";

/// Settings of the WebSocket relay server.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    /// Frames queued per connection before the relay starts dropping them.
    pub inbox_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 3536))),
            inbox_capacity: 100,
        }
    }
}

/// Settings of a peer's relay connection.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub relay_url: String,
    /// Capacity of the transport event channel.
    pub event_capacity: usize,
    /// Milliseconds between keepalive frames; 0 disables them.
    pub keep_alive_interval_ms: u64,
}

impl ClientConfig {
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: format!("ws://{DEFAULT_BIND_ADDR}"),
            event_capacity: 100,
            keep_alive_interval_ms: 20_000,
        }
    }
}
