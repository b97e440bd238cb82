//! Command-line configuration for the lobby server

use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on (0 picks a free port)
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Pause between countdown ticks in milliseconds
    #[arg(long, default_value = "1000")]
    pub countdown_tick_ms: u64,

    /// Messages buffered per connection before new ones are dropped
    #[arg(long, default_value = "64")]
    pub outbox_capacity: usize,

    /// Give up on a connection whose socket write takes longer than this
    #[arg(long, default_value = "1000")]
    pub send_timeout_ms: u64,

    /// Capacity of the session's inbound event queue
    #[arg(long, default_value = "256")]
    pub event_queue: usize,

    /// Seed for the random colour fallback
    #[arg(long)]
    pub color_seed: Option<u64>,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            countdown_tick: Duration::from_millis(self.countdown_tick_ms),
            color_seed: self.color_seed,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            countdown_tick_ms: 1000,
            outbox_capacity: 64,
            send_timeout_ms: 1000,
            event_queue: 256,
            color_seed: None,
        }
    }
}

/// Settings the lobby state machine needs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub countdown_tick: Duration,
    pub color_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            countdown_tick: Duration::from_secs(1),
            color_seed: None,
        }
    }
}
