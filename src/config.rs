//! Hub configuration
//!
//! Timeouts, size limits and queue capacities shared by every connection
//! and room of one `Hub`.

use std::time::Duration;

use crate::error::AppError;

/// Configuration settings for a hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Request path accepted for the WebSocket upgrade
    pub endpoint: String,

    /// Room every connection joins right after the upgrade
    pub default_room: String,

    /// Largest inbound message in bytes; bigger frames end the connection
    pub max_message_size: usize,

    /// Silence tolerated before a connection is dropped.
    /// Refreshed whenever a pong arrives.
    pub pong_wait: Duration,

    /// Interval between keepalive pings, must be shorter than `pong_wait`
    pub ping_period: Duration,

    /// Deadline for writing a single frame
    pub write_wait: Duration,

    /// Capacity of each connection's outbound queue
    pub outbound_capacity: usize,

    /// Capacity of each room's broadcast channel
    pub broadcast_capacity: usize,

    /// Stop rooms that stayed empty this long. `None` keeps rooms forever.
    pub room_idle_timeout: Option<Duration>,
}

impl HubConfig {
    /// Set the upgrade endpoint path
    pub fn with_endpoint(mut self, path: impl Into<String>) -> Self {
        self.endpoint = path.into();
        self
    }

    /// Set the read deadline; the ping period follows at 9/10 of it
    pub fn with_pong_wait(mut self, pong_wait: Duration) -> Self {
        self.pong_wait = pong_wait;
        self.ping_period = pong_wait * 9 / 10;
        self
    }

    /// Override the ping period without touching the read deadline
    pub fn with_ping_period(mut self, ping_period: Duration) -> Self {
        self.ping_period = ping_period;
        self
    }

    pub fn with_write_wait(mut self, write_wait: Duration) -> Self {
        self.write_wait = write_wait;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    pub fn with_room_idle_timeout(mut self, timeout: Duration) -> Self {
        self.room_idle_timeout = Some(timeout);
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `AppError::InvalidConfig` naming the first bad value
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.endpoint.starts_with('/') {
            return Err(AppError::InvalidConfig(
                "endpoint must start with '/'".to_string(),
            ));
        }

        if self.max_message_size == 0 {
            return Err(AppError::InvalidConfig(
                "max_message_size must be greater than 0".to_string(),
            ));
        }

        if self.ping_period.is_zero() || self.write_wait.is_zero() {
            return Err(AppError::InvalidConfig(
                "ping_period and write_wait must be greater than 0".to_string(),
            ));
        }

        if self.ping_period >= self.pong_wait {
            return Err(AppError::InvalidConfig(
                "ping_period must be shorter than pong_wait".to_string(),
            ));
        }

        if self.outbound_capacity == 0 || self.broadcast_capacity == 0 {
            return Err(AppError::InvalidConfig(
                "queue capacities must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for HubConfig {
    /// Default values:
    /// - Endpoint: `/ws`, default room: `root`
    /// - Max message size: 512 bytes
    /// - Pong wait: 60 seconds, ping period: 54 seconds, write wait: 10 seconds
    /// - Outbound and broadcast capacity: 256
    /// - Rooms are never evicted
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            endpoint: "/ws".to_string(),
            default_room: "root".to_string(),
            max_message_size: 512,
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            write_wait: Duration::from_secs(10),
            outbound_capacity: 256,
            broadcast_capacity: 256,
            room_idle_timeout: None,
        }
    }
}
