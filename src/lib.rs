//! Room-based WebSocket Broadcast Server Library
//!
//! Clients join named rooms over a WebSocket connection; anything a client
//! emits into a room is fanned out to every member of that room.
//!
//! # Features
//! - Automatic join to a default `root` room on connect
//! - Join / leave / broadcast driven by plain JSON objects
//! - Keepalive pings and a read deadline refreshed by pongs
//! - Slow consumers are dropped from rooms instead of stalling them
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `RoomRegistry` is the single writer of the room name → room map
//! - Each `Room` is an actor owning its membership set
//! - Each connection runs a read loop and a spawned write loop sharing a
//!   bounded outbound queue
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use room_relay::{serve, Hub, HubConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let hub = Hub::new(HubConfig::default()).unwrap();
//!     serve(listener, hub).await;
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod room;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use client::{Client, Outbox};
pub use config::HubConfig;
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use message::{Action, Envelope, EnvelopeEvent, FieldValue, Payload};
pub use registry::{Registry, RoomRegistry};
pub use room::{Room, RoomHandle};
pub use server::{accept_connection, serve, Hub};
pub use types::{ConnectionId, RoomName};
