//! Room actor implementation
//!
//! Each room owns its membership set and mutates it only inside its own
//! event loop. Callers talk to it through a cloneable `RoomHandle`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::client::{Client, OutboundFrame};
use crate::config::HubConfig;
use crate::error::{AppError, SendError};
use crate::message::{Envelope, Payload};
use crate::types::{ConnectionId, RoomName};

/// Commands serviced by the room loop
///
/// Join and leave carry an ack so callers can wait until the room applied
/// them; the teardown leave sends none.
#[derive(Debug)]
enum RoomCommand {
    Join {
        client: Client,
        done: oneshot::Sender<()>,
    },
    Leave {
        id: ConnectionId,
        done: Option<oneshot::Sender<()>>,
    },
    Broadcast {
        payload: Payload,
    },
    Members {
        reply: oneshot::Sender<Vec<ConnectionId>>,
    },
    Stop,
}

/// Handle to a running room
///
/// Commands from one handle are processed in the order they were sent.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    name: RoomName,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn name(&self) -> &RoomName {
        &self.name
    }

    /// Add a client; it receives a join envelope
    pub async fn join(&self, client: Client) -> Result<(), AppError> {
        let (done, ack) = oneshot::channel();
        self.send(RoomCommand::Join { client, done }).await?;
        ack.await.map_err(|_| self.closed())
    }

    /// Remove a member; it receives a leave envelope. No-op for non-members.
    pub async fn leave(&self, id: ConnectionId) -> Result<(), AppError> {
        let (done, ack) = oneshot::channel();
        self.send(RoomCommand::Leave {
            id,
            done: Some(done),
        })
        .await?;
        ack.await.map_err(|_| self.closed())
    }

    /// Queue a leave without waiting for the room to process it
    pub async fn request_leave(&self, id: ConnectionId) -> Result<(), AppError> {
        self.send(RoomCommand::Leave { id, done: None }).await
    }

    /// Fan a payload out to every current member
    pub async fn broadcast(&self, payload: Payload) -> Result<(), AppError> {
        self.send(RoomCommand::Broadcast { payload }).await
    }

    /// Ask the room loop to exit after the commands already queued
    pub async fn stop(&self) -> Result<(), AppError> {
        self.send(RoomCommand::Stop).await
    }

    /// Snapshot of the current member ids
    pub async fn members(&self) -> Result<Vec<ConnectionId>, AppError> {
        let (reply, response) = oneshot::channel();
        self.send(RoomCommand::Members { reply }).await?;
        response.await.map_err(|_| self.closed())
    }

    /// True once the room loop has exited
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// True when both handles point at the same room actor
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), AppError> {
        self.sender.send(cmd).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> AppError {
        AppError::RoomClosed(self.name.to_string())
    }
}

/// The room actor
///
/// Owns the membership set; nothing outside the loop ever touches it.
pub struct Room {
    name: RoomName,
    members: HashMap<ConnectionId, Client>,
    idle_timeout: Option<Duration>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl Room {
    /// Create a room and its handle without starting the loop
    pub fn new(name: RoomName, config: &HubConfig) -> (Self, RoomHandle) {
        let (sender, receiver) = mpsc::channel(config.broadcast_capacity);
        let handle = RoomHandle {
            name: name.clone(),
            sender,
        };
        let room = Self {
            name,
            members: HashMap::new(),
            idle_timeout: config.room_idle_timeout,
            receiver,
        };
        (room, handle)
    }

    /// Create a room and spawn its event loop
    pub fn spawn(name: RoomName, config: &HubConfig) -> RoomHandle {
        let (room, handle) = Self::new(name, config);
        tokio::spawn(room.run());
        handle
    }

    /// Run the room event loop until stopped
    ///
    /// Exits on `Stop`, when every handle is dropped, or when the room has
    /// been empty for the configured idle timeout.
    pub async fn run(mut self) {
        info!("Room {} started", self.name);
        let mut idle_since = Some(Instant::now());

        loop {
            let idle_deadline = self.idle_timeout.zip(idle_since).map(|(t, s)| s + t);

            let cmd = tokio::select! {
                cmd = self.receiver.recv() => cmd,
                _ = idle(idle_deadline) => {
                    info!("Room {} idle, stopping", self.name);
                    break;
                }
            };
            let Some(cmd) = cmd else {
                break;
            };
            if !self.handle_command(cmd) {
                break;
            }

            if !self.members.is_empty() {
                idle_since = None;
            } else if idle_since.is_none() {
                idle_since = Some(Instant::now());
            }
        }

        info!("Room {} stopped", self.name);
    }

    /// Process a single command, `false` on stop
    fn handle_command(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join { client, done } => {
                self.handle_join(client);
                let _ = done.send(());
            }
            RoomCommand::Leave { id, done } => {
                self.handle_leave(id);
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            RoomCommand::Broadcast { payload } => self.handle_broadcast(payload),
            RoomCommand::Members { reply } => {
                let _ = reply.send(self.members.keys().copied().collect());
            }
            RoomCommand::Stop => return false,
        }
        true
    }

    fn handle_join(&mut self, client: Client) {
        self.announce(&client, Envelope::join(&self.name, client.id));
        debug!("Client {} joined room {}", client.id, self.name);
        self.members.insert(client.id, client);
    }

    fn handle_leave(&mut self, id: ConnectionId) {
        if let Some(client) = self.members.remove(&id) {
            self.announce(&client, Envelope::leave(&self.name, client.id));
            debug!("Client {} left room {}", client.id, self.name);
        }
    }

    /// Deliver to every member; members whose queue is full are dropped
    fn handle_broadcast(&mut self, payload: Payload) {
        let frame: OutboundFrame = match payload.to_json() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                error!("Failed to serialize broadcast for room {}: {}", self.name, e);
                return;
            }
        };

        let name = &self.name;
        self.members.retain(|id, client| match client.try_send(frame.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping client {} from room {}: {}", id, name, e);
                client.close();
                false
            }
        });
    }

    fn announce(&self, client: &Client, envelope: Envelope<'_>) {
        let json = match envelope.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize envelope for room {}: {}", self.name, e);
                return;
            }
        };
        match client.try_send(Arc::from(json)) {
            Ok(()) => {}
            // Disconnecting clients close their queue before their leave lands
            Err(SendError::ChannelClosed) => {}
            Err(e) => warn!(
                "Dropped {:?} notice for client {} in room {}: {}",
                envelope.event, client.id, self.name, e
            ),
        }
    }
}

async fn idle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
