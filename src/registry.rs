//! Room registry actor
//!
//! The single writer of the room name → room mapping. Lookups and
//! get-or-create requests are serialized through its command channel, so
//! two connections creating the same room at once always get one room.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::config::HubConfig;
use crate::error::AppError;
use crate::room::{Room, RoomHandle};
use crate::types::RoomName;

/// Channel buffer size for registry commands
const REGISTRY_BUFFER_SIZE: usize = 256;

/// Commands sent to the registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    /// Return the named room, creating it if absent
    GetOrCreate {
        name: RoomName,
        reply: oneshot::Sender<RoomHandle>,
    },
    /// Return the named room if it exists
    Lookup {
        name: RoomName,
        reply: oneshot::Sender<Option<RoomHandle>>,
    },
    /// List the names of live rooms
    RoomNames {
        reply: oneshot::Sender<Vec<RoomName>>,
    },
}

/// The registry actor
pub struct RoomRegistry {
    /// All known rooms: RoomName -> RoomHandle
    rooms: HashMap<RoomName, RoomHandle>,
    config: Arc<HubConfig>,
    receiver: mpsc::Receiver<RegistryCommand>,
}

impl RoomRegistry {
    pub fn new(config: Arc<HubConfig>, receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            rooms: HashMap::new(),
            config,
            receiver,
        }
    }

    /// Spawn the registry actor and return a handle to it
    pub fn spawn(config: Arc<HubConfig>) -> Registry {
        let (sender, receiver) = mpsc::channel(REGISTRY_BUFFER_SIZE);
        tokio::spawn(Self::new(config, receiver).run());
        Registry { sender }
    }

    /// Run the registry event loop until every handle is dropped
    pub async fn run(mut self) {
        info!("Room registry started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Room registry shutting down");
    }

    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::GetOrCreate { name, reply } => {
                let room = self.get_or_create(name);
                let _ = reply.send(room);
            }
            RegistryCommand::Lookup { name, reply } => {
                let room = self.lookup(&name);
                let _ = reply.send(room);
            }
            RegistryCommand::RoomNames { reply } => {
                self.rooms.retain(|_, room| !room.is_closed());
                let _ = reply.send(self.rooms.keys().cloned().collect());
            }
        }
    }

    fn get_or_create(&mut self, name: RoomName) -> RoomHandle {
        if let Some(room) = self.lookup(&name) {
            return room;
        }

        // Registered before anyone else can ask for the same name
        let room = Room::spawn(name.clone(), &self.config);
        self.rooms.insert(name.clone(), room.clone());
        debug!("Room {} created, total rooms: {}", name, self.rooms.len());
        room
    }

    /// Live room by name; stopped rooms are forgotten here
    fn lookup(&mut self, name: &RoomName) -> Option<RoomHandle> {
        let room = self.rooms.get(name)?;
        if room.is_closed() {
            self.rooms.remove(name);
            debug!("Room {} removed (stopped)", name);
            return None;
        }
        Some(room.clone())
    }
}

/// Cloneable handle to the registry actor
#[derive(Debug, Clone)]
pub struct Registry {
    sender: mpsc::Sender<RegistryCommand>,
}

impl Registry {
    pub async fn get_or_create(&self, name: RoomName) -> Result<RoomHandle, AppError> {
        let (reply, response) = oneshot::channel();
        self.request(RegistryCommand::GetOrCreate { name, reply }).await?;
        response.await.map_err(|_| AppError::RegistryClosed)
    }

    pub async fn lookup(&self, name: RoomName) -> Result<Option<RoomHandle>, AppError> {
        let (reply, response) = oneshot::channel();
        self.request(RegistryCommand::Lookup { name, reply }).await?;
        response.await.map_err(|_| AppError::RegistryClosed)
    }

    pub async fn room_names(&self) -> Result<Vec<RoomName>, AppError> {
        let (reply, response) = oneshot::channel();
        self.request(RegistryCommand::RoomNames { reply }).await?;
        response.await.map_err(|_| AppError::RegistryClosed)
    }

    async fn request(&self, cmd: RegistryCommand) -> Result<(), AppError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| AppError::RegistryClosed)
    }
}
