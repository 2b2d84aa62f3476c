//! Hub and accept loop
//!
//! A `Hub` is the application context: configuration plus the room
//! registry. Independent hubs share nothing, so tests can run several.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, error, info};

use crate::config::HubConfig;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::message::Payload;
use crate::registry::{Registry, RoomRegistry};
use crate::types::RoomName;

/// Application context shared by every connection
#[derive(Debug, Clone)]
pub struct Hub {
    config: Arc<HubConfig>,
    registry: Registry,
}

impl Hub {
    /// Validate the configuration and start the room registry
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: HubConfig) -> Result<Self, AppError> {
        config.validate()?;
        let config = Arc::new(config);
        let registry = RoomRegistry::spawn(config.clone());
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Broadcast a payload into an existing room
    ///
    /// Returns `false` when no room of that name exists.
    pub async fn emit(&self, room: impl Into<RoomName>, payload: Payload) -> Result<bool, AppError> {
        match self.registry.lookup(room.into()).await? {
            Some(room) => {
                room.broadcast(payload).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn ws_config(&self) -> WebSocketConfig {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.max_message_size);
        ws_config.max_frame_size = Some(self.config.max_message_size);
        ws_config
    }
}

/// Accept connections forever, one task per connection
pub async fn serve(listener: TcpListener, hub: Hub) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("New TCP connection from {}", addr);
                let hub = hub.clone();
                tokio::spawn(async move {
                    if let Err(e) = accept_connection(stream, hub).await {
                        info!("Connection from {} rejected: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Upgrade a TCP stream and run the connection
///
/// The handshake itself refuses anything but GET; requests for a path
/// other than the configured endpoint get a 404.
pub async fn accept_connection(stream: TcpStream, hub: Hub) -> Result<(), AppError> {
    let endpoint = hub.config.endpoint.clone();
    let check_path = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if request.uri().path() == endpoint {
            Ok(response)
        } else {
            let mut refusal = ErrorResponse::new(Some("Not found".to_string()));
            *refusal.status_mut() = StatusCode::NOT_FOUND;
            Err(refusal)
        }
    };

    let ws_stream =
        tokio_tungstenite::accept_hdr_async_with_config(stream, check_path, Some(hub.ws_config()))
            .await?;
    handle_connection(ws_stream, hub).await;
    Ok(())
}
