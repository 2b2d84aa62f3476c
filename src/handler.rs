//! WebSocket connection handler
//!
//! Runs one connection: a spawned write task drains the outbound queue and
//! sends keepalive pings, while the read loop decodes frames and dispatches
//! join, leave and broadcast requests. When either side ends, the
//! connection leaves every room it joined.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{interval_at, timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::client::{Client, Outbox};
use crate::error::AppError;
use crate::message::{Action, Payload};
use crate::room::RoomHandle;
use crate::server::Hub;
use crate::types::{ConnectionId, RoomName};

type WsStream = WebSocketStream<TcpStream>;
type WsReceiver = SplitStream<WsStream>;

/// Attempts at joining a room that stops between lookup and join
const JOIN_ATTEMPTS: usize = 3;

/// Handle an upgraded WebSocket connection until it ends
///
/// The connection joins the hub's default room before reading anything.
pub async fn handle_connection(ws_stream: WsStream, hub: Hub) {
    let client_id = ConnectionId::new();
    let config = hub.config().clone();
    let (client, outbox) = Client::channel(client_id, config.outbound_capacity);
    let (ws_sender, ws_receiver) = ws_stream.split();

    info!("Client {} connected", client_id);

    // Started first so the default room's join notice has a consumer
    let mut write_task = tokio::spawn(write_loop(
        client_id,
        ws_sender,
        outbox,
        config.ping_period,
        config.write_wait,
    ));

    let mut conn = Connection {
        client,
        hub,
        rooms: HashMap::new(),
    };
    let default_room = RoomName::from(config.default_room.as_str());

    let write_finished = tokio::select! {
        result = conn.run(ws_receiver, default_room) => {
            match result {
                Ok(()) => debug!("Read loop ended for {}", client_id),
                Err(e) => info!("Read loop for {} failed: {}", client_id, e),
            }
            false
        }
        result = &mut write_task => {
            match result {
                Ok(Ok(())) => debug!("Write loop ended for {}", client_id),
                Ok(Err(e)) => info!("Write loop for {} failed: {}", client_id, e),
                Err(e) => warn!("Write task for {} panicked: {}", client_id, e),
            }
            true
        }
    };

    conn.teardown().await;

    // Let the writer flush what is queued and send its close frame
    if !write_finished {
        let _ = write_task.await;
    }

    info!("Client {} disconnected", client_id);
}

/// Read-side state of one connection
struct Connection {
    client: Client,
    hub: Hub,
    /// Joined rooms for leave-all on disconnect
    rooms: HashMap<RoomName, RoomHandle>,
}

impl Connection {
    async fn run(&mut self, ws_receiver: WsReceiver, default_room: RoomName) -> Result<(), AppError> {
        self.join(default_room).await?;
        self.read_loop(ws_receiver).await
    }

    /// Read frames until the peer goes away
    ///
    /// The read deadline only moves forward when a pong arrives.
    async fn read_loop(&mut self, mut ws_receiver: WsReceiver) -> Result<(), AppError> {
        let client_id = self.client.id;
        let pong_wait = self.hub.config().pong_wait;
        let mut deadline = Instant::now() + pong_wait;

        loop {
            let msg = match timeout_at(deadline, ws_receiver.next()).await {
                Err(_) => return Err(AppError::ReadTimeout),
                Ok(None) => return Ok(()),
                Ok(Some(msg)) => msg?,
            };

            match msg {
                Message::Text(text) => self.handle_frame(text.as_bytes()).await?,
                Message::Binary(data) => self.handle_frame(&data).await?,
                Message::Pong(_) => {
                    debug!("Pong from {}", client_id);
                    deadline = Instant::now() + pong_wait;
                }
                Message::Ping(_) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping from {}", client_id);
                }
                Message::Close(_) => {
                    debug!("Client {} sent close frame", client_id);
                    return Ok(());
                }
                Message::Frame(_) => {}
            }
        }
    }

    async fn handle_frame(&mut self, bytes: &[u8]) -> Result<(), AppError> {
        let payload = match Payload::decode(bytes) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Dropping malformed frame from {}: {}", self.client.id, e);
                return Ok(());
            }
        };

        match payload.into_action() {
            Action::Join(room) => self.join(room).await,
            Action::Leave(room) => self.leave(&room).await,
            Action::Broadcast(room, payload) => self.emit(room, payload).await,
            Action::Ignore => Ok(()),
        }
    }

    /// Join a room, creating it if needed, and wait until it took effect
    async fn join(&mut self, name: RoomName) -> Result<(), AppError> {
        for _ in 0..JOIN_ATTEMPTS {
            let room = self.hub.registry().get_or_create(name.clone()).await?;
            match room.join(self.client.clone()).await {
                Ok(()) => {
                    info!("Client {} joined room {}", self.client.id, name);
                    self.rooms.insert(name, room);
                    return Ok(());
                }
                // Stopped after the lookup; the registry creates a fresh one next time
                Err(AppError::RoomClosed(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        warn!("Client {} gave up joining room {}", self.client.id, name);
        Ok(())
    }

    async fn leave(&mut self, name: &RoomName) -> Result<(), AppError> {
        let Some(room) = self.rooms.remove(name) else {
            return Ok(());
        };
        match room.leave(self.client.id).await {
            Ok(()) => info!("Client {} left room {}", self.client.id, name),
            Err(e) => debug!("Leave for {} not delivered: {}", self.client.id, e),
        }
        Ok(())
    }

    /// Forward a payload to a room that exists; membership is not required
    async fn emit(&self, name: RoomName, payload: Payload) -> Result<(), AppError> {
        match self.hub.emit(name, payload).await {
            Ok(_) | Err(AppError::RoomClosed(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Leave every joined room without waiting, then close the outbound queue
    async fn teardown(&mut self) {
        for (name, room) in self.rooms.drain() {
            if let Err(e) = room.request_leave(self.client.id).await {
                debug!("Room {} gone before leave: {}", name, e);
            }
        }
        self.client.close();
    }
}

/// Write queued frames and keepalive pings until the queue closes
async fn write_loop<S>(
    client_id: ConnectionId,
    mut ws_sender: S,
    mut outbox: Outbox,
    ping_period: Duration,
    write_wait: Duration,
) -> Result<(), AppError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let mut ticker = interval_at(Instant::now() + ping_period, ping_period);

    loop {
        tokio::select! {
            frame = outbox.recv() => match frame {
                Some(frame) => {
                    write(&mut ws_sender, Message::Text(frame.to_string()), write_wait).await?;
                }
                None => {
                    debug!("Outbound queue closed for {}", client_id);
                    let _ = write(&mut ws_sender, Message::Close(None), write_wait).await;
                    return Ok(());
                }
            },
            _ = ticker.tick() => {
                write(&mut ws_sender, Message::Ping(Vec::new()), write_wait).await?;
            }
        }
    }
}

async fn write<S>(ws_sender: &mut S, msg: Message, write_wait: Duration) -> Result<(), AppError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    timeout(write_wait, ws_sender.send(msg))
        .await
        .map_err(|_| AppError::WriteTimeout)??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    const PING_PERIOD: Duration = Duration::from_secs(54);
    const WRITE_WAIT: Duration = Duration::from_secs(10);

    /// A peer that never accepts another frame
    struct StalledSink;

    impl Sink<Message> for StalledSink {
        type Error = tungstenite::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }
    }

    /// Records every frame written to it
    #[derive(Clone, Default)]
    struct RecordingSink {
        frames: Arc<Mutex<Vec<Message>>>,
    }

    impl RecordingSink {
        fn frames(&self) -> Vec<Message> {
            self.frames.lock().unwrap().clone()
        }
    }

    impl Sink<Message> for RecordingSink {
        type Error = tungstenite::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
            self.frames.lock().unwrap().push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_times_out_on_stalled_peer() {
        let mut sink = StalledSink;
        let started = Instant::now();

        let result = write(&mut sink, Message::Text("late".to_string()), WRITE_WAIT).await;

        assert!(matches!(result, Err(AppError::WriteTimeout)));
        assert!(started.elapsed() >= WRITE_WAIT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_loop_fails_on_stalled_peer() {
        let id = ConnectionId::new();
        let (client, outbox) = Client::channel(id, 4);
        client.try_send("queued".into()).unwrap();

        let result = write_loop(id, StalledSink, outbox, PING_PERIOD, WRITE_WAIT).await;

        assert!(matches!(result, Err(AppError::WriteTimeout)));
    }

    #[tokio::test]
    async fn test_write_loop_drains_then_closes() {
        let id = ConnectionId::new();
        let (client, outbox) = Client::channel(id, 4);
        client.try_send("first".into()).unwrap();
        client.try_send("second".into()).unwrap();
        client.close();

        let sink = RecordingSink::default();
        let result = write_loop(id, sink.clone(), outbox, PING_PERIOD, WRITE_WAIT).await;

        assert!(result.is_ok());
        assert_eq!(
            sink.frames(),
            vec![
                Message::Text("first".to_string()),
                Message::Text("second".to_string()),
                Message::Close(None),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_loop_pings_on_tick() {
        let id = ConnectionId::new();
        let (client, outbox) = Client::channel(id, 4);
        let sink = RecordingSink::default();
        let task = tokio::spawn(write_loop(id, sink.clone(), outbox, PING_PERIOD, WRITE_WAIT));

        tokio::time::sleep(PING_PERIOD + Duration::from_secs(1)).await;
        client.close();
        task.await.unwrap().unwrap();

        assert_eq!(sink.frames(), vec![Message::Ping(Vec::new()), Message::Close(None)]);
    }
}
