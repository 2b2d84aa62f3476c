//! Client handle and outbound queue
//!
//! A `Client` is the producer side of one connection's outbound queue. Rooms
//! hold clones of it; the connection's write loop owns the matching `Outbox`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

use crate::error::SendError;
use crate::types::ConnectionId;

/// Serialized text frame, shared between every member of a broadcast
pub type OutboundFrame = Arc<str>;

#[derive(Debug, Default)]
struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

/// Connected client handle
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Room → connection frame channel
    sender: mpsc::Sender<OutboundFrame>,
    close: Arc<CloseSignal>,
}

impl Client {
    /// Create a client handle and the outbox its write loop drains
    pub fn channel(id: ConnectionId, capacity: usize) -> (Self, Outbox) {
        let (sender, receiver) = mpsc::channel(capacity);
        let close = Arc::new(CloseSignal::default());
        let client = Self {
            id,
            sender,
            close: close.clone(),
        };
        let outbox = Outbox {
            receiver,
            close,
            closing: false,
        };
        (client, outbox)
    }

    /// Enqueue without waiting
    pub fn try_send(&self, frame: OutboundFrame) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::ChannelClosed);
        }
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Close the outbound queue
    ///
    /// Frames already queued are still written, then the write loop sends a
    /// close frame and exits. Closing twice is harmless.
    pub fn close(&self) {
        if !self.close.closed.swap(true, Ordering::AcqRel) {
            self.close.notify.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.close.closed.load(Ordering::Acquire) || self.sender.is_closed()
    }
}

/// Consumer side of a connection's outbound queue
#[derive(Debug)]
pub struct Outbox {
    receiver: mpsc::Receiver<OutboundFrame>,
    close: Arc<CloseSignal>,
    closing: bool,
}

impl Outbox {
    /// Next frame to write, `None` once the queue is closed and drained
    pub async fn recv(&mut self) -> Option<OutboundFrame> {
        loop {
            if !self.closing && self.close.closed.load(Ordering::Acquire) {
                self.receiver.close();
                self.closing = true;
            }
            if self.closing {
                return self.receiver.recv().await;
            }
            tokio::select! {
                _ = self.close.notify.notified() => continue,
                frame = self.receiver.recv() => return frame,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<OutboundFrame> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &str) -> OutboundFrame {
        Arc::from(text)
    }

    #[tokio::test]
    async fn test_client_send_and_recv() {
        let (client, mut outbox) = Client::channel(ConnectionId::new(), 4);
        client.try_send(frame("a")).unwrap();
        client.try_send(frame("b")).unwrap();

        assert_eq!(outbox.recv().await.as_deref(), Some("a"));
        assert_eq!(outbox.recv().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_try_send_reports_full_queue() {
        let (client, _outbox) = Client::channel(ConnectionId::new(), 1);
        client.try_send(frame("a")).unwrap();
        assert_eq!(client.try_send(frame("b")), Err(SendError::QueueFull));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let (client, mut outbox) = Client::channel(ConnectionId::new(), 4);
        client.try_send(frame("queued")).unwrap();
        client.close();
        client.close();

        assert!(client.is_closed());
        assert_eq!(client.try_send(frame("late")), Err(SendError::ChannelClosed));
        assert_eq!(outbox.recv().await.as_deref(), Some("queued"));
        assert!(outbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_outbox() {
        let (client, mut outbox) = Client::channel(ConnectionId::new(), 4);
        let waiter = tokio::spawn(async move { outbox.recv().await });
        tokio::task::yield_now().await;

        client.clone().close();
        assert!(waiter.await.unwrap().is_none());
    }
}
