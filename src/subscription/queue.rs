//! Delivery queues and the unit they carry.

use tokio::sync::{mpsc, Mutex};

use crate::error::{Result, StompError};
use crate::protocol::{Command, Frame};

/// One delivery: a frame, an error, or (for a broker ERROR frame) both.
#[derive(Debug, Clone)]
pub struct MessageData {
    pub message: Option<Frame>,
    pub error: Option<StompError>,
}

impl MessageData {
    pub fn message(frame: Frame) -> Self {
        Self {
            message: Some(frame),
            error: None,
        }
    }

    pub fn error(error: StompError) -> Self {
        Self {
            message: None,
            error: Some(error),
        }
    }

    /// Wrap a broker ERROR frame, keeping the frame for inspection.
    pub(crate) fn broker_error(frame: Frame) -> Self {
        let error = StompError::BrokerError(frame.error_message());
        Self {
            message: Some(frame),
            error: Some(error),
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Command of the carried frame, if any.
    pub fn command(&self) -> Option<Command> {
        self.message.as_ref().map(|f| f.command)
    }

    /// The frame, or the error if one is attached.
    pub fn into_result(self) -> Result<Frame> {
        match (self.error, self.message) {
            (Some(e), _) => Err(e),
            (None, Some(frame)) => Ok(frame),
            (None, None) => Err(StompError::ConnectionClosed),
        }
    }
}

/// Receiving end of a subscription or of the catch-all queue.
///
/// Items arrive in wire order. Once the queue is closed (Unsubscribe,
/// Disconnect, or transport failure) already queued items can still be
/// drained, after which [`recv`](Self::recv) returns `None`.
#[derive(Debug)]
pub struct DeliveryQueue {
    id: String,
    rx: Mutex<mpsc::Receiver<MessageData>>,
}

impl DeliveryQueue {
    pub(crate) fn new(id: impl Into<String>, rx: mpsc::Receiver<MessageData>) -> Self {
        Self {
            id: id.into(),
            rx: Mutex::new(rx),
        }
    }

    /// Subscription id this queue belongs to (empty for the catch-all).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next delivery. `None` means the queue is closed and empty.
    pub async fn recv(&self) -> Option<MessageData> {
        self.rx.lock().await.recv().await
    }

    /// Next delivery if one is ready right now.
    pub fn try_recv(&self) -> Option<MessageData> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Headers;
    use bytes::Bytes;

    fn frame(body: &'static [u8]) -> Frame {
        Frame::new(Command::Message, Headers::new(), Bytes::from_static(body))
    }

    #[tokio::test]
    async fn test_drain_after_close() {
        let (tx, rx) = mpsc::channel(4);
        let queue = DeliveryQueue::new("s1", rx);

        tx.send(MessageData::message(frame(b"a"))).await.unwrap();
        tx.send(MessageData::message(frame(b"b"))).await.unwrap();
        drop(tx);

        assert_eq!(queue.recv().await.unwrap().message.unwrap().body(), b"a");
        assert_eq!(queue.recv().await.unwrap().message.unwrap().body(), b"b");
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let (_tx, rx) = mpsc::channel(1);
        let queue = DeliveryQueue::new("", rx);
        assert!(queue.try_recv().is_none());
        assert_eq!(queue.id(), "");
    }

    #[test]
    fn test_broker_error_keeps_frame() {
        let f = Frame::new(
            Command::Error,
            Headers::new().add("message", "no such queue"),
            Bytes::new(),
        );
        let md = MessageData::broker_error(f);
        assert!(md.is_error());
        assert_eq!(md.command(), Some(Command::Error));
        assert!(matches!(
            md.into_result(),
            Err(StompError::BrokerError(m)) if m == "no such queue"
        ));
    }
}
