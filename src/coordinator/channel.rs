//! One-way message channel from workers to the coordinator.

use crate::models::WorkerMessage;
use tokio::sync::mpsc;
use tracing::debug;

/// Fire-and-forget handle given to each worker.
#[derive(Debug, Clone)]
pub struct MessageSender {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl MessageSender {
    /// Post a message. A closed channel is not an error for the worker.
    pub fn send(&self, msg: WorkerMessage) {
        if self.tx.send(msg).is_err() {
            debug!("Message channel closed; dropping worker message");
        }
    }
}

/// A single long-lived subscription shared by every run in the session.
///
/// Messages carry their run id, so the subscription never has to be rebound
/// when a new run starts.
#[derive(Debug)]
pub struct MessageChannel {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    rx: Option<mpsc::UnboundedReceiver<WorkerMessage>>,
}

impl Default for MessageChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }

    /// A new sender for a worker.
    pub fn sender(&self) -> MessageSender {
        MessageSender {
            tx: self.tx.clone(),
        }
    }

    /// Take the receiving end. Only the first call returns `Some`.
    pub fn subscribe(&mut self) -> Option<mpsc::UnboundedReceiver<WorkerMessage>> {
        self.rx.take()
    }
}
