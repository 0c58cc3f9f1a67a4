//! Hand-off of matched messages to the delivery worker.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::MessageDispatcher;

/// Queues messages for an async worker without blocking the controller.
/// Delivery, retries and failures belong to the worker.
#[derive(Clone)]
pub struct QueuedDispatcher {
    tx: mpsc::Sender<String>,
}

impl QueuedDispatcher {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl MessageDispatcher for QueuedDispatcher {
    fn dispatch(&self, message: &str) {
        match self.tx.try_send(message.to_string()) {
            Ok(()) => debug!("queued matched message for delivery"),
            Err(TrySendError::Full(_)) => {
                warn!("dispatch queue is full; dropping matched message");
            }
            Err(TrySendError::Closed(_)) => {
                warn!("dispatch worker has stopped; dropping matched message");
            }
        }
    }
}
