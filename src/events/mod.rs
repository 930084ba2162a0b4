use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Events emitted by the procurement engine.
///
/// Status values are carried as strings so downstream consumers do not need
/// the entity enum to deserialize them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    PurchaseOrderCreated(Uuid),
    PurchaseOrderStatusChanged {
        purchase_order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    MerchandiseReceived {
        purchase_order_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    PurchaseOrderDuplicated {
        source_order_id: Uuid,
        new_order_id: Uuid,
    },
    PurchaseOrderDeleted(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    /// Event delivery is never allowed to fail a committed operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event after send failure: {}", e);
        }
    }
}

/// Convenience constructor for an event channel pair.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event() {
        let (sender, mut rx) = channel(4);
        sender
            .send(Event::PurchaseOrderCreated(Uuid::new_v4()))
            .await
            .expect("send should succeed");
        assert!(matches!(
            rx.recv().await,
            Some(Event::PurchaseOrderCreated(_))
        ));
    }

    #[tokio::test]
    async fn send_or_log_survives_closed_channel() {
        let (sender, rx) = channel(1);
        drop(rx);
        sender.send_or_log(Event::PurchaseOrderDeleted(Uuid::new_v4())).await;
    }
}
