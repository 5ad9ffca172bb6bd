//! Broadcast fan-out of notifications
//!
//! The service only sees a [`NotificationSink`]; [`EventBus`] is the
//! in-process sink that wraps each event in an [`EventMessage`] and hands
//! it to every live [`EventSubscriber`].

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::events::{Event, EventMessage};

/// Messages a slow subscriber may fall behind by before it starts losing them
const CHANNEL_CAPACITY: usize = 1024;

/// Where the core hands off notifications. Fire-and-forget: delivery
/// guarantees belong to the implementation.
pub trait NotificationSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Shared sink handle
pub type SharedSink = Arc<dyn NotificationSink>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventMessage>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Wrap and broadcast; dropped silently when nobody listens.
    pub fn publish(&self, event: Event) {
        let message = EventMessage::new(event);
        let event_type = message.event.event_type();
        let delivered = self.sender.send(message).unwrap_or(0);
        debug!(event_type, delivered, "Event published");
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for EventBus {
    fn emit(&self, event: Event) {
        self.publish(event);
    }
}

/// Receiving end of the bus. Lagging skips the missed messages.
pub struct EventSubscriber {
    receiver: broadcast::Receiver<EventMessage>,
}

impl EventSubscriber {
    /// Next event; `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Notification subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-published event, without waiting
    pub fn try_recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Notification subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

/// Shared event bus type
pub type SharedEventBus = Arc<EventBus>;

/// Create a shared event bus
pub fn create_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}
