//! Notifications module
//!
//! The core emits one [`Event`] per committed state change through a
//! [`NotificationSink`]. The bundled [`EventBus`] fans events out to any
//! number of subscribers (push delivery, audit log, dashboards).
//!
//! # Usage
//! ```ignore
//! use parking_service::notifications::{create_event_bus, NotificationSink};
//!
//! let bus = create_event_bus();
//! let mut subscriber = bus.subscribe();
//! // hand `bus.clone()` to SlotService as its sink
//! while let Some(message) = subscriber.recv().await {
//!     println!("{} -> {:?}", message.event.event_type(), message.audience);
//! }
//! ```

pub mod event_bus;
pub mod events;

pub use event_bus::{
    create_event_bus, EventBus, EventSubscriber, NotificationSink, SharedEventBus, SharedSink,
};
pub use events::*;
