//! # Parking Slot Service
//!
//! Tracks the occupancy lifecycle of a finite set of parking slots shared
//! by many concurrent users. A slot is never double-booked and
//! time-limited reservations expire deterministically.
//!
//! ## Architecture
//!
//! - **domain**: Slots, reservations, parking sessions, actors and the
//!   repository traits behind which they are stored
//! - **application**: The slot state machine, reservation ledger, access
//!   rules, the orchestrating `SlotService` and the expiry sweeper
//! - **infrastructure**: In-memory storage with per-slot compare-and-swap
//! - **notifications**: Events emitted on every state change and the
//!   broadcast bus that fans them out
//! - **server**: Runtime wiring, tracing and graceful shutdown

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod notifications;
pub mod server;
pub mod support;

pub use config::{default_config_path, AppConfig, ConfigError};

// Re-export the public service surface
pub use application::{ExpiryScheduler, SlotService};
pub use domain::{Actor, DomainError, DomainResult, UserRole};

// Re-export notifications
pub use notifications::{create_event_bus, Event, EventBus, NotificationSink, SharedEventBus};
