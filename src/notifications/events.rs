//! Notification events
//!
//! One event per committed state change, plus the expiry reminder. The
//! delivery collaborator decides how an [`Audience`] maps to devices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CheckInMethod, SlotStatus, SlotType};

/// Who should hear about an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Audience {
    User(String),
    Admins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

/// Event types for notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    SlotCreated(SlotCreatedEvent),
    SlotReserved(SlotReservedEvent),
    ReservationActivated(ReservationActivatedEvent),
    SlotOccupied(SlotOccupiedEvent),
    SlotVacated(SlotVacatedEvent),
    ReservationCancelled(ReservationCancelledEvent),
    ReservationExpired(ReservationExpiredEvent),
    /// Reminder, not a state change
    ReservationExpiring(ReservationExpiringEvent),
    SlotStatusOverridden(SlotStatusOverriddenEvent),
    SlotActivationChanged(SlotActivationChangedEvent),
}

impl Event {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::SlotCreated(_) => "slot_created",
            Event::SlotReserved(_) => "slot_reserved",
            Event::ReservationActivated(_) => "reservation_activated",
            Event::SlotOccupied(_) => "slot_occupied",
            Event::SlotVacated(_) => "slot_vacated",
            Event::ReservationCancelled(_) => "reservation_cancelled",
            Event::ReservationExpired(_) => "reservation_expired",
            Event::ReservationExpiring(_) => "reservation_expiring",
            Event::SlotStatusOverridden(_) => "slot_status_overridden",
            Event::SlotActivationChanged(_) => "slot_activation_changed",
        }
    }

    pub fn slot_id(&self) -> &str {
        match self {
            Event::SlotCreated(e) => &e.slot_id,
            Event::SlotReserved(e) => &e.slot_id,
            Event::ReservationActivated(e) => &e.slot_id,
            Event::SlotOccupied(e) => &e.slot_id,
            Event::SlotVacated(e) => &e.slot_id,
            Event::ReservationCancelled(e) => &e.slot_id,
            Event::ReservationExpired(e) => &e.slot_id,
            Event::ReservationExpiring(e) => &e.slot_id,
            Event::SlotStatusOverridden(e) => &e.slot_id,
            Event::SlotActivationChanged(e) => &e.slot_id,
        }
    }

    pub fn audience(&self) -> Audience {
        match self {
            Event::SlotReserved(e) => Audience::User(e.user_id.clone()),
            Event::ReservationActivated(e) => Audience::User(e.user_id.clone()),
            Event::SlotOccupied(e) => Audience::User(e.user_id.clone()),
            Event::SlotVacated(e) => Audience::User(e.user_id.clone()),
            Event::ReservationCancelled(e) => Audience::User(e.user_id.clone()),
            Event::ReservationExpired(e) => Audience::User(e.user_id.clone()),
            Event::ReservationExpiring(e) => Audience::User(e.user_id.clone()),
            // the driver whose hold or session was cut short hears first
            Event::SlotStatusOverridden(e) => match &e.affected_user {
                Some(user_id) => Audience::User(user_id.clone()),
                None => Audience::Admins,
            },
            Event::SlotCreated(_) | Event::SlotActivationChanged(_) => Audience::Admins,
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            Event::ReservationExpiring(_) | Event::ReservationExpired(_) => Priority::High,
            Event::SlotStatusOverridden(e) if e.affected_user.is_some() => Priority::High,
            Event::SlotCreated(_) | Event::SlotActivationChanged(_) => Priority::Low,
            _ => Priority::Normal,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::SlotCreated(e) => e.timestamp,
            Event::SlotReserved(e) => e.timestamp,
            Event::ReservationActivated(e) => e.timestamp,
            Event::SlotOccupied(e) => e.timestamp,
            Event::SlotVacated(e) => e.timestamp,
            Event::ReservationCancelled(e) => e.timestamp,
            Event::ReservationExpired(e) => e.timestamp,
            Event::ReservationExpiring(e) => e.timestamp,
            Event::SlotStatusOverridden(e) => e.timestamp,
            Event::SlotActivationChanged(e) => e.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotCreatedEvent {
    pub slot_id: String,
    pub slot_number: String,
    pub slot_type: SlotType,
    pub created_by: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotReservedEvent {
    pub slot_id: String,
    pub slot_number: String,
    pub user_id: String,
    pub reservation_id: String,
    pub expires_at: DateTime<Utc>,
    pub version: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationActivatedEvent {
    pub slot_id: String,
    pub user_id: String,
    pub reservation_id: String,
    pub expires_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotOccupiedEvent {
    pub slot_id: String,
    pub slot_number: String,
    pub user_id: String,
    pub session_id: String,
    /// Reservation honoured by this check-in
    pub reservation_id: Option<String>,
    pub check_in_method: CheckInMethod,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotVacatedEvent {
    pub slot_id: String,
    pub slot_number: String,
    pub user_id: String,
    pub session_id: String,
    pub duration_secs: i64,
    pub total_cost: Option<f64>,
    pub currency: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationCancelledEvent {
    pub slot_id: String,
    pub user_id: String,
    pub reservation_id: String,
    pub cancelled_by: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationExpiredEvent {
    pub slot_id: String,
    pub slot_number: String,
    pub user_id: String,
    pub reservation_id: String,
    pub expired_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationExpiringEvent {
    pub slot_id: String,
    pub user_id: String,
    pub reservation_id: String,
    pub expires_at: DateTime<Utc>,
    pub seconds_left: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotStatusOverriddenEvent {
    pub slot_id: String,
    pub admin_id: String,
    pub old_status: SlotStatus,
    pub new_status: SlotStatus,
    pub reason: Option<String>,
    /// Reservation force-cancelled by the override
    pub cancelled_reservation: Option<String>,
    /// Session force-closed by the override
    pub closed_session: Option<String>,
    /// Driver whose reservation or session was cut short
    pub affected_user: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotActivationChangedEvent {
    pub slot_id: String,
    pub admin_id: String,
    pub is_active: bool,
    pub timestamp: DateTime<Utc>,
}

/// Wrapper for sending events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub audience: Audience,
    pub priority: Priority,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            audience: event.audience(),
            priority: event.priority(),
            event,
        }
    }
}
