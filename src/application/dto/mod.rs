//! Request and response types for the slot service

pub mod reservation;
pub mod slot;

pub use reservation::{
    OccupancyOutcome, OccupyRequest, OverrideOutcome, OverrideRequest, ReservationOutcome,
    ReserveRequest, UserHistory, VacateOutcome, VacateRequest,
};
pub use slot::{AvailabilitySummary, CreateSlotRequest, ScannedSlot, SlotFilter};
