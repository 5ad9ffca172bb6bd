//! Application layer: the slot state machine, the reservation ledger, the
//! service that composes them and the background expiry sweeper.

pub mod access;
pub mod dto;
pub mod expiry;
pub mod ledger;
pub mod registry;
pub mod service;

// Re-export key types for convenience
pub use access::{AccessValidator, Capability, ScanTarget};
pub use dto::{
    AvailabilitySummary, CreateSlotRequest, OccupancyOutcome, OccupyRequest, OverrideOutcome,
    OverrideRequest, ReservationOutcome, ReserveRequest, ScannedSlot, SlotFilter, UserHistory,
    VacateOutcome, VacateRequest,
};
pub use expiry::{ExpiryScheduler, SweepReport};
pub use ledger::ReservationLedger;
pub use registry::{SlotRegistry, SlotTransition};
pub use service::SlotService;
