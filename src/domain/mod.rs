//! Domain layer: entities, value types and repository interfaces

pub mod repositories;
pub mod reservation;
pub mod session;
pub mod slot;
pub mod user;

// Re-export commonly used types
pub use repositories::{DomainResult, RepositoryProvider};
pub use reservation::{Reservation, ReservationRepository, ReservationStatus, VehicleInfo};
pub use session::{CheckInMethod, ParkingSession, SessionRepository, SessionStatus};
pub use slot::{Coordinates, Slot, SlotCommit, SlotLocation, SlotRepository, SlotStatus, SlotType};
pub use user::{Actor, UserRole};

// Re-export DomainError from support for convenience
pub use crate::support::errors::DomainError;
