//! Parking session aggregate

pub mod model;
pub mod repository;

pub use model::{CheckInMethod, ParkingSession, SessionStatus};
pub use repository::SessionRepository;
