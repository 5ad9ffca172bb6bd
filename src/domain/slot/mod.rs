//! Slot aggregate
//!
//! Contains the Slot entity, related types, and repository interface.

pub mod model;
pub mod repository;

pub use model::{Coordinates, Slot, SlotLocation, SlotStatus, SlotType};
pub use repository::{SlotCommit, SlotRepository};
