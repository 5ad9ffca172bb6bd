//! Caller identity

pub mod model;

pub use model::{Actor, UserRole};
