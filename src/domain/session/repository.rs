//! Parking session repository interface

use async_trait::async_trait;

use super::model::ParkingSession;
use crate::domain::DomainResult;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<ParkingSession>>;

    /// Open session occupying a slot
    async fn find_open_for_slot(&self, slot_id: &str) -> DomainResult<Option<ParkingSession>>;

    /// All sessions of a user, newest first
    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<ParkingSession>>;
}
