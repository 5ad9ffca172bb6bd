//! Reservation repository interface
//!
//! Read side only. Reservations are written through
//! [`SlotRepository::commit`](crate::domain::slot::SlotRepository::commit)
//! together with the slot they hold.

use async_trait::async_trait;

use super::model::Reservation;
use crate::domain::DomainResult;

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Reservation>>;

    /// Open (PENDING / ACTIVE) reservation for a slot
    async fn find_open_for_slot(&self, slot_id: &str) -> DomainResult<Option<Reservation>>;

    /// All reservations of a user, newest first
    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<Reservation>>;
}
