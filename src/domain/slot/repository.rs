//! Slot repository interface

use async_trait::async_trait;

use super::model::Slot;
use crate::domain::reservation::Reservation;
use crate::domain::session::ParkingSession;
use crate::domain::DomainResult;

/// One versioned write: the next slot state plus the ledger records that
/// change with it.
#[derive(Debug, Clone)]
pub struct SlotCommit {
    /// Version the writer last observed
    pub expected_version: u64,
    /// Next state, with `version == expected_version + 1`
    pub slot: Slot,
    pub reservation: Option<Reservation>,
    pub session: Option<ParkingSession>,
}

#[async_trait]
pub trait SlotRepository: Send + Sync {
    /// Insert a new slot; fails with `AlreadyExists` on duplicate id or number
    async fn insert(&self, slot: Slot) -> DomainResult<()>;

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Slot>>;

    async fn find_by_number(&self, number: &str) -> DomainResult<Option<Slot>>;

    /// Snapshot of every slot; may be slightly stale
    async fn find_all(&self) -> DomainResult<Vec<Slot>>;

    /// Compare-and-swap on the slot version.
    ///
    /// Applies the slot and the attached reservation / session records
    /// all-or-nothing. A stored version other than `expected_version`
    /// yields `DomainError::Conflict` and writes nothing.
    async fn commit(&self, commit: SlotCommit) -> DomainResult<()>;
}
