//! Slot registry — authoritative slot state and its guarded transitions
//!
//! [`SlotRegistry::apply`] is the state machine: it takes the slot as last
//! read plus the version the caller observed, checks every guard and
//! returns the next state with the version bumped. Nothing is written
//! until [`SlotRegistry::commit`] hands that state, together with the
//! ledger records that change with it, to the store's compare-and-swap.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::access::{AccessValidator, Capability};
use crate::domain::{
    Actor, DomainError, DomainResult, ParkingSession, RepositoryProvider, Reservation, Slot,
    SlotCommit, SlotStatus,
};

/// Requested change to one slot
#[derive(Debug, Clone, PartialEq)]
pub enum SlotTransition {
    /// VACANT → RESERVED
    Reserve {
        user_id: String,
        reservation_id: String,
        until: DateTime<Utc>,
    },
    /// RESERVED → RESERVED; the reservation moves to ACTIVE
    Activate { user_id: String },
    /// VACANT → OCCUPIED, or RESERVED → OCCUPIED for the reservation owner
    Occupy { user_id: String },
    /// OCCUPIED → VACANT
    Vacate { actor: Actor },
    /// RESERVED → VACANT on owner or admin request
    Cancel { actor: Actor, reservation_id: String },
    /// RESERVED → VACANT once the deadline has passed
    Expire { reservation_id: String },
    /// Any → VACANT / OUT_OF_ORDER / MAINTENANCE, admin authority checked by the caller
    Override { status: SlotStatus },
    /// Take a slot out of service or put it back
    SetActive { active: bool },
}

impl SlotTransition {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Reserve { .. } => "reserve",
            Self::Activate { .. } => "activate",
            Self::Occupy { .. } => "occupy",
            Self::Vacate { .. } => "vacate",
            Self::Cancel { .. } => "cancel",
            Self::Expire { .. } => "expire",
            Self::Override { .. } => "override",
            Self::SetActive { .. } => "set_active",
        }
    }
}

pub struct SlotRegistry {
    repos: Arc<dyn RepositoryProvider>,
}

impl SlotRegistry {
    pub fn new(repos: Arc<dyn RepositoryProvider>) -> Self {
        Self { repos }
    }

    pub async fn get(&self, slot_id: &str) -> DomainResult<Slot> {
        self.repos
            .slots()
            .find_by_id(slot_id)
            .await?
            .ok_or_else(|| DomainError::slot_not_found(slot_id))
    }

    pub async fn find_by_number(&self, number: &str) -> DomainResult<Option<Slot>> {
        self.repos.slots().find_by_number(number).await
    }

    pub async fn list(&self) -> DomainResult<Vec<Slot>> {
        self.repos.slots().find_all().await
    }

    /// Add a freshly built slot at version 0
    pub async fn register(&self, slot: Slot) -> DomainResult<()> {
        if slot.version != 0 || !slot.check_invariants() {
            return Err(DomainError::Validation(format!(
                "slot {} must be registered vacant at version 0",
                slot.number
            )));
        }
        self.repos.slots().insert(slot).await
    }

    /// Check guards and compute the next state of `current`.
    pub fn apply(
        current: &Slot,
        expected_version: u64,
        transition: &SlotTransition,
        now: DateTime<Utc>,
    ) -> DomainResult<Slot> {
        if current.version != expected_version {
            return Err(conflict(current, expected_version));
        }

        let action = transition.action();
        let mut next = current.clone();

        match transition {
            SlotTransition::Reserve {
                user_id,
                reservation_id,
                until,
            } => {
                ensure_in_service(current, action)?;
                match current.status {
                    SlotStatus::Vacant => {}
                    // someone else got there first
                    SlotStatus::Reserved | SlotStatus::Occupied => {
                        return Err(conflict(current, expected_version))
                    }
                    _ => return Err(invalid(current, action)),
                }
                if *until <= now {
                    return Err(DomainError::Validation(
                        "reservation deadline must be in the future".into(),
                    ));
                }
                next.status = SlotStatus::Reserved;
                next.reservation_id = Some(reservation_id.clone());
                next.reserved_by = Some(user_id.clone());
                next.active_until = Some(*until);
            }

            SlotTransition::Activate { user_id } => {
                if current.status != SlotStatus::Reserved {
                    return Err(invalid(current, action));
                }
                if !current.is_reserved_by(user_id) {
                    return Err(DomainError::PermissionDenied(format!(
                        "slot {} is not reserved by {}",
                        current.number, user_id
                    )));
                }
                if current.reservation_lapsed(now) {
                    return Err(expired(current));
                }
            }

            SlotTransition::Occupy { user_id } => {
                ensure_in_service(current, action)?;
                match current.status {
                    SlotStatus::Vacant => {}
                    SlotStatus::Reserved => {
                        if !current.is_reserved_by(user_id) {
                            return Err(DomainError::PermissionDenied(format!(
                                "slot {} is reserved by another user",
                                current.number
                            )));
                        }
                        if current.reservation_lapsed(now) {
                            return Err(expired(current));
                        }
                    }
                    _ => return Err(invalid(current, action)),
                }
                next.clear_holds();
                next.status = SlotStatus::Occupied;
                next.occupant = Some(user_id.clone());
            }

            SlotTransition::Vacate { actor } => {
                if current.status != SlotStatus::Occupied {
                    return Err(invalid(current, action));
                }
                if !current.is_occupied_by(&actor.user_id)
                    && !AccessValidator::can(actor, Capability::VacateAnySlot) {
                    return Err(DomainError::PermissionDenied(format!(
                        "{} is not the occupant of slot {}",
                        actor.user_id, current.number
                    )));
                }
                next.clear_holds();
                next.status = SlotStatus::Vacant;
            }

            SlotTransition::Cancel {
                actor,
                reservation_id,
            } => {
                ensure_holds(current, reservation_id, action)?;
                if !current.is_reserved_by(&actor.user_id)
                    && !AccessValidator::can(actor, Capability::CancelAnyReservation) {
                    return Err(DomainError::PermissionDenied(format!(
                        "{} does not own reservation {}",
                        actor.user_id, reservation_id
                    )));
                }
                next.clear_holds();
                next.status = SlotStatus::Vacant;
            }

            SlotTransition::Expire { reservation_id } => {
                ensure_holds(current, reservation_id, action)?;
                if !current.reservation_lapsed(now) {
                    return Err(invalid(current, action));
                }
                next.clear_holds();
                next.status = SlotStatus::Vacant;
            }

            SlotTransition::Override { status } => match status {
                SlotStatus::Vacant | SlotStatus::OutOfOrder | SlotStatus::Maintenance => {
                    next.clear_holds();
                    next.status = *status;
                }
                // both need an owner; admins go through reserve / occupy
                SlotStatus::Reserved | SlotStatus::Occupied => {
                    return Err(invalid(current, action))
                }
            },

            SlotTransition::SetActive { active } => {
                if matches!(current.status, SlotStatus::Reserved | SlotStatus::Occupied) {
                    return Err(invalid(current, action));
                }
                next.is_active = *active;
            }
        }

        next.version = current.version + 1;
        next.updated_at = now;
        debug_assert!(next.check_invariants(), "transition broke slot invariants");
        Ok(next)
    }

    /// Persist `next` with its paired ledger records if `current` is still
    /// the stored version.
    pub async fn commit(
        &self,
        current: &Slot,
        next: Slot,
        reservation: Option<Reservation>,
        session: Option<ParkingSession>,
    ) -> DomainResult<Slot> {
        let commit = SlotCommit {
            expected_version: current.version,
            slot: next.clone(),
            reservation,
            session,
        };
        match self.repos.slots().commit(commit).await {
            Ok(()) => Ok(next),
            Err(e) => {
                if e.is_retryable() {
                    debug!(slot_id = %current.id, version = current.version, "Lost slot CAS");
                }
                Err(e)
            }
        }
    }
}

fn conflict(current: &Slot, expected: u64) -> DomainError {
    DomainError::Conflict {
        slot_id: current.id.clone(),
        expected,
        current: current.version,
        status: current.status,
    }
}

fn invalid(current: &Slot, action: &'static str) -> DomainError {
    DomainError::InvalidTransition {
        slot_id: current.id.clone(),
        action,
        status: current.status,
        version: current.version,
    }
}

fn expired(current: &Slot) -> DomainError {
    DomainError::Expired {
        reservation_id: current.reservation_id.clone().unwrap_or_default(),
        slot_id: current.id.clone(),
        expired_at: current.active_until.unwrap_or(current.updated_at),
    }
}

fn ensure_in_service(current: &Slot, action: &'static str) -> DomainResult<()> {
    if current.is_active {
        Ok(())
    } else {
        Err(invalid(current, action))
    }
}

fn ensure_holds(current: &Slot, reservation_id: &str, action: &'static str) -> DomainResult<()> {
    if current.status == SlotStatus::Reserved
        && current.reservation_id.as_deref() == Some(reservation_id)
    {
        Ok(())
    } else {
        Err(invalid(current, action))
    }
}
