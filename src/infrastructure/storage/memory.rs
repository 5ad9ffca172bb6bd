//! In-memory repository implementation
//!
//! Every slot lives in a `DashMap` entry; a commit holds that entry's write
//! lock while it checks the version and writes the paired ledger records,
//! so two different slots never contend with each other.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::{
    DomainError, DomainResult, ParkingSession, RepositoryProvider, Reservation,
    ReservationRepository, SessionRepository, Slot, SlotCommit, SlotRepository,
};

/// In-memory store for development and testing
#[derive(Default)]
pub struct InMemoryStore {
    slots: DashMap<String, Slot>,
    /// slot number → slot id
    numbers: DashMap<String, String>,
    reservations: DashMap<String, Reservation>,
    sessions: DashMap<String, ParkingSession>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

impl RepositoryProvider for InMemoryStore {
    fn slots(&self) -> &dyn SlotRepository {
        self
    }

    fn reservations(&self) -> &dyn ReservationRepository {
        self
    }

    fn sessions(&self) -> &dyn SessionRepository {
        self
    }
}

#[async_trait]
impl SlotRepository for InMemoryStore {
    async fn insert(&self, slot: Slot) -> DomainResult<()> {
        if self.slots.contains_key(&slot.id) {
            return Err(DomainError::AlreadyExists(format!("slot id {}", slot.id)));
        }
        match self.numbers.entry(slot.number.clone()) {
            Entry::Occupied(_) => Err(DomainError::AlreadyExists(format!(
                "slot number {}",
                slot.number
            ))),
            Entry::Vacant(number) => {
                match self.slots.entry(slot.id.clone()) {
                    Entry::Occupied(_) => {
                        return Err(DomainError::AlreadyExists(format!("slot id {}", slot.id)))
                    }
                    Entry::Vacant(entry) => {
                        number.insert(slot.id.clone());
                        entry.insert(slot);
                    }
                }
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Slot>> {
        Ok(self.slots.get(id).map(|s| s.clone()))
    }

    async fn find_by_number(&self, number: &str) -> DomainResult<Option<Slot>> {
        let id = match self.numbers.get(number) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        Ok(self.slots.get(&id).map(|s| s.clone()))
    }

    async fn find_all(&self) -> DomainResult<Vec<Slot>> {
        let mut slots: Vec<Slot> = self.slots.iter().map(|e| e.value().clone()).collect();
        slots.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(slots)
    }

    async fn commit(&self, commit: SlotCommit) -> DomainResult<()> {
        let SlotCommit {
            expected_version,
            slot,
            reservation,
            session,
        } = commit;

        let mut stored = self
            .slots
            .get_mut(&slot.id)
            .ok_or_else(|| DomainError::slot_not_found(&slot.id))?;

        if stored.version != expected_version {
            return Err(DomainError::Conflict {
                slot_id: slot.id.clone(),
                expected: expected_version,
                current: stored.version,
                status: stored.status,
            });
        }
        if slot.version <= stored.version || slot.number != stored.number {
            return Err(DomainError::Storage(format!(
                "rejected commit for slot {}: version must increase and number is immutable",
                slot.id
            )));
        }

        // Still holding the slot entry lock.
        if let Some(r) = reservation {
            self.reservations.insert(r.id.clone(), r);
        }
        if let Some(s) = session {
            self.sessions.insert(s.id.clone(), s);
        }
        *stored = slot;
        Ok(())
    }
}

#[async_trait]
impl ReservationRepository for InMemoryStore {
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Reservation>> {
        Ok(self.reservations.get(id).map(|r| r.clone()))
    }

    async fn find_open_for_slot(&self, slot_id: &str) -> DomainResult<Option<Reservation>> {
        Ok(self
            .reservations
            .iter()
            .find(|r| r.slot_id == slot_id && r.is_open())
            .map(|r| r.clone()))
    }

    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<Reservation>> {
        let mut found: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<ParkingSession>> {
        Ok(self.sessions.get(id).map(|s| s.clone()))
    }

    async fn find_open_for_slot(&self, slot_id: &str) -> DomainResult<Option<ParkingSession>> {
        Ok(self
            .sessions
            .iter()
            .find(|s| s.slot_id == slot_id && s.is_open())
            .map(|s| s.clone()))
    }

    async fn find_by_user(&self, user_id: &str) -> DomainResult<Vec<ParkingSession>> {
        let mut found: Vec<ParkingSession> = self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.clone())
            .collect();
        found.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(found)
    }
}
