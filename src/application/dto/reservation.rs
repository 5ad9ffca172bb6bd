//! Reservation, occupancy and override DTOs

use chrono::Duration;
use serde::Serialize;

use crate::domain::{CheckInMethod, ParkingSession, Reservation, Slot, SlotStatus, VehicleInfo};

#[derive(Debug, Clone, Default)]
pub struct ReserveRequest {
    pub slot_id: String,
    /// Version the caller observed; the current one when unset
    pub expected_version: Option<u64>,
    /// Hold duration; the configured default when unset
    pub ttl: Option<Duration>,
    pub vehicle: Option<VehicleInfo>,
    pub notes: Option<String>,
}

impl ReserveRequest {
    pub fn new(slot_id: impl Into<String>) -> Self {
        Self {
            slot_id: slot_id.into(),
            ..Self::default()
        }
    }

    pub fn at_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct OccupyRequest {
    pub slot_id: String,
    pub expected_version: Option<u64>,
    pub method: CheckInMethod,
    pub vehicle: Option<VehicleInfo>,
}

impl OccupyRequest {
    pub fn new(slot_id: impl Into<String>) -> Self {
        Self {
            slot_id: slot_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VacateRequest {
    pub slot_id: String,
    pub expected_version: Option<u64>,
    pub check_out_method: CheckInMethod,
}

impl VacateRequest {
    pub fn new(slot_id: impl Into<String>) -> Self {
        Self {
            slot_id: slot_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverrideRequest {
    pub slot_id: String,
    pub status: SlotStatus,
    pub reason: Option<String>,
    pub expected_version: Option<u64>,
}

impl OverrideRequest {
    pub fn new(slot_id: impl Into<String>, status: SlotStatus) -> Self {
        Self {
            slot_id: slot_id.into(),
            status,
            reason: None,
            expected_version: None,
        }
    }
}

/// Slot and reservation after reserve / activate / cancel / expire
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservationOutcome {
    pub slot: Slot,
    pub reservation: Reservation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancyOutcome {
    pub slot: Slot,
    pub session: ParkingSession,
    /// Reservation honoured by the check-in
    pub completed_reservation: Option<Reservation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VacateOutcome {
    pub slot: Slot,
    pub session: Option<ParkingSession>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideOutcome {
    pub slot: Slot,
    pub previous_status: SlotStatus,
    pub cancelled_reservation: Option<Reservation>,
    pub closed_session: Option<ParkingSession>,
}

/// Parking history of one user, newest first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserHistory {
    pub reservations: Vec<Reservation>,
    pub sessions: Vec<ParkingSession>,
}
