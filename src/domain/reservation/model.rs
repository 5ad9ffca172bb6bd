//! Reservation domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reservation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Holding the slot, not yet activated
    Pending,
    /// Driver signalled imminent arrival
    Active,
    /// Honoured by an occupancy
    Completed,
    /// Deadline passed before occupancy
    Expired,
    /// Cancelled by the owner or an admin
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// PENDING or ACTIVE
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub license_plate: Option<String>,
    pub vehicle_type: Option<String>,
    pub color: Option<String>,
    pub model: Option<String>,
}

/// Time-boxed hold on a slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub user_id: String,
    pub slot_id: String,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    /// Deadline, mirrored on the slot as `active_until`
    pub expires_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    /// Stamped when the reservation reaches any terminal status
    pub completed_at: Option<DateTime<Utc>>,
    pub vehicle: Option<VehicleInfo>,
    pub notes: Option<String>,
}

/// Attempted to move a reservation that already reached a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationClosed(pub ReservationStatus);

impl Reservation {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        slot_id: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            slot_id: slot_id.into(),
            status: ReservationStatus::Pending,
            created_at,
            expires_at,
            activated_at: None,
            completed_at: None,
            vehicle: None,
            notes: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// PENDING → ACTIVE
    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<(), ReservationClosed> {
        if self.status != ReservationStatus::Pending {
            return Err(ReservationClosed(self.status));
        }
        self.status = ReservationStatus::Active;
        self.activated_at = Some(now);
        Ok(())
    }

    /// Honoured by an occupancy
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), ReservationClosed> {
        self.close(ReservationStatus::Completed, now)
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), ReservationClosed> {
        self.close(ReservationStatus::Cancelled, now)
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), ReservationClosed> {
        self.close(ReservationStatus::Expired, now)
    }

    fn close(&mut self, to: ReservationStatus, now: DateTime<Utc>) -> Result<(), ReservationClosed> {
        if !self.is_open() {
            return Err(ReservationClosed(self.status));
        }
        self.status = to;
        self.completed_at = Some(now);
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────
