//! Parking slot domain entity

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Physical classification of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotType {
    Standard,
    Bike,
    EvCharging,
    Accessible,
    Compact,
    Oversize,
}

impl SlotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Bike => "BIKE",
            Self::EvCharging => "EV_CHARGING",
            Self::Accessible => "ACCESSIBLE",
            Self::Compact => "COMPACT",
            Self::Oversize => "OVERSIZE",
        }
    }
}

impl Default for SlotType {
    fn default() -> Self {
        Self::Standard
    }
}

impl std::fmt::Display for SlotType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slot occupancy status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    /// Free to reserve or occupy
    Vacant,
    /// Held by a pending or active reservation
    Reserved,
    /// A vehicle is parked
    Occupied,
    /// Broken, only an admin can bring it back
    OutOfOrder,
    /// Under maintenance, only an admin can bring it back
    Maintenance,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vacant => "VACANT",
            Self::Reserved => "RESERVED",
            Self::Occupied => "OCCUPIED",
            Self::OutOfOrder => "OUT_OF_ORDER",
            Self::Maintenance => "MAINTENANCE",
        }
    }
}

impl Default for SlotStatus {
    fn default() -> Self {
        Self::Vacant
    }
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Where the slot physically is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotLocation {
    pub floor: Option<i32>,
    pub section: Option<String>,
    pub row: Option<String>,
    pub coordinates: Option<Coordinates>,
}

/// Parking slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    /// Stable identifier
    pub id: String,
    /// Human-readable number painted on the ground, e.g. "A01"
    pub number: String,
    pub slot_type: SlotType,
    pub status: SlotStatus,
    /// User currently parked here
    pub occupant: Option<String>,
    /// Open reservation holding this slot
    pub reservation_id: Option<String>,
    /// Owner of the open reservation
    pub reserved_by: Option<String>,
    /// Reservation deadline; unset while occupied
    pub active_until: Option<DateTime<Utc>>,
    pub location: SlotLocation,
    pub qr_code: Option<String>,
    pub nfc_tag: Option<String>,
    /// `false` when administratively removed from service
    pub is_active: bool,
    /// Bumped on every mutation, compared on every write
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Slot {
    pub fn new(
        id: impl Into<String>,
        number: impl Into<String>,
        slot_type: SlotType,
        location: SlotLocation,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            number: number.into(),
            slot_type,
            status: SlotStatus::Vacant,
            occupant: None,
            reservation_id: None,
            reserved_by: None,
            active_until: None,
            location,
            qr_code: None,
            nfc_tag: None,
            is_active: true,
            version: 0,
            updated_at: now,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_scan_tokens(mut self, qr_code: Option<String>, nfc_tag: Option<String>) -> Self {
        self.qr_code = qr_code;
        self.nfc_tag = nfc_tag;
        self
    }

    /// Vacant and in service
    pub fn is_available(&self) -> bool {
        self.is_active && self.status == SlotStatus::Vacant
    }

    /// Reserved with a deadline at or before `now`. Ties count as expired.
    pub fn reservation_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == SlotStatus::Reserved
            && self.active_until.map(|until| now >= until).unwrap_or(false)
    }

    /// Whether `user_id` holds the open reservation
    pub fn is_reserved_by(&self, user_id: &str) -> bool {
        self.reserved_by.as_deref() == Some(user_id)
    }

    pub fn is_occupied_by(&self, user_id: &str) -> bool {
        self.occupant.as_deref() == Some(user_id)
    }

    /// Occupant / reservation references agree with the status.
    pub fn check_invariants(&self) -> bool {
        let reserved_refs = self.reservation_id.is_some() && self.reserved_by.is_some();
        let no_reservation_refs = self.reservation_id.is_none()
            && self.reserved_by.is_none()
            && self.active_until.is_none();
        match self.status {
            SlotStatus::Reserved => {
                reserved_refs && self.active_until.is_some() && self.occupant.is_none()
            }
            SlotStatus::Occupied => self.occupant.is_some() && no_reservation_refs,
            SlotStatus::Vacant | SlotStatus::OutOfOrder | SlotStatus::Maintenance => {
                self.occupant.is_none() && no_reservation_refs
            }
        }
    }

    pub(crate) fn clear_holds(&mut self) {
        self.occupant = None;
        self.reservation_id = None;
        self.reserved_by = None;
        self.active_until = None;
    }
}
