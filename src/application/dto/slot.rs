//! Slot DTOs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::domain::{CheckInMethod, Coordinates, Slot, SlotLocation, SlotStatus, SlotType};

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateSlotRequest {
    #[validate(
        length(min = 1, max = 16, message = "number must be 1–16 characters"),
        custom(function = "validate_slot_number")
    )]
    pub number: String,
    #[serde(default, rename = "type")]
    pub slot_type: SlotType,
    pub floor: Option<i32>,
    #[validate(length(max = 32, message = "section must be at most 32 characters"))]
    pub section: Option<String>,
    #[validate(length(max = 32, message = "row must be at most 32 characters"))]
    pub row: Option<String>,
    pub coordinates: Option<Coordinates>,
    /// Printed QR payload; derived from the number when absent
    #[validate(length(min = 1, max = 128, message = "qr_code must be 1–128 characters"))]
    pub qr_code: Option<String>,
    /// NFC tag payload; derived from the number when absent
    #[validate(length(min = 1, max = 128, message = "nfc_tag must be 1–128 characters"))]
    pub nfc_tag: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_metadata"))]
    pub metadata: BTreeMap<String, String>,
}

impl CreateSlotRequest {
    pub fn new(number: impl Into<String>, slot_type: SlotType) -> Self {
        Self {
            number: number.into(),
            slot_type,
            ..Self::default()
        }
    }

    pub fn location(&self) -> SlotLocation {
        SlotLocation {
            floor: self.floor,
            section: self.section.clone(),
            row: self.row.clone(),
            coordinates: self.coordinates.clone(),
        }
    }
}

fn validate_slot_number(number: &str) -> Result<(), ValidationError> {
    if number
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        let mut err = ValidationError::new("slot_number");
        err.message = Some("number may only contain letters, digits, '-' and '_'".into());
        Err(err)
    }
}

fn validate_metadata(metadata: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    if metadata.len() > 32 || metadata.iter().any(|(k, v)| k.is_empty() || k.len() > 64 || v.len() > 256) {
        let mut err = ValidationError::new("metadata");
        err.message = Some("at most 32 entries, keys 1–64 and values up to 256 characters".into());
        return Err(err);
    }
    Ok(())
}

/// Listing filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotFilter {
    pub status: Option<SlotStatus>,
    pub slot_type: Option<SlotType>,
    pub floor: Option<i32>,
    /// Vacant and in service only
    pub only_available: bool,
}

impl SlotFilter {
    pub fn available() -> Self {
        Self {
            only_available: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, slot: &Slot) -> bool {
        self.status.map_or(true, |s| slot.status == s)
            && self.slot_type.map_or(true, |t| slot.slot_type == t)
            && self.floor.map_or(true, |f| slot.location.floor == Some(f))
            && (!self.only_available || slot.is_available())
    }
}

/// Admin dashboard counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AvailabilitySummary {
    pub total: usize,
    pub vacant: usize,
    pub reserved: usize,
    pub occupied: usize,
    pub out_of_order: usize,
    pub maintenance: usize,
    /// Administratively removed from service
    pub inactive: usize,
    /// Vacant and in service, per slot type
    pub available_by_type: BTreeMap<SlotType, usize>,
}

impl AvailabilitySummary {
    pub fn from_slots<'a>(slots: impl IntoIterator<Item = &'a Slot>) -> Self {
        let mut summary = Self::default();
        for slot in slots {
            summary.total += 1;
            match slot.status {
                SlotStatus::Vacant => summary.vacant += 1,
                SlotStatus::Reserved => summary.reserved += 1,
                SlotStatus::Occupied => summary.occupied += 1,
                SlotStatus::OutOfOrder => summary.out_of_order += 1,
                SlotStatus::Maintenance => summary.maintenance += 1,
            }
            if !slot.is_active {
                summary.inactive += 1;
            }
            if slot.is_available() {
                *summary.available_by_type.entry(slot.slot_type).or_insert(0) += 1;
            }
        }
        summary
    }

    pub fn available(&self) -> usize {
        self.available_by_type.values().sum()
    }
}

/// Result of resolving a scan payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScannedSlot {
    pub slot: Slot,
    pub method: CheckInMethod,
}
