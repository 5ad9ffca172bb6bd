//! Scan-token parsing and role capabilities
//!
//! No I/O: the validator only looks at the payload string and the role
//! the caller was authenticated with.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::domain::{Actor, CheckInMethod, DomainError, DomainResult, UserRole};

const MAX_SLOT_REF_LEN: usize = 64;

/// What a frontend may offer a given role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewSlots,
    ReserveSlot,
    OccupySlot,
    VacateOwnSlot,
    CancelOwnReservation,
    ViewOwnHistory,
    VacateAnySlot,
    CancelAnyReservation,
    OverrideStatus,
    ManageSlots,
    ViewDashboard,
}

/// Decoded scan payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    /// Slot id or number encoded in the token
    pub slot_ref: String,
    pub method: CheckInMethod,
}

#[derive(Debug, Clone)]
pub struct AccessValidator {
    scan: ScanConfig,
}

impl AccessValidator {
    pub fn new(scan: ScanConfig) -> Self {
        Self { scan }
    }

    /// Decode a QR or NFC payload into a slot reference.
    pub fn parse_scan(&self, payload: &str) -> DomainResult<ScanTarget> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(DomainError::Validation("scan payload is empty".into()));
        }

        let (rest, method) = if let Some(rest) = payload.strip_prefix(&self.scan.nfc_prefix) {
            (rest, CheckInMethod::Nfc)
        } else if let Some(rest) = payload.strip_prefix(&self.scan.qr_prefix) {
            (rest, CheckInMethod::QrCode)
        } else {
            return Err(DomainError::Validation(format!(
                "unrecognised scan payload: {}",
                truncate(payload)
            )));
        };

        if rest.is_empty() {
            return Err(DomainError::Validation(
                "scan payload carries no slot reference".into(),
            ));
        }
        if rest.len() > MAX_SLOT_REF_LEN {
            return Err(DomainError::Validation(format!(
                "slot reference longer than {} characters",
                MAX_SLOT_REF_LEN
            )));
        }
        if !rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::Validation(format!(
                "slot reference contains invalid characters: {}",
                truncate(rest)
            )));
        }

        Ok(ScanTarget {
            slot_ref: rest.to_string(),
            method,
        })
    }

    /// Token printed on the slot's QR code
    pub fn qr_token(&self, slot_ref: &str) -> String {
        format!("{}{}", self.scan.qr_prefix, slot_ref)
    }

    /// Token written to the slot's NFC tag
    pub fn nfc_token(&self, slot_ref: &str) -> String {
        format!("{}{}", self.scan.nfc_prefix, slot_ref)
    }

    pub fn capabilities(role: UserRole) -> BTreeSet<Capability> {
        use Capability::*;
        let mut caps: BTreeSet<Capability> = [
            ViewSlots,
            ReserveSlot,
            OccupySlot,
            VacateOwnSlot,
            CancelOwnReservation,
            ViewOwnHistory,
        ]
        .into_iter()
        .collect();
        if role == UserRole::Admin {
            caps.extend([
                VacateAnySlot,
                CancelAnyReservation,
                OverrideStatus,
                ManageSlots,
                ViewDashboard,
            ]);
        }
        caps
    }

    pub fn can(actor: &Actor, capability: Capability) -> bool {
        Self::capabilities(actor.role).contains(&capability)
    }

    pub fn authorize(actor: &Actor, capability: Capability) -> DomainResult<()> {
        if Self::can(actor, capability) {
            Ok(())
        } else {
            Err(DomainError::PermissionDenied(format!(
                "{} ({}) lacks {:?}",
                actor.user_id, actor.role, capability
            )))
        }
    }
}

impl Default for AccessValidator {
    fn default() -> Self {
        Self::new(ScanConfig::default())
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_qr_prefix() {
        let v = AccessValidator::default();
        let target = v.parse_scan("PARKING_SLOT_A01").unwrap();
        assert_eq!(target.slot_ref, "A01");
        assert_eq!(target.method, CheckInMethod::QrCode);
    }

    #[test]
    fn strips_nfc_prefix_and_whitespace() {
        let v = AccessValidator::default();
        let target = v.parse_scan("  NFC_PARKING_B-02\n").unwrap();
        assert_eq!(target.slot_ref, "B-02");
        assert_eq!(target.method, CheckInMethod::Nfc);
    }

    #[test]
    fn malformed_payloads_are_validation_errors() {
        let v = AccessValidator::default();
        for payload in ["", "   ", "QR_A01", "PARKING_SLOT_", "PARKING_SLOT_A 01", "NFC_PARKING_<script>"] {
            assert!(
                matches!(v.parse_scan(payload), Err(DomainError::Validation(_))),
                "payload {:?} should be rejected",
                payload
            );
        }
        let long = format!("PARKING_SLOT_{}", "A".repeat(MAX_SLOT_REF_LEN + 1));
        assert!(v.parse_scan(&long).is_err());
    }

    #[test]
    fn tokens_round_trip_through_parser() {
        let v = AccessValidator::default();
        assert_eq!(v.parse_scan(&v.qr_token("C01")).unwrap().slot_ref, "C01");
        assert_eq!(v.parse_scan(&v.nfc_token("C01")).unwrap().method, CheckInMethod::Nfc);
    }

    #[test]
    fn only_admins_override() {
        let admin = Actor::admin("root");
        let user = Actor::user("u1");
        assert!(AccessValidator::authorize(&admin, Capability::OverrideStatus).is_ok());
        assert!(matches!(
            AccessValidator::authorize(&user, Capability::OverrideStatus),
            Err(DomainError::PermissionDenied(_))
        ));
        assert!(AccessValidator::can(&user, Capability::ReserveSlot));
        assert!(!AccessValidator::can(&user, Capability::ViewDashboard));
    }

    #[test]
    fn admin_capabilities_include_user_ones() {
        let user = AccessValidator::capabilities(UserRole::User);
        let admin = AccessValidator::capabilities(UserRole::Admin);
        assert!(user.is_subset(&admin));
        assert!(admin.len() > user.len());
    }
}
