use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{ReservationStatus, SlotStatus};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// The slot changed since the caller last observed it.
    #[error("Conflict on slot {slot_id}: expected version {expected}, current version {current} ({status})")]
    Conflict {
        slot_id: String,
        expected: u64,
        current: u64,
        status: SlotStatus,
    },

    #[error("Invalid transition on slot {slot_id}: cannot {action} while {status} (version {version})")]
    InvalidTransition {
        slot_id: String,
        action: &'static str,
        status: SlotStatus,
        version: u64,
    },

    /// The reservation itself is past the requested step.
    #[error("Invalid transition on reservation {reservation_id}: cannot {action} while {status}")]
    ReservationState {
        reservation_id: String,
        action: &'static str,
        status: ReservationStatus,
    },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Reservation {reservation_id} on slot {slot_id} expired at {expired_at}")]
    Expired {
        reservation_id: String,
        slot_id: String,
        expired_at: DateTime<Utc>,
    },

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl DomainError {
    /// Only a lost compare-and-swap is worth a re-read and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Conflict { .. })
    }

    /// Short machine-readable kind, used for metrics labels and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Conflict { .. } => "conflict",
            DomainError::InvalidTransition { .. } | DomainError::ReservationState { .. } => {
                "invalid_transition"
            }
            DomainError::PermissionDenied(_) => "permission_denied",
            DomainError::Expired { .. } => "expired",
            DomainError::Validation(_) => "validation",
            DomainError::NotFound { .. } => "not_found",
            DomainError::AlreadyExists(_) => "already_exists",
            DomainError::Storage(_) => "storage",
        }
    }

    pub(crate) fn slot_not_found(slot_id: &str) -> Self {
        DomainError::NotFound {
            entity: "Slot",
            field: "id",
            value: slot_id.to_string(),
        }
    }

    pub(crate) fn reservation_not_found(reservation_id: &str) -> Self {
        DomainError::NotFound {
            entity: "Reservation",
            field: "id",
            value: reservation_id.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut field_errors: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let msg = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    format!("{}: {}", field, msg)
                })
            })
            .collect();
        field_errors.sort();

        if field_errors.is_empty() {
            DomainError::Validation("validation failed".to_string())
        } else {
            DomainError::Validation(field_errors.join("; "))
        }
    }
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
