//! Parking session (occupancy record)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::reservation::VehicleInfo;

/// How a driver checked in or out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckInMethod {
    Manual,
    QrCode,
    Nfc,
    AutoDetect,
}

impl CheckInMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::QrCode => "QR_CODE",
            Self::Nfc => "NFC",
            Self::AutoDetect => "AUTO_DETECT",
        }
    }
}

impl Default for CheckInMethod {
    fn default() -> Self {
        Self::Manual
    }
}

impl std::fmt::Display for CheckInMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Open,
    Completed,
}

/// Physical occupancy of a slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingSession {
    pub id: String,
    pub user_id: String,
    pub slot_id: String,
    /// Reservation honoured by this occupancy, if any
    pub reservation_id: Option<String>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Whole seconds between start and end
    pub duration_secs: Option<i64>,
    pub vehicle: Option<VehicleInfo>,
    pub check_in_method: CheckInMethod,
    pub check_out_method: Option<CheckInMethod>,
    pub total_cost: Option<f64>,
}

impl ParkingSession {
    pub fn open(
        id: impl Into<String>,
        user_id: impl Into<String>,
        slot_id: impl Into<String>,
        reservation_id: Option<String>,
        check_in_method: CheckInMethod,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            slot_id: slot_id.into(),
            reservation_id,
            status: SessionStatus::Open,
            started_at,
            ended_at: None,
            duration_secs: None,
            vehicle: None,
            check_in_method,
            check_out_method: None,
            total_cost: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    /// Stamp end time and duration. Closing twice keeps the first close.
    pub fn close(&mut self, ended_at: DateTime<Utc>, check_out_method: Option<CheckInMethod>) {
        if !self.is_open() {
            return;
        }
        let ended_at = ended_at.max(self.started_at);
        self.status = SessionStatus::Completed;
        self.ended_at = Some(ended_at);
        self.duration_secs = Some((ended_at - self.started_at).num_seconds());
        self.check_out_method = check_out_method;
    }
}
