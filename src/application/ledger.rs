//! Reservation ledger
//!
//! Computes reservation and session records for a transition. The ledger
//! never writes: the records it returns ride along in the slot commit.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::PricingConfig;
use crate::domain::reservation::ReservationClosed;
use crate::domain::{
    CheckInMethod, DomainError, DomainResult, ParkingSession, RepositoryProvider, Reservation,
    VehicleInfo,
};

pub struct ReservationLedger {
    repos: Arc<dyn RepositoryProvider>,
    pricing: PricingConfig,
}

impl ReservationLedger {
    pub fn new(repos: Arc<dyn RepositoryProvider>, pricing: PricingConfig) -> Self {
        Self { repos, pricing }
    }

    pub fn currency(&self) -> &str {
        &self.pricing.currency
    }

    // ── Reservations ──────────────────────────────────────────

    /// New PENDING reservation holding `slot_id` until `now + ttl`
    pub fn open_reservation(
        &self,
        slot_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
        vehicle: Option<VehicleInfo>,
        notes: Option<String>,
    ) -> DomainResult<Reservation> {
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            DomainError::Validation(format!("reservation duration {} is out of range", ttl))
        })?;
        let mut reservation =
            Reservation::new(Uuid::new_v4().to_string(), user_id, slot_id, now, expires_at);
        reservation.vehicle = vehicle;
        reservation.notes = notes;
        Ok(reservation)
    }

    pub async fn activate(&self, reservation_id: &str, now: DateTime<Utc>) -> DomainResult<Reservation> {
        let mut reservation = self.reservation(reservation_id).await?;
        reservation
            .activate(now)
            .map_err(|e| closed(reservation_id, "activate", e))?;
        Ok(reservation)
    }

    pub async fn complete(&self, reservation_id: &str, now: DateTime<Utc>) -> DomainResult<Reservation> {
        let mut reservation = self.reservation(reservation_id).await?;
        reservation
            .complete(now)
            .map_err(|e| closed(reservation_id, "complete", e))?;
        Ok(reservation)
    }

    pub async fn cancel(&self, reservation_id: &str, now: DateTime<Utc>) -> DomainResult<Reservation> {
        let mut reservation = self.reservation(reservation_id).await?;
        reservation
            .cancel(now)
            .map_err(|e| closed(reservation_id, "cancel", e))?;
        Ok(reservation)
    }

    pub async fn expire(&self, reservation_id: &str, now: DateTime<Utc>) -> DomainResult<Reservation> {
        let mut reservation = self.reservation(reservation_id).await?;
        reservation
            .expire(now)
            .map_err(|e| closed(reservation_id, "expire", e))?;
        Ok(reservation)
    }

    // ── Sessions ──────────────────────────────────────────────

    pub fn open_session(
        &self,
        slot_id: &str,
        user_id: &str,
        reservation: Option<&Reservation>,
        check_in_method: CheckInMethod,
        vehicle: Option<VehicleInfo>,
        now: DateTime<Utc>,
    ) -> ParkingSession {
        let mut session = ParkingSession::open(
            Uuid::new_v4().to_string(),
            user_id,
            slot_id,
            reservation.map(|r| r.id.clone()),
            check_in_method,
            now,
        );
        // a walk-in brings its own vehicle; otherwise reuse the reservation's
        session.vehicle = vehicle.or_else(|| reservation.and_then(|r| r.vehicle.clone()));
        session
    }

    /// Close and price the open session on `slot_id`, if there is one.
    pub async fn close_session(
        &self,
        slot_id: &str,
        now: DateTime<Utc>,
        check_out_method: Option<CheckInMethod>,
    ) -> DomainResult<Option<ParkingSession>> {
        let Some(mut session) = self.repos.sessions().find_open_for_slot(slot_id).await? else {
            return Ok(None);
        };
        session.close(now, check_out_method);
        if let (Some(rate), Some(secs)) = (self.pricing.hourly_rate, session.duration_secs) {
            session.total_cost = Some(session_cost(rate, secs));
        }
        Ok(Some(session))
    }

    // ── Reads ─────────────────────────────────────────────────

    pub async fn reservation(&self, reservation_id: &str) -> DomainResult<Reservation> {
        self.repos
            .reservations()
            .find_by_id(reservation_id)
            .await?
            .ok_or_else(|| DomainError::reservation_not_found(reservation_id))
    }

    pub async fn open_session_for_slot(&self, slot_id: &str) -> DomainResult<Option<ParkingSession>> {
        self.repos.sessions().find_open_for_slot(slot_id).await
    }

    pub async fn reservations_for_user(&self, user_id: &str) -> DomainResult<Vec<Reservation>> {
        self.repos.reservations().find_by_user(user_id).await
    }

    pub async fn sessions_for_user(&self, user_id: &str) -> DomainResult<Vec<ParkingSession>> {
        self.repos.sessions().find_by_user(user_id).await
    }
}

fn closed(reservation_id: &str, action: &'static str, e: ReservationClosed) -> DomainError {
    DomainError::ReservationState {
        reservation_id: reservation_id.to_string(),
        action,
        status: e.0,
    }
}

/// Hourly rate applied to started minutes, rounded to cents
fn session_cost(hourly_rate: f64, duration_secs: i64) -> f64 {
    let minutes = (duration_secs.max(0) + 59) / 60;
    let cost = hourly_rate * minutes as f64 / 60.0;
    (cost * 100.0).round() / 100.0
}
