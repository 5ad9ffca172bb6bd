//! Slot service
//!
//! One call per user intent. Each mutation reads the slot, authorizes,
//! lets [`SlotRegistry::apply`] compute the next state, asks the
//! [`ReservationLedger`] for the records that change with it and commits
//! everything with one compare-and-swap. A lost race is surfaced as
//! `DomainError::Conflict` and never retried here. Every committed change
//! emits exactly one event.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::access::{AccessValidator, Capability};
use super::dto::{
    AvailabilitySummary, CreateSlotRequest, OccupancyOutcome, OccupyRequest, OverrideOutcome,
    OverrideRequest, ReservationOutcome, ReserveRequest, ScannedSlot, SlotFilter, UserHistory,
    VacateOutcome, VacateRequest,
};
use super::ledger::ReservationLedger;
use super::registry::{SlotRegistry, SlotTransition};
use crate::config::{AppConfig, ExpiryConfig, ReservationConfig, MAX_RESERVATION_TTL_SECS};
use crate::domain::{
    Actor, DomainError, DomainResult, ParkingSession, RepositoryProvider, Reservation, Slot,
    SlotStatus, VehicleInfo,
};
use crate::notifications::{
    Event, ReservationActivatedEvent, ReservationCancelledEvent,
    ReservationExpiredEvent, SharedSink, SlotActivationChangedEvent, SlotCreatedEvent,
    SlotOccupiedEvent, SlotReservedEvent, SlotStatusOverriddenEvent, SlotVacatedEvent,
};
use crate::support::time::{seconds, SharedClock};

pub struct SlotService {
    registry: SlotRegistry,
    ledger: ReservationLedger,
    validator: AccessValidator,
    sink: SharedSink,
    clock: SharedClock,
    reservations: ReservationConfig,
    expiry: ExpiryConfig,
}

impl SlotService {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        config: &AppConfig,
        sink: SharedSink,
        clock: SharedClock,
    ) -> Self {
        Self {
            registry: SlotRegistry::new(repos.clone()),
            ledger: ReservationLedger::new(repos, config.pricing.clone()),
            validator: AccessValidator::new(config.scan.clone()),
            sink,
            clock,
            reservations: config.reservations.clone(),
            expiry: config.expiry.clone(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn validator(&self) -> &AccessValidator {
        &self.validator
    }

    pub fn reservation_config(&self) -> &ReservationConfig {
        &self.reservations
    }

    /// Hand an event to the sink
    pub(crate) fn emit(&self, event: Event) {
        self.sink.emit(event);
    }

    // ── Slot management ─────────────────────────────────────

    pub async fn create_slot(&self, actor: &Actor, request: CreateSlotRequest) -> DomainResult<Slot> {
        AccessValidator::authorize(actor, Capability::ManageSlots)?;
        request.validate()?;

        if self.registry.find_by_number(&request.number).await?.is_some() {
            return Err(DomainError::AlreadyExists(format!("slot number {}", request.number)));
        }

        let now = self.now();
        let qr_code = request
            .qr_code
            .clone()
            .unwrap_or_else(|| self.validator.qr_token(&request.number));
        let nfc_tag = request
            .nfc_tag
            .clone()
            .unwrap_or_else(|| self.validator.nfc_token(&request.number));

        let mut slot = Slot::new(
            Uuid::new_v4().to_string(),
            request.number.clone(),
            request.slot_type,
            request.location(),
            now,
        )
        .with_scan_tokens(Some(qr_code), Some(nfc_tag));
        slot.metadata = request.metadata;

        self.registry.register(slot.clone()).await?;

        info!(slot_id = %slot.id, number = %slot.number, slot_type = %slot.slot_type, "Slot created");
        self.emit(Event::SlotCreated(SlotCreatedEvent {
            slot_id: slot.id.clone(),
            slot_number: slot.number.clone(),
            slot_type: slot.slot_type,
            created_by: actor.user_id.clone(),
            timestamp: now,
        }));
        Ok(slot)
    }

    /// Take a slot out of service or put it back
    pub async fn set_slot_active(&self, actor: &Actor, slot_id: &str, active: bool) -> DomainResult<Slot> {
        AccessValidator::authorize(actor, Capability::ManageSlots)?;
        let now = self.now();
        let slot = self.current(slot_id, now).await?;

        let transition = SlotTransition::SetActive { active };
        let next = self.transition(&slot, slot.version, &transition, now)?;
        let slot = self.commit(&transition, &slot, next, None, None).await?;

        info!(slot_id = %slot.id, active, admin = %actor.user_id, "Slot activation changed");
        self.emit(Event::SlotActivationChanged(SlotActivationChangedEvent {
            slot_id: slot.id.clone(),
            admin_id: actor.user_id.clone(),
            is_active: active,
            timestamp: now,
        }));
        Ok(slot)
    }

    // ── Reads ─────────────────────────────────────────────────

    pub async fn get_slot(&self, slot_id: &str) -> DomainResult<Slot> {
        self.current(slot_id, self.now()).await
    }

    /// Slots matching `filter`, ordered by number
    pub async fn list_slots(&self, filter: &SlotFilter) -> DomainResult<Vec<Slot>> {
        let now = self.now();
        let mut slots = Vec::new();
        for slot in self.registry.list().await? {
            let slot = self.refresh(slot, now).await?;
            if filter.matches(&slot) {
                slots.push(slot);
            }
        }
        slots.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(slots)
    }

    pub async fn availability(&self) -> DomainResult<AvailabilitySummary> {
        let slots = self.list_slots(&SlotFilter::default()).await?;
        Ok(AvailabilitySummary::from_slots(&slots))
    }

    /// Resolve a QR / NFC payload to the slot it names.
    pub async fn scan_to_slot(&self, payload: &str) -> DomainResult<ScannedSlot> {
        let scanned = self.resolve_scan(payload).await?;
        let slot = self.refresh(scanned.slot, self.now()).await?;
        debug!(slot_id = %slot.id, method = %scanned.method, "Scan resolved");
        Ok(ScannedSlot {
            slot,
            method: scanned.method,
        })
    }

    /// Stored slots as they are, without expire-on-access
    pub async fn snapshot(&self) -> DomainResult<Vec<Slot>> {
        self.registry.list().await
    }

    pub async fn reservation(&self, reservation_id: &str) -> DomainResult<Reservation> {
        self.ledger.reservation(reservation_id).await
    }

    pub async fn open_session_for_slot(&self, slot_id: &str) -> DomainResult<Option<ParkingSession>> {
        self.ledger.open_session_for_slot(slot_id).await
    }

    /// Reservations and sessions of `user_id`. Admins may read anyone's.
    pub async fn history(&self, actor: &Actor, user_id: &str) -> DomainResult<UserHistory> {
        let capability = if actor.user_id == user_id {
            Capability::ViewOwnHistory
        } else {
            Capability::ViewDashboard
        };
        AccessValidator::authorize(actor, capability)?;

        Ok(UserHistory {
            reservations: self.ledger.reservations_for_user(user_id).await?,
            sessions: self.ledger.sessions_for_user(user_id).await?,
        })
    }

    // ── Reservations ──────────────────────────────────────────

    pub async fn reserve(&self, actor: &Actor, request: ReserveRequest) -> DomainResult<ReservationOutcome> {
        AccessValidator::authorize(actor, Capability::ReserveSlot)?;
        let ttl = self.reservation_ttl(request.ttl)?;
        let now = self.now();
        let slot = self.current(&request.slot_id, now).await?;
        let expected = request.expected_version.unwrap_or(slot.version);

        let reservation = self.ledger.open_reservation(
            &slot.id,
            &actor.user_id,
            now,
            ttl,
            request.vehicle,
            request.notes,
        )?;
        let transition = SlotTransition::Reserve {
            user_id: actor.user_id.clone(),
            reservation_id: reservation.id.clone(),
            until: reservation.expires_at,
        };
        let next = self.transition(&slot, expected, &transition, now)?;
        let slot = self
            .commit(&transition, &slot, next, Some(reservation.clone()), None)
            .await?;

        info!(
            slot_id = %slot.id,
            user_id = %actor.user_id,
            reservation_id = %reservation.id,
            expires_at = %reservation.expires_at,
            version = slot.version,
            "Slot reserved"
        );
        self.emit(Event::SlotReserved(SlotReservedEvent {
            slot_id: slot.id.clone(),
            slot_number: slot.number.clone(),
            user_id: actor.user_id.clone(),
            reservation_id: reservation.id.clone(),
            expires_at: reservation.expires_at,
            version: slot.version,
            timestamp: now,
        }));
        Ok(ReservationOutcome { slot, reservation })
    }

    /// Owner signals imminent arrival; the slot stays RESERVED.
    pub async fn activate_reservation(
        &self,
        actor: &Actor,
        reservation_id: &str,
    ) -> DomainResult<ReservationOutcome> {
        let now = self.now();
        let reservation = self.ledger.reservation(reservation_id).await?;
        if reservation.user_id != actor.user_id {
            return Err(DomainError::PermissionDenied(format!(
                "{} does not own reservation {}",
                actor.user_id, reservation_id
            )));
        }
        let slot = self.held_slot(&reservation, "activate").await?;

        let transition = SlotTransition::Activate {
            user_id: actor.user_id.clone(),
        };
        let next = match self.transition(&slot, slot.version, &transition, now) {
            Err(e @ DomainError::Expired { .. }) => return Err(self.force_expire(&slot, e).await),
            other => other?,
        };
        let activated = self.ledger.activate(reservation_id, now).await?;
        let slot = self
            .commit(&transition, &slot, next, Some(activated.clone()), None)
            .await?;

        info!(slot_id = %slot.id, reservation_id, "Reservation activated");
        self.emit(Event::ReservationActivated(ReservationActivatedEvent {
            slot_id: slot.id.clone(),
            user_id: activated.user_id.clone(),
            reservation_id: activated.id.clone(),
            expires_at: activated.expires_at,
            timestamp: now,
        }));
        Ok(ReservationOutcome {
            slot,
            reservation: activated,
        })
    }

    /// Cancel by the owner or an admin. A reservation already past its
    /// deadline is expired instead.
    pub async fn cancel_reservation(
        &self,
        actor: &Actor,
        reservation_id: &str,
    ) -> DomainResult<ReservationOutcome> {
        let now = self.now();
        let reservation = self.ledger.reservation(reservation_id).await?;
        if reservation.user_id != actor.user_id {
            AccessValidator::authorize(actor, Capability::CancelAnyReservation)?;
        }
        let slot = self.held_slot(&reservation, "cancel").await?;
        if slot.reservation_lapsed(now) {
            let lapsed = DomainError::Expired {
                reservation_id: reservation.id.clone(),
                slot_id: slot.id.clone(),
                expired_at: reservation.expires_at,
            };
            return Err(self.force_expire(&slot, lapsed).await);
        }

        let transition = SlotTransition::Cancel {
            actor: actor.clone(),
            reservation_id: reservation_id.to_string(),
        };
        let next = self.transition(&slot, slot.version, &transition, now)?;
        let cancelled = self.ledger.cancel(reservation_id, now).await?;
        let slot = self
            .commit(&transition, &slot, next, Some(cancelled.clone()), None)
            .await?;

        info!(slot_id = %slot.id, reservation_id, cancelled_by = %actor.user_id, "Reservation cancelled");
        self.emit(Event::ReservationCancelled(ReservationCancelledEvent {
            slot_id: slot.id.clone(),
            user_id: cancelled.user_id.clone(),
            reservation_id: cancelled.id.clone(),
            cancelled_by: actor.user_id.clone(),
            timestamp: now,
        }));
        Ok(ReservationOutcome {
            slot,
            reservation: cancelled,
        })
    }

    /// Expire the reservation on `slot_id` if its deadline has passed.
    ///
    /// `observed_version` is the version the caller saw the lapse at; a
    /// newer slot yields `Conflict`. Returns `None` when nothing lapsed.
    pub async fn expire_if_lapsed(
        &self,
        slot_id: &str,
        observed_version: u64,
    ) -> DomainResult<Option<ReservationOutcome>> {
        let now = self.now();
        let slot = self.registry.get(slot_id).await?;
        let Some(reservation_id) = slot
            .reservation_id
            .clone()
            .filter(|_| slot.reservation_lapsed(now))
        else {
            return Ok(None);
        };

        let transition = SlotTransition::Expire {
            reservation_id: reservation_id.clone(),
        };
        let next = self.transition(&slot, observed_version, &transition, now)?;
        let expired = self.ledger.expire(&reservation_id, now).await?;
        let expired_at = expired.expires_at;
        let user_id = expired.user_id.clone();
        let slot = self
            .commit(&transition, &slot, next, Some(expired.clone()), None)
            .await?;

        counter!("parking_reservations_expired_total").increment(1);
        info!(slot_id = %slot.id, reservation_id = %reservation_id, user_id = %user_id, "Reservation expired");
        self.emit(Event::ReservationExpired(ReservationExpiredEvent {
            slot_id: slot.id.clone(),
            slot_number: slot.number.clone(),
            user_id,
            reservation_id,
            expired_at,
            timestamp: now,
        }));
        Ok(Some(ReservationOutcome {
            slot,
            reservation: expired,
        }))
    }

    // ── Occupancy ─────────────────────────────────────────────

    /// Walk-in, or check-in honouring the caller's own reservation.
    pub async fn occupy(&self, actor: &Actor, request: OccupyRequest) -> DomainResult<OccupancyOutcome> {
        AccessValidator::authorize(actor, Capability::OccupySlot)?;
        let now = self.now();
        let mut slot = self.registry.get(&request.slot_id).await?;
        // someone else's lapsed hold must not block a walk-in
        if !slot.is_reserved_by(&actor.user_id) {
            slot = self.refresh(slot, now).await?;
        }
        let expected = request.expected_version.unwrap_or(slot.version);

        let transition = SlotTransition::Occupy {
            user_id: actor.user_id.clone(),
        };
        let next = match self.transition(&slot, expected, &transition, now) {
            Err(e @ DomainError::Expired { .. }) => return Err(self.force_expire(&slot, e).await),
            other => other?,
        };

        let completed = match (slot.status, slot.reservation_id.as_deref()) {
            (SlotStatus::Reserved, Some(reservation_id)) => {
                Some(self.ledger.complete(reservation_id, now).await?)
            }
            _ => None,
        };
        let session = self.ledger.open_session(
            &slot.id,
            &actor.user_id,
            completed.as_ref(),
            request.method,
            request.vehicle,
            now,
        );
        let slot = self
            .commit(&transition, &slot, next, completed.clone(), Some(session.clone()))
            .await?;

        info!(
            slot_id = %slot.id,
            user_id = %actor.user_id,
            session_id = %session.id,
            method = %request.method,
            honoured = completed.is_some(),
            "Slot occupied"
        );
        self.emit(Event::SlotOccupied(SlotOccupiedEvent {
            slot_id: slot.id.clone(),
            slot_number: slot.number.clone(),
            user_id: actor.user_id.clone(),
            session_id: session.id.clone(),
            reservation_id: completed.as_ref().map(|r| r.id.clone()),
            check_in_method: request.method,
            timestamp: now,
        }));
        Ok(OccupancyOutcome {
            slot,
            session,
            completed_reservation: completed,
        })
    }

    /// Check in at the slot named by a scanned QR / NFC payload.
    pub async fn occupy_by_scan(
        &self,
        actor: &Actor,
        payload: &str,
        vehicle: Option<VehicleInfo>,
    ) -> DomainResult<OccupancyOutcome> {
        // occupy decides whether a lapsed hold is expired or refused
        let scanned = self.resolve_scan(payload).await?;
        let request = OccupyRequest {
            slot_id: scanned.slot.id,
            expected_version: None,
            method: scanned.method,
            vehicle,
        };
        self.occupy(actor, request).await
    }

    /// Release a slot; only the occupant or an admin.
    pub async fn vacate(&self, actor: &Actor, request: VacateRequest) -> DomainResult<VacateOutcome> {
        AccessValidator::authorize(actor, Capability::VacateOwnSlot)?;
        let now = self.now();
        let slot = self.registry.get(&request.slot_id).await?;
        let expected = request.expected_version.unwrap_or(slot.version);

        let transition = SlotTransition::Vacate {
            actor: actor.clone(),
        };
        let next = self.transition(&slot, expected, &transition, now)?;
        let session = self
            .ledger
            .close_session(&slot.id, now, Some(request.check_out_method))
            .await?;
        if session.is_none() {
            warn!(slot_id = %slot.id, "Occupied slot had no open session");
        }
        let occupant = slot.occupant.clone().unwrap_or_default();
        let slot = self
            .commit(&transition, &slot, next, None, session.clone())
            .await?;

        info!(
            slot_id = %slot.id,
            user_id = %occupant,
            by = %actor.user_id,
            duration_secs = session.as_ref().and_then(|s| s.duration_secs).unwrap_or(0),
            "Slot vacated"
        );
        let total_cost = session.as_ref().and_then(|s| s.total_cost);
        self.emit(Event::SlotVacated(SlotVacatedEvent {
            slot_id: slot.id.clone(),
            slot_number: slot.number.clone(),
            user_id: occupant,
            session_id: session.as_ref().map(|s| s.id.clone()).unwrap_or_default(),
            duration_secs: session.as_ref().and_then(|s| s.duration_secs).unwrap_or(0),
            total_cost,
            currency: total_cost.map(|_| self.ledger.currency().to_string()),
            timestamp: now,
        }));
        Ok(VacateOutcome { slot, session })
    }

    // ── Administration ────────────────────────────────────────

    /// Force a slot into VACANT, OUT_OF_ORDER or MAINTENANCE, closing
    /// whatever reservation or session it held.
    pub async fn admin_override(&self, actor: &Actor, request: OverrideRequest) -> DomainResult<OverrideOutcome> {
        AccessValidator::authorize(actor, Capability::OverrideStatus)?;
        let now = self.now();
        let slot = self.registry.get(&request.slot_id).await?;
        let expected = request.expected_version.unwrap_or(slot.version);

        let transition = SlotTransition::Override {
            status: request.status,
        };
        let next = self.transition(&slot, expected, &transition, now)?;

        let cancelled = match (slot.status, slot.reservation_id.as_deref()) {
            (SlotStatus::Reserved, Some(reservation_id)) => {
                Some(self.ledger.cancel(reservation_id, now).await?)
            }
            _ => None,
        };
        let closed = if slot.status == SlotStatus::Occupied {
            self.ledger.close_session(&slot.id, now, None).await?
        } else {
            None
        };
        let affected_user = slot.reserved_by.clone().or_else(|| slot.occupant.clone());
        let previous_status = slot.status;
        let slot = self
            .commit(&transition, &slot, next, cancelled.clone(), closed.clone())
            .await?;

        warn!(
            slot_id = %slot.id,
            admin = %actor.user_id,
            from = %previous_status,
            to = %slot.status,
            reason = request.reason.as_deref().unwrap_or(""),
            "Slot status overridden"
        );
        self.emit(Event::SlotStatusOverridden(SlotStatusOverriddenEvent {
            slot_id: slot.id.clone(),
            admin_id: actor.user_id.clone(),
            old_status: previous_status,
            new_status: slot.status,
            reason: request.reason,
            cancelled_reservation: cancelled.as_ref().map(|r| r.id.clone()),
            closed_session: closed.as_ref().map(|s| s.id.clone()),
            affected_user,
            timestamp: now,
        }));
        Ok(OverrideOutcome {
            slot,
            previous_status,
            cancelled_reservation: cancelled,
            closed_session: closed,
        })
    }

    // ── Internals ─────────────────────────────────────────────

    fn reservation_ttl(&self, requested: Option<Duration>) -> DomainResult<Duration> {
        let max_secs = self.reservations.max_ttl_secs.min(MAX_RESERVATION_TTL_SECS);
        let out_of_range = || {
            DomainError::Validation(format!(
                "reservation duration must be between 1 and {} seconds",
                max_secs
            ))
        };
        let ttl = match requested {
            Some(ttl) => ttl,
            None => seconds(self.reservations.default_ttl_secs).ok_or_else(out_of_range)?,
        };
        let max = seconds(max_secs).ok_or_else(out_of_range)?;
        if ttl <= Duration::zero() || ttl > max {
            return Err(out_of_range());
        }
        Ok(ttl)
    }

    /// Stored slot named by a scan payload, by number first, then by id
    async fn resolve_scan(&self, payload: &str) -> DomainResult<ScannedSlot> {
        let target = self.validator.parse_scan(payload)?;
        let slot = match self.registry.find_by_number(&target.slot_ref).await? {
            Some(slot) => slot,
            None => match self.registry.get(&target.slot_ref).await {
                Err(DomainError::NotFound { .. }) => {
                    return Err(DomainError::NotFound {
                        entity: "Slot",
                        field: "scan",
                        value: target.slot_ref,
                    })
                }
                other => other?,
            },
        };
        Ok(ScannedSlot {
            slot,
            method: target.method,
        })
    }

    /// Current slot, with a lapsed reservation expired first when
    /// expire-on-access is enabled.
    async fn current(&self, slot_id: &str, now: DateTime<Utc>) -> DomainResult<Slot> {
        let slot = self.registry.get(slot_id).await?;
        self.refresh(slot, now).await
    }

    async fn refresh(&self, slot: Slot, now: DateTime<Utc>) -> DomainResult<Slot> {
        if !self.expiry.expire_on_access || !slot.reservation_lapsed(now) {
            return Ok(slot);
        }
        match self.expire_if_lapsed(&slot.id, slot.version).await {
            Ok(Some(outcome)) => Ok(outcome.slot),
            // someone else moved it; take whatever is stored now
            Ok(None) | Err(DomainError::Conflict { .. }) => self.registry.get(&slot.id).await,
            Err(e) => Err(e),
        }
    }

    /// Slot holding `reservation`, or the reason it no longer does
    async fn held_slot(&self, reservation: &Reservation, action: &'static str) -> DomainResult<Slot> {
        if !reservation.is_open() {
            return Err(DomainError::ReservationState {
                reservation_id: reservation.id.clone(),
                action,
                status: reservation.status,
            });
        }
        let slot = self.registry.get(&reservation.slot_id).await?;
        if slot.reservation_id.as_deref() != Some(reservation.id.as_str()) {
            return Err(DomainError::InvalidTransition {
                slot_id: slot.id.clone(),
                action,
                status: slot.status,
                version: slot.version,
            });
        }
        Ok(slot)
    }

    /// Run the sweep path on a lapsed slot, then hand back `err`.
    async fn force_expire(&self, slot: &Slot, err: DomainError) -> DomainError {
        if let Err(e) = self.expire_if_lapsed(&slot.id, slot.version).await {
            debug!(slot_id = %slot.id, error = %e, "Forced expiry skipped");
        }
        err
    }

    fn transition(
        &self,
        slot: &Slot,
        expected_version: u64,
        transition: &SlotTransition,
        now: DateTime<Utc>,
    ) -> DomainResult<Slot> {
        SlotRegistry::apply(slot, expected_version, transition, now).map_err(|e| {
            if e.is_retryable() {
                counter!("parking_conflicts_total").increment(1);
            }
            e
        })
    }

    async fn commit(
        &self,
        transition: &SlotTransition,
        current: &Slot,
        next: Slot,
        reservation: Option<Reservation>,
        session: Option<ParkingSession>,
    ) -> DomainResult<Slot> {
        match self.registry.commit(current, next, reservation, session).await {
            Ok(slot) => {
                counter!("parking_transitions_total", "action" => transition.action()).increment(1);
                Ok(slot)
            }
            Err(e) => {
                if e.is_retryable() {
                    counter!("parking_conflicts_total").increment(1);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CheckInMethod, ReservationStatus, SlotType};
    use crate::infrastructure::InMemoryStore;
    use crate::notifications::{create_event_bus, Audience, EventSubscriber};
    use crate::support::time::{Clock, ManualClock};

    struct Harness {
        service: Arc<SlotService>,
        clock: Arc<ManualClock>,
        events: EventSubscriber,
        admin: Actor,
    }

    fn harness_with(config: AppConfig) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let bus = create_event_bus();
        let events = bus.subscribe();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = Arc::new(SlotService::new(store, &config, bus, clock.clone()));
        Harness {
            service,
            clock,
            events,
            admin: Actor::admin("admin"),
        }
    }

    fn harness() -> Harness {
        harness_with(AppConfig::default())
    }

    impl Harness {
        async fn slot(&mut self, number: &str) -> Slot {
            let slot = self
                .service
                .create_slot(&self.admin, CreateSlotRequest::new(number, SlotType::Standard))
                .await
                .unwrap();
            self.drain();
            slot
        }

        fn drain(&mut self) -> Vec<Event> {
            let mut events = Vec::new();
            while let Some(message) = self.events.try_recv() {
                events.push(message.event);
            }
            events
        }
    }

    #[tokio::test]
    async fn create_slot_derives_scan_tokens() {
        let mut h = harness();
        let slot = h.slot("A01").await;
        assert_eq!(slot.version, 0);
        assert_eq!(slot.qr_code.as_deref(), Some("PARKING_SLOT_A01"));
        assert_eq!(slot.nfc_tag.as_deref(), Some("NFC_PARKING_A01"));

        let dup = h
            .service
            .create_slot(&h.admin, CreateSlotRequest::new("A01", SlotType::Bike))
            .await;
        assert!(matches!(dup, Err(DomainError::AlreadyExists(_))));

        let by_user = h
            .service
            .create_slot(&Actor::user("u1"), CreateSlotRequest::new("A02", SlotType::Bike))
            .await;
        assert!(matches!(by_user, Err(DomainError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn reservation_expires_on_sweep_and_notifies_owner() {
        let mut h = harness();
        let slot = h.slot("A01").await;
        let u1 = Actor::user("U1");

        let reserved = h
            .service
            .reserve(&u1, ReserveRequest::new(&slot.id).at_version(0))
            .await
            .unwrap();
        assert_eq!(reserved.slot.status, SlotStatus::Reserved);
        assert_eq!(reserved.slot.version, 1);
        assert_eq!(reserved.reservation.status, ReservationStatus::Pending);
        assert_eq!(reserved.reservation.expires_at - h.clock.now(), Duration::minutes(15));

        let events = h.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "slot_reserved");

        h.clock.advance(Duration::minutes(15));
        let expired = h
            .service
            .expire_if_lapsed(&slot.id, 1)
            .await
            .unwrap()
            .expect("lapsed reservation should expire");
        assert_eq!(expired.slot.status, SlotStatus::Vacant);
        assert_eq!(expired.slot.version, 2);
        assert_eq!(expired.reservation.status, ReservationStatus::Expired);
        assert!(expired.slot.check_invariants());

        let stored = h.service.reservation(&reserved.reservation.id).await.unwrap();
        assert_eq!(stored.status, ReservationStatus::Expired);

        let events = h.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "reservation_expired");
        assert_eq!(events[0].audience(), Audience::User("U1".into()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reserves_have_one_winner() {
        let mut h = harness();
        let slot = h.slot("A01").await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let service = h.service.clone();
            let slot_id = slot.id.clone();
            handles.push(tokio::spawn(async move {
                service
                    .reserve(
                        &Actor::user(format!("u{}", i)),
                        ReserveRequest::new(slot_id).at_version(0),
                    )
                    .await
            }));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(e) => {
                    assert!(e.is_retryable(), "unexpected error {e}");
                    conflicts += 1;
                }
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(h.service.get_slot(&slot.id).await.unwrap().version, 1);
        assert_eq!(h.drain().len(), 1);
    }

    #[tokio::test]
    async fn lapsed_reservation_cannot_be_honoured() {
        let mut h = harness();
        let slot = h.slot("A01").await;
        let u1 = Actor::user("u1");
        let reserved = h.service.reserve(&u1, ReserveRequest::new(&slot.id)).await.unwrap();
        h.drain();

        h.clock.advance(Duration::minutes(15));
        let err = h.service.occupy(&u1, OccupyRequest::new(&slot.id)).await.unwrap_err();
        assert!(matches!(err, DomainError::Expired { .. }));

        // forced through the sweep path
        let slot = h.service.get_slot(&slot.id).await.unwrap();
        assert_eq!(slot.status, SlotStatus::Vacant);
        let r = h.service.reservation(&reserved.reservation.id).await.unwrap();
        assert_eq!(r.status, ReservationStatus::Expired);
        let events = h.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "reservation_expired");

        let err = h
            .service
            .activate_reservation(&u1, &reserved.reservation.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::ReservationState { status: ReservationStatus::Expired, .. }
        ));
    }

    #[tokio::test]
    async fn scan_check_in_on_lapsed_own_reservation_is_expired() {
        let mut h = harness();
        let slot = h.slot("A02").await;
        let u1 = Actor::user("u1");
        let reserved = h.service.reserve(&u1, ReserveRequest::new(&slot.id)).await.unwrap();
        h.drain();

        h.clock.advance(Duration::minutes(15));
        let err = h
            .service
            .occupy_by_scan(&u1, "PARKING_SLOT_A02", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Expired { .. }));

        let slot = h.service.get_slot(&slot.id).await.unwrap();
        assert_eq!(slot.status, SlotStatus::Vacant);
        assert!(slot.occupant.is_none());
        assert!(h.service.open_session_for_slot(&slot.id).await.unwrap().is_none());
        let r = h.service.reservation(&reserved.reservation.id).await.unwrap();
        assert_eq!(r.status, ReservationStatus::Expired);
        let kinds: Vec<_> = h.drain().iter().map(|e| e.event_type()).collect();
        assert_eq!(kinds, ["reservation_expired"]);
    }

    #[tokio::test]
    async fn stale_expiry_leaves_slot_untouched() {
        let mut h = harness();
        let slot = h.slot("A01").await;
        let u1 = Actor::user("u1");
        let reserved = h.service.reserve(&u1, ReserveRequest::new(&slot.id)).await.unwrap();
        assert_eq!(reserved.slot.version, 1);
        let activated = h
            .service
            .activate_reservation(&u1, &reserved.reservation.id)
            .await
            .unwrap();
        h.drain();

        h.clock.advance(Duration::minutes(15));
        let err = h.service.expire_if_lapsed(&slot.id, 1).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
        assert!(h.drain().is_empty());
        assert_eq!(h.service.snapshot().await.unwrap(), vec![activated.slot.clone()]);
        let r = h.service.reservation(&reserved.reservation.id).await.unwrap();
        assert_eq!(r.status, ReservationStatus::Active);

        let expired = h.service.expire_if_lapsed(&slot.id, 2).await.unwrap().unwrap();
        assert_eq!(expired.slot.version, 3);
        assert_eq!(expired.reservation.status, ReservationStatus::Expired);
    }

    #[tokio::test]
    async fn out_of_range_ttl_config_is_a_validation_error() {
        let mut config = AppConfig::default();
        config.reservations.max_ttl_secs = 1_000_000_000_000_000;
        let mut h = harness_with(config);
        let slot = h.slot("A01").await;
        let u1 = Actor::user("u1");

        let huge = ReserveRequest::new(&slot.id).with_ttl(Duration::seconds(100_000_000_000_000));
        assert!(matches!(
            h.service.reserve(&u1, huge).await,
            Err(DomainError::Validation(_))
        ));
        let week = h
            .service
            .reserve(&u1, ReserveRequest::new(&slot.id).with_ttl(Duration::days(7)))
            .await
            .unwrap();
        assert_eq!(week.reservation.expires_at - h.clock.now(), Duration::days(7));

        let mut config = AppConfig::default();
        config.reservations.default_ttl_secs = u64::MAX;
        let mut h = harness_with(config);
        let slot = h.slot("A01").await;
        assert!(matches!(
            h.service.reserve(&u1, ReserveRequest::new(&slot.id)).await,
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn lapsed_activation_is_expired() {
        let mut h = harness();
        let slot = h.slot("A01").await;
        let u1 = Actor::user("u1");
        let reserved = h.service.reserve(&u1, ReserveRequest::new(&slot.id)).await.unwrap();

        h.clock.advance(Duration::minutes(16));
        let err = h
            .service
            .activate_reservation(&u1, &reserved.reservation.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Expired { .. }));
        assert_eq!(h.service.get_slot(&slot.id).await.unwrap().status, SlotStatus::Vacant);
    }

    #[tokio::test]
    async fn reserve_activate_occupy_vacate_round_trip() {
        let config = AppConfig {
            pricing: crate::config::PricingConfig {
                hourly_rate: Some(3.0),
                ..Default::default()
            },
            ..AppConfig::default()
        };
        let mut h = harness_with(config);
        let slot = h.slot("A01").await;
        let u1 = Actor::user("u1");

        let reserved = h.service.reserve(&u1, ReserveRequest::new(&slot.id)).await.unwrap();
        let activated = h
            .service
            .activate_reservation(&u1, &reserved.reservation.id)
            .await
            .unwrap();
        assert_eq!(activated.reservation.status, ReservationStatus::Active);
        assert_eq!(activated.slot.status, SlotStatus::Reserved);
        assert_eq!(activated.slot.version, 2);

        h.clock.advance(Duration::minutes(5));
        let occupied = h.service.occupy(&u1, OccupyRequest::new(&slot.id)).await.unwrap();
        assert_eq!(occupied.slot.status, SlotStatus::Occupied);
        assert_eq!(
            occupied.completed_reservation.as_ref().map(|r| r.status),
            Some(ReservationStatus::Completed)
        );
        assert_eq!(
            occupied.session.reservation_id.as_deref(),
            Some(reserved.reservation.id.as_str())
        );

        h.clock.advance(Duration::minutes(40));
        let vacated = h.service.vacate(&u1, VacateRequest::new(&slot.id)).await.unwrap();
        assert_eq!(vacated.slot.status, SlotStatus::Vacant);
        assert!(vacated.slot.occupant.is_none());
        assert!(vacated.slot.reservation_id.is_none());
        assert!(vacated.slot.check_invariants());
        assert_eq!(vacated.slot.version, 4);

        let session = vacated.session.unwrap();
        assert_eq!(session.duration_secs, Some(40 * 60));
        assert_eq!(session.total_cost, Some(2.0));
        assert!(h.service.open_session_for_slot(&slot.id).await.unwrap().is_none());

        let kinds: Vec<_> = h.drain().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            kinds,
            ["slot_reserved", "reservation_activated", "slot_occupied", "slot_vacated"]
        );

        let history = h.service.history(&u1, "u1").await.unwrap();
        assert_eq!(history.reservations.len(), 1);
        assert_eq!(history.sessions.len(), 1);
        assert!(h.service.history(&Actor::user("u2"), "u1").await.is_err());
    }

    #[tokio::test]
    async fn other_users_cannot_take_or_release() {
        let mut h = harness();
        let slot = h.slot("A01").await;
        let u1 = Actor::user("u1");
        let u2 = Actor::user("u2");

        h.service.reserve(&u1, ReserveRequest::new(&slot.id)).await.unwrap();
        assert!(matches!(
            h.service.occupy(&u2, OccupyRequest::new(&slot.id)).await,
            Err(DomainError::PermissionDenied(_))
        ));
        assert!(matches!(
            h.service.reserve(&u2, ReserveRequest::new(&slot.id)).await,
            Err(DomainError::Conflict { .. })
        ));

        h.service.occupy(&u1, OccupyRequest::new(&slot.id)).await.unwrap();
        assert!(matches!(
            h.service.vacate(&u2, VacateRequest::new(&slot.id)).await,
            Err(DomainError::PermissionDenied(_))
        ));
        let by_admin = h.service.vacate(&h.admin, VacateRequest::new(&slot.id)).await.unwrap();
        assert_eq!(by_admin.slot.status, SlotStatus::Vacant);
    }

    #[tokio::test]
    async fn walk_in_replaces_someone_elses_lapsed_hold() {
        let mut h = harness();
        let slot = h.slot("A01").await;
        h.service
            .reserve(&Actor::user("u1"), ReserveRequest::new(&slot.id))
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(20));

        let occupied = h
            .service
            .occupy(&Actor::user("u2"), OccupyRequest::new(&slot.id))
            .await
            .unwrap();
        assert!(occupied.completed_reservation.is_none());
        assert_eq!(occupied.slot.occupant.as_deref(), Some("u2"));
        assert_eq!(occupied.slot.version, 3);
    }

    #[tokio::test]
    async fn admin_override_closes_inflight_records() {
        let mut h = harness();
        let a = h.slot("A01").await;
        let b = h.slot("A02").await;
        let u1 = Actor::user("u1");

        let reserved = h.service.reserve(&u1, ReserveRequest::new(&a.id)).await.unwrap();
        let occupied = h.service.occupy(&u1, OccupyRequest::new(&b.id)).await.unwrap();
        h.drain();

        let denied = h
            .service
            .admin_override(&u1, OverrideRequest::new(&a.id, SlotStatus::Maintenance))
            .await;
        assert!(matches!(denied, Err(DomainError::PermissionDenied(_))));
        assert_eq!(h.service.get_slot(&a.id).await.unwrap(), reserved.slot);
        assert!(h.drain().is_empty());

        let out = h
            .service
            .admin_override(&h.admin, OverrideRequest::new(&a.id, SlotStatus::Maintenance))
            .await
            .unwrap();
        assert_eq!(out.slot.status, SlotStatus::Maintenance);
        assert_eq!(out.previous_status, SlotStatus::Reserved);
        assert_eq!(
            out.cancelled_reservation.map(|r| r.status),
            Some(ReservationStatus::Cancelled)
        );

        let out = h
            .service
            .admin_override(&h.admin, OverrideRequest::new(&b.id, SlotStatus::OutOfOrder))
            .await
            .unwrap();
        let closed = out.closed_session.unwrap();
        assert_eq!(closed.id, occupied.session.id);
        assert!(!closed.is_open());

        let events = h.drain();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| e.audience() == Audience::User("u1".into())));

        let idle = h.slot("A03").await;
        h.service
            .admin_override(&h.admin, OverrideRequest::new(&idle.id, SlotStatus::OutOfOrder))
            .await
            .unwrap();
        assert_eq!(h.drain()[0].audience(), Audience::Admins);

        assert!(matches!(
            h.service
                .reserve(&u1, ReserveRequest::new(&a.id))
                .await,
            Err(DomainError::InvalidTransition { .. })
        ));
        assert!(matches!(
            h.service
                .admin_override(&h.admin, OverrideRequest::new(&a.id, SlotStatus::Occupied))
                .await,
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_by_owner_and_admin() {
        let mut h = harness();
        let slot = h.slot("A01").await;
        let u1 = Actor::user("u1");

        let r = h.service.reserve(&u1, ReserveRequest::new(&slot.id)).await.unwrap();
        assert!(matches!(
            h.service.cancel_reservation(&Actor::user("u2"), &r.reservation.id).await,
            Err(DomainError::PermissionDenied(_))
        ));
        let cancelled = h.service.cancel_reservation(&u1, &r.reservation.id).await.unwrap();
        assert_eq!(cancelled.slot.status, SlotStatus::Vacant);
        assert_eq!(cancelled.reservation.status, ReservationStatus::Cancelled);
        assert!(cancelled.reservation.completed_at.is_some());

        assert!(matches!(
            h.service.cancel_reservation(&u1, &r.reservation.id).await,
            Err(DomainError::ReservationState { .. })
        ));

        let r = h.service.reserve(&u1, ReserveRequest::new(&slot.id)).await.unwrap();
        let by_admin = h.service.cancel_reservation(&h.admin, &r.reservation.id).await.unwrap();
        assert_eq!(by_admin.slot.status, SlotStatus::Vacant);
    }

    #[tokio::test]
    async fn reserve_rejects_out_of_range_ttl() {
        let mut h = harness();
        let slot = h.slot("A01").await;
        let u1 = Actor::user("u1");
        for ttl in [Duration::zero(), Duration::hours(3)] {
            assert!(matches!(
                h.service.reserve(&u1, ReserveRequest::new(&slot.id).with_ttl(ttl)).await,
                Err(DomainError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn scan_resolves_and_checks_in() {
        let mut h = harness();
        let slot = h.slot("B07").await;
        let u1 = Actor::user("u1");

        let scanned = h.service.scan_to_slot("NFC_PARKING_B07").await.unwrap();
        assert_eq!(scanned.slot.id, slot.id);
        assert_eq!(scanned.method, CheckInMethod::Nfc);

        assert!(matches!(
            h.service.scan_to_slot("PARKING_SLOT_Z99").await,
            Err(DomainError::NotFound { .. })
        ));
        assert!(matches!(
            h.service.scan_to_slot("garbage").await,
            Err(DomainError::Validation(_))
        ));

        let occupied = h.service.occupy_by_scan(&u1, "PARKING_SLOT_B07", None).await.unwrap();
        assert_eq!(occupied.session.check_in_method, CheckInMethod::QrCode);
        assert_eq!(occupied.slot.status, SlotStatus::Occupied);
    }

    #[tokio::test]
    async fn deactivated_slot_leaves_availability() {
        let mut h = harness();
        let a = h.slot("A01").await;
        h.slot("A02").await;

        let slot = h.service.set_slot_active(&h.admin, &a.id, false).await.unwrap();
        assert!(!slot.is_active);
        assert!(matches!(
            h.service.occupy(&Actor::user("u1"), OccupyRequest::new(&a.id)).await,
            Err(DomainError::InvalidTransition { .. })
        ));

        let summary = h.service.availability().await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.inactive, 1);
        assert_eq!(summary.available(), 1);

        let available = h.service.list_slots(&SlotFilter::available()).await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].number, "A02");
    }

    #[tokio::test]
    async fn reads_expire_lapsed_holds_when_enabled() {
        let mut h = harness();
        let slot = h.slot("A01").await;
        h.service
            .reserve(&Actor::user("u1"), ReserveRequest::new(&slot.id))
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(15));

        let listed = h.service.list_slots(&SlotFilter::default()).await.unwrap();
        assert_eq!(listed[0].status, SlotStatus::Vacant);
        assert_eq!(listed[0].version, 2);
    }
}
