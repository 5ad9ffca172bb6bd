//! Expiry scheduler
//!
//! Sweeps RESERVED slots on a fixed interval, expiring lapsed
//! reservations through [`SlotService::expire_if_lapsed`] and sending a
//! single "expiring" reminder shortly before each deadline.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::service::SlotService;
use crate::config::{ExpiryConfig, MAX_RESERVATION_TTL_SECS};
use crate::domain::{DomainError, Slot, SlotStatus};
use crate::notifications::{Event, ReservationExpiringEvent};
use crate::support::shutdown::ShutdownSignal;
use crate::support::time::seconds;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// RESERVED slots looked at
    pub examined: usize,
    pub expired: usize,
    /// Lost the CAS to a concurrent transition
    pub conflicts: usize,
    pub failed: usize,
    pub reminders: usize,
}

#[derive(Clone)]
pub struct ExpiryScheduler {
    service: Arc<SlotService>,
    interval: Duration,
    reminder_before: chrono::Duration,
    /// reservation id → deadline it was reminded about
    reminded: Arc<DashMap<String, DateTime<Utc>>>,
    running: Arc<RwLock<bool>>,
}

impl ExpiryScheduler {
    pub fn new(service: Arc<SlotService>, config: &ExpiryConfig) -> Self {
        // no reservation outlives the ttl cap, so neither does its reminder
        let reminder_secs = service
            .reservation_config()
            .reminder_before_secs
            .min(MAX_RESERVATION_TTL_SECS);
        Self {
            service,
            interval: Duration::from_secs(config.sweep_interval_secs),
            reminder_before: seconds(reminder_secs).unwrap_or_else(chrono::Duration::zero),
            reminded: Arc::new(DashMap::new()),
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the sweep loop. Returns `None` when the interval is zero.
    pub fn start(&self, shutdown: ShutdownSignal) -> Option<JoinHandle<()>> {
        if self.interval.is_zero() {
            info!("Expiry sweeper disabled (interval 0)");
            return None;
        }

        let scheduler = self.clone();
        let notified = shutdown.notified();

        Some(tokio::spawn(async move {
            *scheduler.running.write().await = true;
            info!(interval_ms = scheduler.interval.as_millis() as u64, "⏱ Expiry sweeper started");

            let mut interval = tokio::time::interval(scheduler.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let stop = notified.wait();
            tokio::pin!(stop);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = scheduler.sweep_once().await;
                        if report.expired > 0 || report.failed > 0 || report.reminders > 0 {
                            info!(
                                examined = report.examined,
                                expired = report.expired,
                                conflicts = report.conflicts,
                                failed = report.failed,
                                reminders = report.reminders,
                                "Expiry sweep"
                            );
                        } else {
                            debug!(examined = report.examined, conflicts = report.conflicts, "Expiry sweep");
                        }
                    }
                    _ = &mut stop => {
                        info!("⏱ Expiry sweeper shutting down");
                        break;
                    }
                }
            }

            *scheduler.running.write().await = false;
            info!("⏱ Expiry sweeper stopped");
        }))
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// One pass over every RESERVED slot
    pub async fn sweep_once(&self) -> SweepReport {
        match self.service.snapshot().await {
            Ok(slots) => self.sweep(slots).await,
            Err(e) => {
                warn!(error = %e, "Expiry sweep could not list slots");
                SweepReport {
                    failed: 1,
                    ..SweepReport::default()
                }
            }
        }
    }

    /// Expire and remind over `slots` as they were read; a slot that moved
    /// on since is a conflict, not a failure.
    async fn sweep(&self, slots: Vec<Slot>) -> SweepReport {
        let mut report = SweepReport::default();
        let now = self.service.now();

        let mut open = Vec::new();
        for slot in slots.into_iter().filter(|s| s.status == SlotStatus::Reserved) {
            report.examined += 1;

            if slot.reservation_lapsed(now) {
                match self.service.expire_if_lapsed(&slot.id, slot.version).await {
                    Ok(Some(_)) => report.expired += 1,
                    Ok(None) => {}
                    Err(DomainError::Conflict { .. }) => {
                        debug!(slot_id = %slot.id, "Expiry lost race, skipping");
                        report.conflicts += 1;
                    }
                    Err(e) => {
                        warn!(slot_id = %slot.id, error = %e, "Failed to expire reservation");
                        report.failed += 1;
                    }
                }
                continue;
            }

            let (Some(reservation_id), Some(user_id), Some(until)) =
                (slot.reservation_id, slot.reserved_by, slot.active_until)
            else {
                continue;
            };
            open.push(reservation_id.clone());

            if self.reminder_before.is_zero() || until - now > self.reminder_before {
                continue;
            }
            if self.reminded.insert(reservation_id.clone(), until).is_some() {
                continue;
            }
            self.service.emit(Event::ReservationExpiring(ReservationExpiringEvent {
                slot_id: slot.id,
                user_id,
                reservation_id,
                expires_at: until,
                seconds_left: (until - now).num_seconds(),
                timestamp: now,
            }));
            report.reminders += 1;
        }

        self.reminded.retain(|id, _| open.contains(id));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dto::{CreateSlotRequest, ReserveRequest};
    use crate::config::AppConfig;
    use crate::domain::{Actor, ReservationStatus, SlotType};
    use crate::infrastructure::InMemoryStore;
    use crate::notifications::{create_event_bus, EventSubscriber};
    use crate::support::time::ManualClock;

    struct Setup {
        service: Arc<SlotService>,
        scheduler: ExpiryScheduler,
        clock: Arc<ManualClock>,
        events: EventSubscriber,
    }

    fn setup() -> Setup {
        let mut config = AppConfig::default();
        // leave expiry to the sweeper
        config.expiry.expire_on_access = false;
        let bus = create_event_bus();
        let events = bus.subscribe();
        let clock = ManualClock::shared(Utc::now());
        let service = Arc::new(SlotService::new(
            Arc::new(InMemoryStore::new()),
            &config,
            bus,
            clock.clone(),
        ));
        let scheduler = ExpiryScheduler::new(service.clone(), &config.expiry);
        Setup {
            service,
            scheduler,
            clock,
            events,
        }
    }

    async fn reserved_slot(s: &Setup, number: &str, user: &str) -> String {
        let admin = Actor::admin("admin");
        let slot = s
            .service
            .create_slot(&admin, CreateSlotRequest::new(number, SlotType::Standard))
            .await
            .unwrap();
        let outcome = s
            .service
            .reserve(&Actor::user(user), ReserveRequest::new(&slot.id))
            .await
            .unwrap();
        outcome.reservation.id
    }

    fn event_types(events: &mut EventSubscriber) -> Vec<&'static str> {
        let mut types = Vec::new();
        while let Some(message) = events.try_recv() {
            types.push(message.event.event_type());
        }
        types
    }

    #[tokio::test]
    async fn sweep_expires_only_lapsed_reservations() {
        let mut s = setup();
        let early = reserved_slot(&s, "A01", "u1").await;
        s.clock.advance(chrono::Duration::minutes(10));
        let late = reserved_slot(&s, "A02", "u2").await;
        event_types(&mut s.events);

        s.clock.advance(chrono::Duration::minutes(5));
        let report = s.scheduler.sweep_once().await;
        assert_eq!(report.examined, 2);
        assert_eq!(report.expired, 1);
        assert_eq!(report.conflicts, 0);

        assert_eq!(
            s.service.reservation(&early).await.unwrap().status,
            ReservationStatus::Expired
        );
        assert_eq!(
            s.service.reservation(&late).await.unwrap().status,
            ReservationStatus::Pending
        );
        assert_eq!(event_types(&mut s.events), ["reservation_expired"]);

        let again = s.scheduler.sweep_once().await;
        assert_eq!(again.examined, 1);
        assert_eq!(again.expired, 0);
    }

    #[tokio::test]
    async fn reminder_is_sent_once_per_reservation() {
        let mut s = setup();
        reserved_slot(&s, "A01", "u1").await;
        event_types(&mut s.events);

        assert_eq!(s.scheduler.sweep_once().await.reminders, 0);

        // default reminder window is two minutes
        s.clock.advance(chrono::Duration::minutes(13) + chrono::Duration::seconds(30));
        assert_eq!(s.scheduler.sweep_once().await.reminders, 1);
        assert_eq!(s.scheduler.sweep_once().await.reminders, 0);
        assert_eq!(event_types(&mut s.events), ["reservation_expiring"]);

        s.clock.advance(chrono::Duration::minutes(2));
        let report = s.scheduler.sweep_once().await;
        assert_eq!(report.expired, 1);
        assert!(s.scheduler.reminded.is_empty());
    }

    #[tokio::test]
    async fn stale_snapshot_counts_a_conflict_not_a_failure() {
        let mut s = setup();
        let reservation_id = reserved_slot(&s, "A01", "u1").await;
        let stale = s.service.snapshot().await.unwrap();

        // the owner moves the slot on before the sweep writes
        s.service
            .activate_reservation(&Actor::user("u1"), &reservation_id)
            .await
            .unwrap();
        event_types(&mut s.events);
        s.clock.advance(chrono::Duration::minutes(15));

        let report = s.scheduler.sweep(stale).await;
        assert_eq!(report.examined, 1);
        assert_eq!(report.expired, 0);
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.failed, 0);
        assert!(event_types(&mut s.events).is_empty());
        assert_eq!(
            s.service.reservation(&reservation_id).await.unwrap().status,
            ReservationStatus::Active
        );

        let report = s.scheduler.sweep_once().await;
        assert_eq!(report.expired, 1);
        assert_eq!(report.conflicts, 0);
        assert_eq!(event_types(&mut s.events), ["reservation_expired"]);
    }

    #[tokio::test]
    async fn oversized_reminder_window_is_capped() {
        let mut config = AppConfig::default();
        config.reservations.reminder_before_secs = u64::MAX;
        let service = Arc::new(SlotService::new(
            Arc::new(InMemoryStore::new()),
            &config,
            create_event_bus(),
            ManualClock::shared(Utc::now()),
        ));
        let scheduler = ExpiryScheduler::new(service, &config.expiry);
        assert_eq!(
            scheduler.reminder_before,
            chrono::Duration::seconds(MAX_RESERVATION_TTL_SECS as i64)
        );
    }

    #[tokio::test]
    async fn zero_interval_does_not_spawn() {
        let s = setup();
        let scheduler = s.scheduler.clone().with_interval(Duration::ZERO);
        assert!(scheduler.start(ShutdownSignal::new()).is_none());
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn background_loop_stops_on_shutdown() {
        let s = setup();
        let scheduler = s.scheduler.clone().with_interval(Duration::from_millis(10));
        let shutdown = ShutdownSignal::new();

        let handle = scheduler.start(shutdown.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(scheduler.is_running().await);

        shutdown.trigger();
        handle.await.unwrap();
        assert!(!scheduler.is_running().await);
    }
}
