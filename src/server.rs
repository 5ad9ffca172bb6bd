//! Reusable parking service runtime.
//!
//! Provides [`ServerHandle`] that encapsulates the full lifecycle: store,
//! slot inventory, service, expiry sweeper, notification logger, metrics
//! and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::{CreateSlotRequest, ExpiryScheduler, SlotService};
use crate::config::{AppConfig, SlotSeed};
use crate::domain::{Actor, DomainError, RepositoryProvider};
use crate::infrastructure::InMemoryStore;
use crate::notifications::{create_event_bus, SharedEventBus};
use crate::support::shutdown::{ShutdownCoordinator, ShutdownSignal};
use crate::support::time::{SharedClock, SystemClock};

/// Identity used for slots registered from configuration
const SYSTEM_ACTOR: &str = "system";

// ── Options ────────────────────────────────────────────────────────

/// Options for starting the parking service.
pub struct ServerOptions {
    /// Application configuration.
    pub config: AppConfig,
    /// Time source; the system clock by default.
    pub clock: SharedClock,
    /// Install the Prometheus exporter when `metrics.enabled` (default: true).
    pub install_metrics: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            clock: Arc::new(SystemClock),
            install_metrics: true,
        }
    }
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running parking service.
///
/// # Examples
///
/// ```rust,no_run
/// use parking_service::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     // ... wait for shutdown signal ...
///     handle.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    /// Shared event bus carrying every notification.
    pub event_bus: SharedEventBus,
    /// Repository provider for data access.
    pub repos: Arc<dyn RepositoryProvider>,
    /// Public operations.
    pub service: Arc<SlotService>,
    /// Background expiry sweeper.
    pub scheduler: ExpiryScheduler,
    /// The configuration the server was started with.
    pub config: AppConfig,

    shutdown: ShutdownCoordinator,
    sweeper_task: Option<JoinHandle<()>>,
    notifier_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Start the parking service with the given options.
    ///
    /// This will:
    /// 1. Install the Prometheus exporter (if enabled)
    /// 2. Build the in-memory store, event bus and slot service
    /// 3. Register the configured slot inventory
    /// 4. Start the notification logger and the expiry sweeper
    pub async fn start(opts: ServerOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let app_cfg = opts.config;
        app_cfg.validate()?;

        info!(name = %app_cfg.server.name, "Starting parking service...");

        // ── Prometheus exporter ────────────────────────────────
        if opts.install_metrics && app_cfg.metrics.enabled {
            install_metrics(&app_cfg.metrics.listen_addr)?;
        }

        // ── Repositories, event bus & service ─────────────────
        let repos: Arc<dyn RepositoryProvider> = Arc::new(InMemoryStore::new());
        let event_bus = create_event_bus();
        info!("🔔 Event bus initialized");

        let service = Arc::new(SlotService::new(
            repos.clone(),
            &app_cfg,
            event_bus.clone(),
            opts.clock,
        ));

        // ── Slot inventory ─────────────────────────────────────
        let registered = seed_slots(&service, &app_cfg.slots).await?;
        info!(registered, configured = app_cfg.slots.len(), "🅿 Slot inventory loaded");

        // ── Shutdown coordinator ───────────────────────────────
        let shutdown = ShutdownCoordinator::new(app_cfg.server.shutdown_timeout);
        let shutdown_signal = shutdown.signal();

        // ── Background tasks ───────────────────────────────────
        let notifier_task = spawn_notification_logger(&event_bus, shutdown_signal.clone());

        let scheduler = ExpiryScheduler::new(service.clone(), &app_cfg.expiry);
        let sweeper_task = scheduler.start(shutdown_signal);

        info!("🚀 Parking service started.");

        Ok(Self {
            event_bus,
            repos,
            service,
            scheduler,
            config: app_cfg,
            shutdown,
            sweeper_task,
            notifier_task,
        })
    }

    /// Get a cloneable shutdown signal.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    /// Trigger graceful shutdown (non-blocking).
    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for shutdown to be triggered, then for the background tasks
    /// to stop, bounded by `server.shutdown_timeout`.
    pub async fn wait(self) {
        let Self {
            shutdown,
            sweeper_task,
            notifier_task,
            ..
        } = self;

        info!("⏳ Waiting for background tasks to complete...");
        let completed = shutdown
            .shutdown_with_cleanup(|| async move {
                if let Some(task) = sweeper_task {
                    if let Err(e) = task.await {
                        error!("Expiry sweeper task panicked: {}", e);
                    }
                }
                if let Err(e) = notifier_task.await {
                    error!("Notification logger task panicked: {}", e);
                }
            })
            .await;

        if completed {
            info!("👋 Parking service shutdown complete");
        } else {
            warn!("Parking service stopped with background tasks still running");
        }
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down parking service...");
        self.trigger_shutdown();
        self.wait().await;
    }

    /// Check if the background tasks are still running.
    pub fn is_running(&self) -> bool {
        !self.notifier_task.is_finished()
            || self
                .sweeper_task
                .as_ref()
                .map(|t| !t.is_finished())
                .unwrap_or(false)
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn install_metrics(listen_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = listen_addr.parse()?;
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => info!(%addr, "📊 Prometheus exporter listening"),
        // the global recorder survives a stop + start in the same process
        Err(e) => warn!(error = %e, "Prometheus exporter not installed"),
    }
    Ok(())
}

/// Register configured slots; already present numbers are skipped.
async fn seed_slots(service: &SlotService, seeds: &[SlotSeed]) -> Result<usize, DomainError> {
    let actor = Actor::admin(SYSTEM_ACTOR);
    let mut registered = 0;
    for seed in seeds {
        let mut request = CreateSlotRequest::new(seed.number.clone(), seed.slot_type);
        request.floor = seed.floor;
        request.section = seed.section.clone();
        request.row = seed.row.clone();

        match service.create_slot(&actor, request).await {
            Ok(_) => registered += 1,
            Err(DomainError::AlreadyExists(what)) => warn!("Skipping duplicate {}", what),
            Err(e) => return Err(e),
        }
    }
    Ok(registered)
}

/// Log every notification until shutdown. Delivery to devices belongs to
/// whoever else subscribes to the bus.
fn spawn_notification_logger(bus: &SharedEventBus, shutdown: ShutdownSignal) -> JoinHandle<()> {
    let mut subscriber = bus.subscribe();
    let stop = shutdown.notified();
    tokio::spawn(async move {
        let stop = stop.wait();
        tokio::pin!(stop);
        loop {
            tokio::select! {
                message = subscriber.recv() => match message {
                    Some(message) => info!(
                        id = %message.id,
                        event = message.event.event_type(),
                        slot_id = %message.event.slot_id(),
                        audience = ?message.audience,
                        priority = ?message.priority,
                        "🔔 Notification"
                    ),
                    None => break,
                },
                _ = &mut stop => break,
            }
        }
    })
}

/// Initialize tracing (logging) from the application config.
///
/// Call this once at process startup (before [`ServerHandle::start`]).
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::SlotFilter;
    use crate::domain::SlotType;

    fn seed(number: &str, slot_type: SlotType) -> SlotSeed {
        SlotSeed {
            number: number.into(),
            slot_type,
            floor: Some(1),
            section: Some("A".into()),
            row: None,
        }
    }

    #[tokio::test]
    async fn starts_with_configured_inventory_and_stops() {
        let mut config = AppConfig::default();
        config.server.shutdown_timeout = 2;
        config.slots = vec![
            seed("A01", SlotType::Standard),
            seed("A02", SlotType::EvCharging),
            seed("A01", SlotType::Bike),
        ];

        let handle = ServerHandle::start(ServerOptions {
            config,
            ..ServerOptions::default()
        })
        .await
        .unwrap();

        let slots = handle.service.list_slots(&SlotFilter::default()).await.unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].slot_type, SlotType::EvCharging);
        assert_eq!(slots[0].location.floor, Some(1));
        assert!(handle.is_running());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.reservations.default_ttl_secs = 0;
        let result = ServerHandle::start(ServerOptions {
            config,
            ..ServerOptions::default()
        })
        .await;
        assert!(result.is_err());
    }
}
