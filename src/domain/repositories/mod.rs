//! Repository traits for the domain layer
//!
//! Contains:
//! - `RepositoryProvider` — unified access to all per-aggregate repositories
//! - `DomainResult` — standard result type for domain operations

use super::reservation::ReservationRepository;
use super::session::SessionRepository;
use super::slot::SlotRepository;

pub use crate::support::errors::DomainResult;

// ── RepositoryProvider ──────────────────────────────────────────

/// Provides access to all domain repositories.
///
/// ```ignore
/// async fn handle(repos: &dyn RepositoryProvider) {
///     let slot = repos.slots().find_by_id("slot-1").await?;
///     let open = repos.reservations().find_open_for_slot("slot-1").await?;
/// }
/// ```
pub trait RepositoryProvider: Send + Sync {
    fn slots(&self) -> &dyn SlotRepository;
    fn reservations(&self) -> &dyn ReservationRepository;
    fn sessions(&self) -> &dyn SessionRepository;
}
