//! Record storage.
//!
//! The rest of the service talks to storage only through the [`Store`] trait:
//! narrow, row-oriented operations with no cross-row transactions. Every
//! write touches a single row, so concurrent readers see either the old or
//! the new row, never a mix.
//!
//! Two implementations:
//! - [`memory::InMemoryStore`]: tests and dev mode
//! - [`pg::PgStore`]: production, over the blocking `postgres` client

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::alert::thresholds::is_high_risk;
use crate::model::{
    CacheEntry, Incident, IncidentKind, IncidentStatus, NewIncident, NewNotification, NewRefugeSite,
    NewResponder, Notification, RefugeSite, Region, Responder, ResponderStatus, RiskScore, StoreError,
};
use crate::regions::RegionSeed;

pub use memory::InMemoryStore;
pub use pg::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    // --- Regions ---------------------------------------------------------

    /// Insert any seed whose name is not yet present. Returns how many rows
    /// were inserted.
    async fn seed_regions(&self, seeds: &[RegionSeed]) -> StoreResult<usize>;

    /// All regions ordered by name.
    async fn list_regions(&self) -> StoreResult<Vec<Region>>;

    async fn update_region_risk(&self, region_id: i64, score: RiskScore, at: DateTime<Utc>) -> StoreResult<()>;

    // --- Incidents -------------------------------------------------------

    async fn insert_incident(&self, incident: NewIncident) -> StoreResult<Incident>;

    /// Incidents newest first, optionally filtered by status.
    async fn list_incidents(&self, status: Option<IncidentStatus>) -> StoreResult<Vec<Incident>>;

    /// Active incidents of one kind; the candidate set for deduplication.
    async fn active_incidents(&self, kind: IncidentKind) -> StoreResult<Vec<Incident>>;

    /// Soft-close an incident. Resolving an already resolved incident keeps
    /// its original `resolved_at`.
    async fn resolve_incident(&self, incident_id: i64, at: DateTime<Utc>) -> StoreResult<Incident>;

    // --- Responders ------------------------------------------------------

    async fn insert_responder(&self, responder: NewResponder) -> StoreResult<Responder>;

    /// Responders ordered by name, optionally limited to one region.
    async fn list_responders(&self, region_id: Option<i64>) -> StoreResult<Vec<Responder>>;

    async fn dispatch_responder(&self, responder_id: i64, incident_id: i64) -> StoreResult<Responder>;

    async fn release_responder(&self, responder_id: i64) -> StoreResult<Responder>;

    // --- Refuge sites ---------------------------------------------------

    async fn insert_refuge(&self, refuge: NewRefugeSite) -> StoreResult<RefugeSite>;

    /// Refuge sites in one region, largest capacity first.
    async fn refuges_for_region(&self, region_id: i64) -> StoreResult<Vec<RefugeSite>>;

    // --- Notifications ---------------------------------------------------

    async fn insert_notification(&self, notification: NewNotification) -> StoreResult<Notification>;

    /// Notifications newest first.
    async fn list_notifications(&self) -> StoreResult<Vec<Notification>>;

    // --- Cache -----------------------------------------------------------

    async fn cache_get(&self, key: &str) -> StoreResult<Option<CacheEntry>>;

    /// Insert or overwrite the value for `key`, refreshing `generated_at`.
    async fn cache_upsert(&self, key: &str, value: &str) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// Dashboard statistics
// ---------------------------------------------------------------------------

/// Headline numbers fed to situation reports and the chat assistant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemStats {
    pub active_incidents: usize,
    pub total_affected: u64,
    pub high_risk_regions: usize,
    pub deployed_responders: usize,
    pub available_responders: usize,
}

pub async fn collect_stats(store: &dyn Store) -> StoreResult<SystemStats> {
    let active = store.list_incidents(Some(IncidentStatus::Active)).await?;
    let regions = store.list_regions().await?;
    let responders = store.list_responders(None).await?;

    Ok(SystemStats {
        active_incidents: active.len(),
        total_affected: active.iter().map(|i| i.affected_people).sum(),
        high_risk_regions: regions.iter().filter(|r| is_high_risk(r.risk_score)).count(),
        deployed_responders: responders
            .iter()
            .filter(|r| r.status == ResponderStatus::Deployed)
            .count(),
        available_responders: responders
            .iter()
            .filter(|r| r.status == ResponderStatus::Available)
            .count(),
    })
}
