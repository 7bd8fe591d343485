//! The reconciliation loop.
//!
//! Each run walks three independent phases:
//!
//! ```text
//! run_once
//!     │
//!     ├─► region scoring   weather feed → scorer → region risk
//!     ├─► seismic          seismic feed → dedup → earthquake incidents
//!     └─► wildfire         hotspot feed → cluster → dedup → wildfire incidents
//! ```
//!
//! A phase that fails is logged and the next phase still runs. Runs never
//! overlap: a trigger that arrives while a run is in progress is dropped,
//! not queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::alert::stalenesses::stale_regions;
use crate::analysis::clustering::{cluster_hotspots, propose_new};
use crate::analysis::dedup::{Candidate, is_duplicate};
use crate::analysis::outlook::{MAX_OUTLOOK_REGIONS, OUTLOOK_DAYS, RegionForecast, ThreatOutlook, predict_72h};
use crate::analysis::scoring::RiskScorer;
use crate::config::{SchedulerConfig, ThresholdConfig};
use crate::ingest::FeedSet;
use crate::logging::{DataSource, log_feed_failure, log_phase_summary};
use crate::model::{FeedError, IncidentKind, IncidentSource, NewIncident, Region, StoreError};
use crate::regions::nearest_region;
use crate::store::Store;

#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one reconciliation run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub regions_total: usize,
    pub regions_scored: usize,
    pub regions_failed: usize,
    pub quakes_created: usize,
    pub wildfires_created: usize,
    /// `"<phase>: <error>"` for every phase that aborted.
    pub phase_errors: Vec<String>,
    pub stale_regions: usize,
    pub duration: Duration,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.regions_failed == 0 && self.phase_errors.is_empty()
    }

    fn log(&self) {
        let duration_ms = self.duration.as_millis() as u64;
        if self.is_clean() {
            info!(
                source = %DataSource::System,
                regions_scored = self.regions_scored,
                quakes_created = self.quakes_created,
                wildfires_created = self.wildfires_created,
                stale_regions = self.stale_regions,
                duration_ms,
                "reconciliation run complete"
            );
        } else {
            warn!(
                source = %DataSource::System,
                regions_scored = self.regions_scored,
                regions_failed = self.regions_failed,
                quakes_created = self.quakes_created,
                wildfires_created = self.wildfires_created,
                stale_regions = self.stale_regions,
                phase_errors = ?self.phase_errors,
                duration_ms,
                "reconciliation run complete with errors"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// One run
// ---------------------------------------------------------------------------

pub struct Reconciler {
    store: Arc<dyn Store>,
    feeds: FeedSet,
    scorer: Arc<dyn RiskScorer>,
    schedule: SchedulerConfig,
    thresholds: ThresholdConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        feeds: FeedSet,
        scorer: Arc<dyn RiskScorer>,
        schedule: SchedulerConfig,
        thresholds: ThresholdConfig,
    ) -> Self {
        Self {
            store,
            feeds,
            scorer,
            schedule,
            thresholds,
        }
    }

    /// Runs all three phases once. Never fails; problems are counted in the
    /// summary.
    pub async fn run_once(&self) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        info!(source = %DataSource::System, "reconciliation run starting");

        if let Err(e) = self.score_regions(&mut summary).await {
            record_phase_error(&mut summary, "region scoring", &e);
        }

        match self.ingest_seismic().await {
            Ok(created) => summary.quakes_created = created,
            Err(e) => record_phase_error(&mut summary, "seismic", &e),
        }

        match self.ingest_wildfires().await {
            Ok(created) => summary.wildfires_created = created,
            Err(e) => record_phase_error(&mut summary, "wildfire", &e),
        }

        match self.store.list_regions().await {
            Ok(regions) => {
                summary.stale_regions =
                    stale_regions(&regions, self.schedule.stale_after_minutes, Utc::now()).len()
            }
            Err(e) => warn!(source = %DataSource::Database, "could not check region staleness: {}", e),
        }

        summary.duration = started.elapsed();
        summary.log();
        summary
    }

    /// Expected floods and droughts over the next 72 hours for the first
    /// regions on record. Regions whose forecast cannot be fetched are left
    /// out of the outlook.
    pub async fn outlook(&self) -> Result<Vec<ThreatOutlook>, StoreError> {
        let regions = self.store.list_regions().await?;
        let mut forecasts = Vec::with_capacity(MAX_OUTLOOK_REGIONS);

        for region in regions.iter().take(MAX_OUTLOOK_REGIONS) {
            match self
                .feeds
                .weather
                .fetch_forecast(&region.name, region.lat, region.lng, OUTLOOK_DAYS)
                .await
            {
                Ok(forecast) => forecasts.push(RegionForecast {
                    region: region.name.clone(),
                    forecast,
                }),
                Err(e) => log_feed_failure(DataSource::Weather, Some(&region.name), "forecast fetch", &e),
            }
        }

        let outlooks = predict_72h(&forecasts);
        info!(
            source = %DataSource::Weather,
            assessed = forecasts.len(),
            threats = outlooks.len(),
            "72h outlook prepared"
        );
        Ok(outlooks)
    }

    /// Score every region. A weather failure skips that region; a storage
    /// failure aborts the phase.
    async fn score_regions(&self, summary: &mut RunSummary) -> Result<(), PhaseError> {
        let regions = self.store.list_regions().await?;
        summary.regions_total = regions.len();
        let batch_size = self.schedule.batch_size.max(1);

        for (index, region) in regions.iter().enumerate() {
            match self
                .feeds
                .weather
                .fetch_weather(&region.name, region.lat, region.lng)
                .await
            {
                Ok(weather) => {
                    let assessment = self.scorer.score(&region.name, &weather).await;
                    self.store
                        .update_region_risk(region.id, assessment.risk_score, Utc::now())
                        .await?;
                    debug!(
                        source = %DataSource::Weather,
                        region = %region.name,
                        score = assessment.risk_score.value(),
                        threat = ?assessment.disaster_type,
                        "region scored"
                    );
                    summary.regions_scored += 1;
                }
                Err(e) => {
                    log_feed_failure(DataSource::Weather, Some(&region.name), "weather fetch", &e);
                    summary.regions_failed += 1;
                }
            }

            let done = index + 1;
            if done % batch_size == 0 && done < regions.len() {
                tokio::time::sleep(self.schedule.batch_pause()).await;
            }
        }

        log_phase_summary(
            DataSource::Weather,
            "region scoring",
            summary.regions_total,
            summary.regions_scored,
            summary.regions_failed,
        );
        Ok(())
    }

    async fn ingest_seismic(&self) -> Result<usize, PhaseError> {
        let events = self.feeds.seismic.fetch_seismic_events().await.inspect_err(|e| {
            log_feed_failure(DataSource::Seismic, None, "seismic fetch", e);
        })?;
        let tolerance = self.thresholds.tolerances().earthquake;
        let mut existing = self.store.active_incidents(IncidentKind::Earthquake).await?;
        let regions = self.store.list_regions().await?;

        let mut created = 0;
        for event in events
            .iter()
            .filter(|e| e.magnitude >= self.thresholds.min_quake_magnitude)
        {
            let candidate = Candidate::new(IncidentKind::Earthquake, event.lat, event.lng);
            if is_duplicate(&candidate, &existing, tolerance) {
                debug!(source = %DataSource::Seismic, place = %event.place, "earthquake already on record");
                continue;
            }
            let incident = self
                .store
                .insert_incident(NewIncident {
                    kind: IncidentKind::Earthquake,
                    severity: event.severity,
                    region_id: region_id_near(&regions, event.lat, event.lng),
                    location: Some(event.place.clone()),
                    lat: event.lat,
                    lng: event.lng,
                    affected_people: 0,
                    description: format!(
                        "M{:.1} earthquake — depth {:.1}km. {}",
                        event.magnitude, event.depth_km, event.place
                    ),
                    source: IncidentSource::SeismicFeed,
                })
                .await?;
            info!(
                source = %DataSource::Seismic,
                incident = incident.id,
                magnitude = event.magnitude,
                place = %event.place,
                "earthquake incident created"
            );
            // Later events in this batch dedup against this one too
            existing.push(incident);
            created += 1;
        }
        Ok(created)
    }

    async fn ingest_wildfires(&self) -> Result<usize, PhaseError> {
        let hotspots = self.feeds.hotspots.fetch_fire_hotspots().await.inspect_err(|e| {
            log_feed_failure(DataSource::Firms, None, "hotspot fetch", e);
        })?;
        let clusters = cluster_hotspots(&hotspots, &self.thresholds.cluster_policy());
        if clusters.is_empty() {
            debug!(source = %DataSource::Firms, hotspots = hotspots.len(), "no qualifying fire clusters");
            return Ok(0);
        }

        let existing = self.store.active_incidents(IncidentKind::Wildfire).await?;
        let regions = self.store.list_regions().await?;
        let fresh = propose_new(clusters, &existing, self.thresholds.tolerances().wildfire);

        let mut created = 0;
        for cluster in fresh {
            let (lat, lng) = cluster.representative();
            let incident = self
                .store
                .insert_incident(NewIncident {
                    kind: IncidentKind::Wildfire,
                    severity: cluster.severity,
                    region_id: region_id_near(&regions, lat, lng),
                    location: None,
                    lat,
                    lng,
                    affected_people: 0,
                    description: cluster.description(),
                    source: IncidentSource::FireFeed,
                })
                .await?;
            info!(
                source = %DataSource::Firms,
                incident = incident.id,
                points = cluster.len(),
                severity = %cluster.severity,
                "wildfire incident created"
            );
            created += 1;
        }
        Ok(created)
    }
}

fn region_id_near(regions: &[Region], lat: f64, lng: f64) -> Option<i64> {
    nearest_region(regions, lat, lng).map(|r| r.id)
}

fn record_phase_error(summary: &mut RunSummary, phase: &str, err: &PhaseError) {
    error!(source = %DataSource::System, phase, "phase aborted: {}", err);
    summary.phase_errors.push(format!("{}: {}", phase, err));
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum TriggerOutcome {
    Completed(RunSummary),
    /// Another run was in progress; this trigger was dropped.
    Skipped,
    /// The run panicked. The guard has been released.
    Panicked(String),
}

/// Clears the running flag when dropped, including during unwinding.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the run guard. Cheap to clone; clones share the guard, so a manual
/// trigger and the interval loop can never run concurrently.
#[derive(Clone)]
pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    running: Arc<AtomicBool>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            running: Arc::new(AtomicBool::new(false)),
            interval,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start a run unless one is already in progress.
    ///
    /// The run executes in its own task, so a panic inside it is caught
    /// here rather than tearing down the caller, and the guard is released
    /// when that task ends even if this future is dropped first.
    pub async fn trigger(&self) -> TriggerOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!(source = %DataSource::System, "reconciliation already running, trigger skipped");
            return TriggerOutcome::Skipped;
        }
        let guard = RunGuard(self.running.clone());
        let reconciler = self.reconciler.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            reconciler.run_once().await
        });

        match task.await {
            Ok(summary) => TriggerOutcome::Completed(summary),
            Err(e) => {
                error!(source = %DataSource::System, "reconciliation run panicked: {}", e);
                TriggerOutcome::Panicked(e.to_string())
            }
        }
    }

    /// Start the interval loop. The first run fires immediately; ticks
    /// missed while a run is in progress are skipped, not replayed.
    pub fn spawn(&self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = self.clone();

        let task = tokio::spawn(async move {
            info!(
                source = %DataSource::System,
                interval_secs = scheduler.interval.as_secs(),
                "scheduler started"
            );
            let mut ticker = tokio::time::interval(scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        scheduler.trigger().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!(source = %DataSource::System, "scheduler stopped");
        });

        SchedulerHandle {
            scheduler: self.clone(),
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Control handle for a spawned scheduler loop.
pub struct SchedulerHandle {
    scheduler: Scheduler,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Manual run, sharing the loop's guard.
    pub async fn trigger(&self) -> TriggerOutcome {
        self.scheduler.trigger().await
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Stop the loop. A run already in progress is allowed to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(source = %DataSource::System, "scheduler task ended abnormally: {}", e);
        }
    }
}
