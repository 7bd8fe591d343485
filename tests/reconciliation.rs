/// End-to-end tests of the reconciliation loop against the in-memory store.
///
/// Every feed is a stub, so these run offline and fast:
///
///   cargo test --test reconciliation

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use hazmon_service::analysis::outlook::{MAX_OUTLOOK_REGIONS, OUTLOOK_DAYS};
use hazmon_service::analysis::scoring::FallbackScorer;
use hazmon_service::config::{SchedulerConfig, ThresholdConfig};
use hazmon_service::ingest::{FeedSet, HotspotFeed, SeismicFeed, WeatherFeed};
use hazmon_service::model::{
    DailyForecast, FeedError, FireHotspot, IncidentKind, IncidentSource, SeismicEvent, Severity,
    WeatherObservation, severity_for_magnitude,
};
use hazmon_service::regions::{REGION_REGISTRY, find_region};
use hazmon_service::scheduler::{Reconciler, Scheduler, TriggerOutcome};
use hazmon_service::store::{InMemoryStore, Store};

// ---------------------------------------------------------------------------
// Stub feeds
// ---------------------------------------------------------------------------

struct StubWeather {
    observation: WeatherObservation,
    failing: Vec<&'static str>,
    calls: AtomicUsize,
}

impl StubWeather {
    fn new(observation: WeatherObservation) -> Self {
        Self {
            observation,
            failing: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WeatherFeed for StubWeather {
    async fn fetch_weather(&self, region: &str, _lat: f64, _lng: f64) -> Result<WeatherObservation, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|f| *f == region) {
            return Err(FeedError::Http(503));
        }
        Ok(self.observation)
    }
}

/// Blocks inside the first fetch until the test opens the gate.
struct GatedWeather {
    entered: Arc<Notify>,
    gate: Arc<Notify>,
}

#[async_trait]
impl WeatherFeed for GatedWeather {
    async fn fetch_weather(&self, _region: &str, _lat: f64, _lng: f64) -> Result<WeatherObservation, FeedError> {
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(WeatherObservation::new(1.0, 25.0))
    }
}

struct PanickingWeather;

#[async_trait]
impl WeatherFeed for PanickingWeather {
    async fn fetch_weather(&self, _region: &str, _lat: f64, _lng: f64) -> Result<WeatherObservation, FeedError> {
        panic!("weather adapter bug");
    }
}

/// Three-day forecasts keyed by region; unknown regions fail.
struct StubForecast {
    forecasts: Vec<(&'static str, DailyForecast)>,
    calls: AtomicUsize,
}

#[async_trait]
impl WeatherFeed for StubForecast {
    async fn fetch_weather(&self, _region: &str, _lat: f64, _lng: f64) -> Result<WeatherObservation, FeedError> {
        Ok(WeatherObservation::default())
    }

    async fn fetch_forecast(&self, region: &str, _lat: f64, _lng: f64, days: u8) -> Result<DailyForecast, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(days, OUTLOOK_DAYS);
        self.forecasts
            .iter()
            .find(|(name, _)| *name == region)
            .map(|(_, forecast)| forecast.clone())
            .ok_or(FeedError::Http(503))
    }
}

struct StubSeismic(Result<Vec<SeismicEvent>, FeedError>);

#[async_trait]
impl SeismicFeed for StubSeismic {
    async fn fetch_seismic_events(&self) -> Result<Vec<SeismicEvent>, FeedError> {
        self.0.clone()
    }
}

struct StubHotspots(Result<Vec<FireHotspot>, FeedError>);

#[async_trait]
impl HotspotFeed for StubHotspots {
    async fn fetch_fire_hotspots(&self) -> Result<Vec<FireHotspot>, FeedError> {
        self.0.clone()
    }
}

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn quake(lat: f64, lng: f64, magnitude: f64) -> SeismicEvent {
    SeismicEvent {
        lat,
        lng,
        magnitude,
        depth_km: 10.0,
        place: "25 km NW of Naivasha, Kenya".to_string(),
        severity: severity_for_magnitude(magnitude),
    }
}

fn hotspots(count: usize, lat: f64, lng: f64) -> Vec<FireHotspot> {
    (0..count)
        .map(|i| FireHotspot::at(lat + i as f64 * 0.01, lng + i as f64 * 0.01))
        .collect()
}

async fn seeded_store(names: &[&str]) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    let seeds: Vec<_> = names
        .iter()
        .map(|n| *find_region(n).expect("region in registry"))
        .collect();
    store.seed_regions(&seeds).await.unwrap();
    store
}

fn quiet_feeds(weather: Arc<dyn WeatherFeed>) -> FeedSet {
    FeedSet {
        weather,
        seismic: Arc::new(StubSeismic(Ok(Vec::new()))),
        hotspots: Arc::new(StubHotspots(Ok(Vec::new()))),
    }
}

fn three_days(rain: [f64; 3], temps: [f64; 3]) -> DailyForecast {
    DailyForecast {
        precipitation_mm: rain.iter().map(|v| Some(*v)).collect(),
        temp_max_c: temps.iter().map(|v| Some(*v)).collect(),
    }
}

fn reconciler(store: Arc<InMemoryStore>, feeds: FeedSet) -> Reconciler {
    Reconciler::new(
        store,
        feeds,
        Arc::new(FallbackScorer::new(15, None)),
        SchedulerConfig {
            batch_size: 2,
            batch_pause_ms: 0,
            ..Default::default()
        },
        ThresholdConfig::default(),
    )
}

// ---------------------------------------------------------------------------
// Region scoring
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_turkana_heavy_rain_scores_high() {
    let store = seeded_store(&["Turkana"]).await;
    let weather = Arc::new(StubWeather::new(WeatherObservation::new(30.0, 38.0)));
    let summary = reconciler(store.clone(), quiet_feeds(weather)).run_once().await;

    assert_eq!(summary.regions_scored, 1);
    let turkana = store.list_regions().await.unwrap().remove(0);
    assert!(
        turkana.risk_score.value() >= 75,
        "expected >= 75, got {}",
        turkana.risk_score
    );
    assert!(turkana.last_updated.is_some());
    assert_eq!(summary.stale_regions, 0);
}

#[tokio::test]
async fn test_weather_failure_skips_only_that_region() {
    let store = seeded_store(&["Kisumu", "Nakuru", "Nyeri", "Lamu", "Embu"]).await;
    let mut weather = StubWeather::new(WeatherObservation::new(5.0, 28.0));
    weather.failing = vec!["Nyeri"];
    let weather = Arc::new(weather);

    let summary = reconciler(store.clone(), quiet_feeds(weather.clone())).run_once().await;

    assert_eq!(weather.calls.load(Ordering::SeqCst), 5, "every region should be attempted");
    assert_eq!(summary.regions_total, 5);
    assert_eq!(summary.regions_scored, 4);
    assert_eq!(summary.regions_failed, 1);
    assert!(summary.phase_errors.is_empty());
    assert_eq!(summary.stale_regions, 1);

    for region in store.list_regions().await.unwrap() {
        assert_eq!(
            region.last_updated.is_none(),
            region.name == "Nyeri",
            "unexpected update state for {}",
            region.name
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_batch_pause_between_batches_only() {
    let store = seeded_store(&["Kisumu", "Nakuru", "Nyeri", "Lamu", "Embu"]).await;
    let weather = Arc::new(StubWeather::new(WeatherObservation::new(5.0, 28.0)));
    let reconciler = Reconciler::new(
        store,
        quiet_feeds(weather),
        Arc::new(FallbackScorer::new(15, None)),
        SchedulerConfig {
            batch_size: 2,
            batch_pause_ms: 1_000,
            ..Default::default()
        },
        ThresholdConfig::default(),
    );

    let start = tokio::time::Instant::now();
    let summary = reconciler.run_once().await;

    assert_eq!(summary.regions_scored, 5);
    // Paused after regions 2 and 4, not after the last
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

// ---------------------------------------------------------------------------
// Seismic phase
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_light_quake_near_nairobi_is_recorded_once() {
    let store = seeded_store(&["Nairobi", "Kiambu", "Nakuru"]).await;
    let feeds = FeedSet {
        seismic: Arc::new(StubSeismic(Ok(vec![quake(-1.0, 36.8, 4.2)]))),
        ..quiet_feeds(Arc::new(StubWeather::new(WeatherObservation::default())))
    };
    let reconciler = reconciler(store.clone(), feeds);

    assert_eq!(reconciler.run_once().await.quakes_created, 1);
    assert_eq!(reconciler.run_once().await.quakes_created, 0);

    let quakes = store.active_incidents(IncidentKind::Earthquake).await.unwrap();
    assert_eq!(quakes.len(), 1);
    assert_eq!(quakes[0].severity, Severity::Low);
    assert_eq!((quakes[0].lat, quakes[0].lng), (-1.0, 36.8));
    assert!(quakes[0].description.starts_with("M4.2 earthquake"));
}

#[tokio::test]
async fn test_same_earthquake_twice_creates_one_incident() {
    let store = seeded_store(&["Nakuru"]).await;
    let feeds = FeedSet {
        seismic: Arc::new(StubSeismic(Ok(vec![quake(-0.6, 36.2, 4.7)]))),
        ..quiet_feeds(Arc::new(StubWeather::new(WeatherObservation::default())))
    };
    let reconciler = reconciler(store.clone(), feeds);

    assert_eq!(reconciler.run_once().await.quakes_created, 1);
    assert_eq!(reconciler.run_once().await.quakes_created, 0);

    let quakes = store.active_incidents(IncidentKind::Earthquake).await.unwrap();
    assert_eq!(quakes.len(), 1);
    let incident = &quakes[0];
    assert_eq!(incident.severity, Severity::Medium);
    assert_eq!(incident.source, IncidentSource::SeismicFeed);
    assert_eq!(incident.affected_people, 0);
    assert_eq!(
        incident.description,
        "M4.7 earthquake — depth 10.0km. 25 km NW of Naivasha, Kenya"
    );
    assert!(incident.region_id.is_some());
}

#[tokio::test]
async fn test_seismic_batch_dedups_against_itself_and_threshold() {
    let store = seeded_store(&["Nakuru"]).await;
    let feeds = FeedSet {
        seismic: Arc::new(StubSeismic(Ok(vec![
            quake(-0.6, 36.2, 4.7),
            quake(-0.65, 36.25, 4.1), // same event, second agency solution
            quake(2.0, 38.0, 3.4),    // below threshold
            quake(1.0, 35.0, 6.2),
        ]))),
        ..quiet_feeds(Arc::new(StubWeather::new(WeatherObservation::default())))
    };

    let summary = reconciler(store.clone(), feeds).run_once().await;
    assert_eq!(summary.quakes_created, 2);

    let mut severities: Vec<Severity> = store
        .active_incidents(IncidentKind::Earthquake)
        .await
        .unwrap()
        .iter()
        .map(|i| i.severity)
        .collect();
    severities.sort();
    assert_eq!(severities, vec![Severity::Medium, Severity::High]);
}

#[tokio::test]
async fn test_resolved_quake_does_not_block_new_one() {
    let store = seeded_store(&["Nakuru"]).await;
    let feeds = FeedSet {
        seismic: Arc::new(StubSeismic(Ok(vec![quake(-0.6, 36.2, 4.7)]))),
        ..quiet_feeds(Arc::new(StubWeather::new(WeatherObservation::default())))
    };
    let reconciler = reconciler(store.clone(), feeds);

    reconciler.run_once().await;
    let first = store.active_incidents(IncidentKind::Earthquake).await.unwrap().remove(0);
    store.resolve_incident(first.id, chrono::Utc::now()).await.unwrap();

    assert_eq!(reconciler.run_once().await.quakes_created, 1);
}

// ---------------------------------------------------------------------------
// Wildfire phase and phase isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fire_cluster_creates_one_wildfire_per_run() {
    let store = seeded_store(&["Narok"]).await;
    let feeds = FeedSet {
        hotspots: Arc::new(StubHotspots(Ok(hotspots(5, -1.1, 35.9)))),
        ..quiet_feeds(Arc::new(StubWeather::new(WeatherObservation::default())))
    };
    let reconciler = reconciler(store.clone(), feeds);

    assert_eq!(reconciler.run_once().await.wildfires_created, 1);
    assert_eq!(reconciler.run_once().await.wildfires_created, 0);

    let fires = store.active_incidents(IncidentKind::Wildfire).await.unwrap();
    assert_eq!(fires.len(), 1);
    assert_eq!(fires[0].severity, Severity::Medium);
    assert_eq!(fires[0].lat, -1.1);
    assert_eq!(fires[0].description, "5 active fire hotspots detected via satellite.");
}

#[tokio::test]
async fn test_seismic_failure_does_not_block_wildfire_phase() {
    let store = seeded_store(&["Narok"]).await;
    let feeds = FeedSet {
        seismic: Arc::new(StubSeismic(Err(FeedError::Network("connection reset".into())))),
        hotspots: Arc::new(StubHotspots(Ok(hotspots(12, -1.1, 35.9)))),
        ..quiet_feeds(Arc::new(StubWeather::new(WeatherObservation::new(2.0, 26.0))))
    };

    let summary = reconciler(store.clone(), feeds).run_once().await;
    assert_eq!(summary.regions_scored, 1);
    assert_eq!(summary.phase_errors.len(), 1);
    assert!(summary.phase_errors[0].starts_with("seismic"));
    assert_eq!(summary.wildfires_created, 1);

    let fires = store.active_incidents(IncidentKind::Wildfire).await.unwrap();
    assert_eq!(fires[0].severity, Severity::High);
}

#[tokio::test]
async fn test_unconfigured_hotspot_feed_is_a_phase_error_only() {
    let store = seeded_store(&["Narok"]).await;
    let feeds = FeedSet {
        seismic: Arc::new(StubSeismic(Ok(vec![quake(-0.6, 36.2, 4.7)]))),
        hotspots: Arc::new(StubHotspots(Err(FeedError::NotConfigured("FIRMS_MAP_KEY".into())))),
        ..quiet_feeds(Arc::new(StubWeather::new(WeatherObservation::default())))
    };

    let summary = reconciler(store, feeds).run_once().await;
    assert_eq!(summary.quakes_created, 1);
    assert_eq!(summary.phase_errors.len(), 1);
    assert!(summary.phase_errors[0].starts_with("wildfire"));
}

// ---------------------------------------------------------------------------
// Run guard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_trigger_while_running_is_skipped() {
    let store = seeded_store(&["Kisumu"]).await;
    let entered = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let weather = Arc::new(GatedWeather {
        entered: entered.clone(),
        gate: gate.clone(),
    });
    let scheduler = Scheduler::new(
        Arc::new(reconciler(store, quiet_feeds(weather))),
        Duration::from_secs(3600),
    );

    let first = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.trigger().await })
    };
    entered.notified().await;
    assert!(scheduler.is_running());

    assert!(matches!(scheduler.trigger().await, TriggerOutcome::Skipped));

    gate.notify_one();
    let outcome = first.await.unwrap();
    assert!(matches!(outcome, TriggerOutcome::Completed(ref s) if s.regions_scored == 1));
    assert!(!scheduler.is_running(), "guard should be released after the run");
}

#[tokio::test]
async fn test_panicking_run_releases_guard() {
    let store = seeded_store(&["Kisumu"]).await;
    let scheduler = Scheduler::new(
        Arc::new(reconciler(store, quiet_feeds(Arc::new(PanickingWeather)))),
        Duration::from_secs(3600),
    );

    assert!(matches!(scheduler.trigger().await, TriggerOutcome::Panicked(_)));
    assert!(!scheduler.is_running());
    // The next trigger is accepted rather than skipped
    assert!(matches!(scheduler.trigger().await, TriggerOutcome::Panicked(_)));
}

#[tokio::test]
async fn test_spawned_loop_runs_immediately_and_shuts_down() {
    let store = seeded_store(&["Kisumu"]).await;
    let weather = Arc::new(StubWeather::new(WeatherObservation::new(4.0, 26.0)));
    let scheduler = Scheduler::new(
        Arc::new(reconciler(store.clone(), quiet_feeds(weather.clone()))),
        Duration::from_secs(3600),
    );

    let handle = scheduler.spawn();
    let mut scored = false;
    for _ in 0..100 {
        if store.list_regions().await.unwrap()[0].last_updated.is_some() {
            scored = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(scored, "first tick should fire without waiting a full interval");

    handle.shutdown().await;
    assert_eq!(weather.calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// 72-hour outlook
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_outlook_flags_wet_and_dry_regions() {
    let store = seeded_store(&["Tana River", "Wajir", "Nyeri", "Lamu"]).await;
    let weather = Arc::new(StubForecast {
        forecasts: vec![
            ("Tana River", three_days([30.0, 15.0, 10.0], [29.0, 30.0, 28.0])),
            ("Wajir", three_days([0.2, 0.3, 0.1], [37.0, 39.0, 38.0])),
            ("Nyeri", three_days([2.0, 1.0, 0.0], [24.0, 25.0, 23.0])),
        ],
        calls: AtomicUsize::new(0),
    });
    let reconciler = reconciler(store, quiet_feeds(weather.clone()));

    let mut outlooks = reconciler.outlook().await.unwrap();
    outlooks.sort_by(|a, b| a.region.cmp(&b.region));

    assert_eq!(weather.calls.load(Ordering::SeqCst), 4, "Lamu fails but is still attempted");
    assert_eq!(outlooks.len(), 2);

    let flood = &outlooks[0];
    assert_eq!(flood.region, "Tana River");
    assert_eq!(flood.threat, IncidentKind::Flood);
    assert_eq!(flood.likelihood, Severity::High);
    assert_eq!(flood.within_hours, 48);

    let drought = &outlooks[1];
    assert_eq!(drought.region, "Wajir");
    assert_eq!(drought.threat, IncidentKind::Drought);
    assert_eq!(drought.within_hours, 72);
}

#[tokio::test]
async fn test_outlook_considers_first_regions_only() {
    let store = Arc::new(InMemoryStore::new());
    store.seed_regions(&REGION_REGISTRY[..25]).await.unwrap();
    let weather = Arc::new(StubForecast {
        forecasts: Vec::new(),
        calls: AtomicUsize::new(0),
    });
    let reconciler = reconciler(store, quiet_feeds(weather.clone()));

    assert!(reconciler.outlook().await.unwrap().is_empty());
    assert_eq!(weather.calls.load(Ordering::SeqCst), MAX_OUTLOOK_REGIONS);
}
