/// Development mode feeds.
///
/// When the live providers are unreachable or keys are not at hand, these
/// fixture feeds stand in for them so the whole reconciliation loop can be
/// exercised against the in-memory store. The fixtures are fixed scenarios:
/// heavy rain in the north-west, a dry spell in the north-east, one
/// moderate earthquake in the Rift Valley and a fire cluster near Narok.

use std::sync::Arc;

use async_trait::async_trait;

use crate::ingest::{FeedSet, HotspotFeed, SeismicFeed, WeatherFeed};
use crate::model::{
    DailyForecast, FeedError, FireHotspot, SeismicEvent, WeatherObservation, severity_for_magnitude,
};

/// Regions given flood-level rainfall by the fixture weather feed.
pub const WET_REGIONS: &[&str] = &["Turkana", "West Pokot", "Tana River"];
/// Regions given drought conditions by the fixture weather feed.
pub const DRY_REGIONS: &[&str] = &["Wajir", "Mandera", "Garissa"];

/// Configuration for the fixture scenario.
pub struct DevMode {
    /// Shift every fixture coordinate by this many degrees of latitude, to
    /// check that dedup keeps working when events move slightly between runs.
    pub drift_deg: f64,
}

impl DevMode {
    pub fn new() -> Self {
        Self { drift_deg: 0.0 }
    }

    pub fn with_drift(drift_deg: f64) -> Self {
        Self { drift_deg }
    }

    pub fn feeds(&self) -> FeedSet {
        FeedSet {
            weather: Arc::new(FixtureWeather),
            seismic: Arc::new(FixtureSeismic {
                drift_deg: self.drift_deg,
            }),
            hotspots: Arc::new(FixtureHotspots {
                drift_deg: self.drift_deg,
            }),
        }
    }
}

impl Default for DevMode {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FixtureWeather;

fn is_one_of(names: &[&str], region: &str) -> bool {
    names.iter().any(|r| r.eq_ignore_ascii_case(region))
}

#[async_trait]
impl WeatherFeed for FixtureWeather {
    async fn fetch_weather(&self, region: &str, _lat: f64, _lng: f64) -> Result<WeatherObservation, FeedError> {
        let observation = if is_one_of(WET_REGIONS, region) {
            WeatherObservation::new(30.0, 38.0)
        } else if is_one_of(DRY_REGIONS, region) {
            WeatherObservation::new(0.5, 39.0)
        } else {
            WeatherObservation::new(3.0, 27.0)
        };
        Ok(observation)
    }

    async fn fetch_forecast(&self, region: &str, _lat: f64, _lng: f64, days: u8) -> Result<DailyForecast, FeedError> {
        let (rain, temps): (&[f64], &[f64]) = if is_one_of(WET_REGIONS, region) {
            (&[12.0, 15.0, 10.0][..], &[29.0, 28.0, 30.0][..])
        } else if is_one_of(DRY_REGIONS, region) {
            (&[0.2, 0.3, 0.1][..], &[37.0, 39.0, 38.0][..])
        } else {
            (&[1.0, 2.0, 0.5][..], &[27.0, 28.0, 26.0][..])
        };
        let days = days as usize;
        Ok(DailyForecast {
            precipitation_mm: rain.iter().cycle().take(days).map(|v| Some(*v)).collect(),
            temp_max_c: temps.iter().cycle().take(days).map(|v| Some(*v)).collect(),
        })
    }
}

pub struct FixtureSeismic {
    drift_deg: f64,
}

#[async_trait]
impl SeismicFeed for FixtureSeismic {
    async fn fetch_seismic_events(&self) -> Result<Vec<SeismicEvent>, FeedError> {
        let quake = |lat: f64, lng: f64, magnitude: f64, depth_km: f64, place: &str| SeismicEvent {
            lat: lat + self.drift_deg,
            lng,
            magnitude,
            depth_km,
            place: place.to_string(),
            severity: severity_for_magnitude(magnitude),
        };
        Ok(vec![
            quake(-0.6, 36.2, 4.7, 10.0, "25 km NW of Naivasha, Kenya"),
            // Below the incident threshold
            quake(2.9, 36.6, 2.8, 12.0, "Lake Turkana region, Kenya"),
        ])
    }
}

pub struct FixtureHotspots {
    drift_deg: f64,
}

#[async_trait]
impl HotspotFeed for FixtureHotspots {
    async fn fetch_fire_hotspots(&self) -> Result<Vec<FireHotspot>, FeedError> {
        Ok((0..6)
            .map(|i| FireHotspot::at(-1.1 + self.drift_deg + i as f64 * 0.02, 35.85 + i as f64 * 0.02))
            .collect())
    }
}
