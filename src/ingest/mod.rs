/// External data feeds.
///
/// One trait per kind of observation so the reconciliation loop can be
/// driven by live HTTP adapters, dev-mode fixtures, or test stubs:
///
/// - [`weather`]: Open-Meteo point forecast per region centroid
/// - [`seismic`]: USGS FDSN event service (GeoJSON)
/// - [`firms`]: NASA FIRMS active-fire area API (CSV)
///
/// Every adapter owns its own HTTP timeout and reports failures as
/// [`FeedError`] so they can be classified and logged uniformly.

pub mod firms;
pub mod seismic;
pub mod weather;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::FeedConfig;
use crate::model::{DailyForecast, FeedError, FireHotspot, SeismicEvent, WeatherObservation};

pub use firms::FirmsFeed;
pub use seismic::UsgsSeismicFeed;
pub use weather::OpenMeteoFeed;

#[async_trait]
pub trait WeatherFeed: Send + Sync {
    /// Current weather at a region centroid. `region` is only used for logs.
    async fn fetch_weather(&self, region: &str, lat: f64, lng: f64) -> Result<WeatherObservation, FeedError>;

    /// Daily forecast for the next `days` days, today first.
    async fn fetch_forecast(&self, region: &str, lat: f64, lng: f64, days: u8) -> Result<DailyForecast, FeedError> {
        let _ = (lat, lng, days);
        Err(FeedError::NoData(format!("no multi-day forecast for {}", region)))
    }
}

#[async_trait]
pub trait SeismicFeed: Send + Sync {
    async fn fetch_seismic_events(&self) -> Result<Vec<SeismicEvent>, FeedError>;
}

#[async_trait]
pub trait HotspotFeed: Send + Sync {
    async fn fetch_fire_hotspots(&self) -> Result<Vec<FireHotspot>, FeedError>;
}

/// The three feeds one reconciliation run reads from.
#[derive(Clone)]
pub struct FeedSet {
    pub weather: Arc<dyn WeatherFeed>,
    pub seismic: Arc<dyn SeismicFeed>,
    pub hotspots: Arc<dyn HotspotFeed>,
}

impl FeedSet {
    /// Live HTTP adapters sharing one connection pool.
    pub fn live(config: &FeedConfig) -> Result<Self, FeedError> {
        let client = http_client(config.timeout())?;
        Ok(Self {
            weather: Arc::new(OpenMeteoFeed::new(client.clone(), config)),
            seismic: Arc::new(UsgsSeismicFeed::new(client.clone(), config)),
            hotspots: Arc::new(FirmsFeed::new(client, config)),
        })
    }
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client, FeedError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("hazmon_service/0.1")
        .build()
        .map_err(FeedError::from)
}

/// Turns a non-2xx response into `FeedError::Http`.
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FeedError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FeedError::Http(status.as_u16()))
    }
}
