/// USGS FDSN event service client.
///
/// Queries earthquakes inside the configured bounding box over a look-back
/// window, in GeoJSON. Coordinates arrive as `[lng, lat, depth_km]`.
///
/// API Documentation: https://earthquake.usgs.gov/fdsnws/event/1/

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{SeismicFeed, check_status};
use crate::config::{BoundingBox, FeedConfig};
use crate::logging::DataSource;
use crate::model::{FeedError, SeismicEvent, severity_for_magnitude};

#[derive(Debug, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
pub struct Feature {
    pub properties: Properties,
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
pub struct Properties {
    pub mag: Option<f64>,
    pub place: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Geometry {
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

pub struct UsgsSeismicFeed {
    client: reqwest::Client,
    base_url: String,
    bbox: BoundingBox,
    window_hours: i64,
    min_magnitude: f64,
}

impl UsgsSeismicFeed {
    pub fn new(client: reqwest::Client, config: &FeedConfig) -> Self {
        Self {
            client,
            base_url: config.seismic_base_url.trim_end_matches('/').to_string(),
            bbox: config.bbox,
            window_hours: config.seismic_window_hours,
            min_magnitude: config.seismic_min_magnitude,
        }
    }
}

#[async_trait]
impl SeismicFeed for UsgsSeismicFeed {
    async fn fetch_seismic_events(&self) -> Result<Vec<SeismicEvent>, FeedError> {
        let start = Utc::now() - Duration::hours(self.window_hours);
        let url = format!("{}/fdsnws/event/1/query", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "geojson".to_string()),
                ("starttime", start.format("%Y-%m-%dT%H:%M:%S").to_string()),
                ("minlatitude", self.bbox.south.to_string()),
                ("maxlatitude", self.bbox.north.to_string()),
                ("minlongitude", self.bbox.west.to_string()),
                ("maxlongitude", self.bbox.east.to_string()),
                ("minmagnitude", self.min_magnitude.to_string()),
                ("orderby", "time".to_string()),
            ])
            .send()
            .await?;

        let body = check_status(response)?.text().await?;
        let events = parse_events(&body)?;
        debug!(source = %DataSource::Seismic, count = events.len(), "seismic events fetched");
        Ok(events)
    }
}

/// Decodes a GeoJSON feature collection. Features without a magnitude or
/// with short coordinates are skipped with a warning rather than failing the
/// whole batch.
pub fn parse_events(body: &str) -> Result<Vec<SeismicEvent>, FeedError> {
    let collection: FeatureCollection =
        serde_json::from_str(body).map_err(|e| FeedError::Parse(e.to_string()))?;

    let mut events = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let coords = feature.geometry.map(|g| g.coordinates).unwrap_or_default();
        let (Some(magnitude), [lng, lat, rest @ ..]) = (feature.properties.mag, coords.as_slice()) else {
            warn!(source = %DataSource::Seismic, "skipping seismic feature without magnitude or coordinates");
            continue;
        };
        events.push(SeismicEvent {
            lat: *lat,
            lng: *lng,
            magnitude,
            depth_km: rest.first().copied().unwrap_or(0.0),
            place: feature
                .properties
                .place
                .unwrap_or_else(|| "Unknown location".to_string()),
            severity: severity_for_magnitude(magnitude),
        });
    }
    Ok(events)
}
