/// NASA FIRMS active-fire client.
///
/// Downloads the last day of detections inside the bounding box as CSV.
/// Columns differ between products (VIIRS reports `bright_ti4`, MODIS
/// reports `brightness`), so rows are decoded by header name.
///
/// API Documentation: https://firms.modaps.eosdis.nasa.gov/api/area/

use async_trait::async_trait;
use tracing::debug;

use super::{HotspotFeed, check_status};
use crate::config::{BoundingBox, FeedConfig};
use crate::logging::DataSource;
use crate::model::{FeedError, FireHotspot};

const LOOKBACK_DAYS: u8 = 1;

pub struct FirmsFeed {
    client: reqwest::Client,
    base_url: String,
    map_key: Option<String>,
    source: String,
    bbox: BoundingBox,
}

impl FirmsFeed {
    pub fn new(client: reqwest::Client, config: &FeedConfig) -> Self {
        Self {
            client,
            base_url: config.firms_base_url.trim_end_matches('/').to_string(),
            map_key: config.firms_map_key.clone(),
            source: config.firms_source.clone(),
            bbox: config.bbox,
        }
    }
}

#[async_trait]
impl HotspotFeed for FirmsFeed {
    async fn fetch_fire_hotspots(&self) -> Result<Vec<FireHotspot>, FeedError> {
        let Some(key) = self.map_key.as_deref() else {
            return Err(FeedError::NotConfigured("FIRMS_MAP_KEY".into()));
        };
        let url = format!(
            "{}/api/area/csv/{}/{}/{},{},{},{}/{}",
            self.base_url,
            key,
            self.source,
            self.bbox.west,
            self.bbox.south,
            self.bbox.east,
            self.bbox.north,
            LOOKBACK_DAYS
        );

        let response = self.client.get(&url).send().await?;
        let body = check_status(response)?.text().await?;
        let hotspots = parse_csv(&body)?;
        debug!(source = %DataSource::Firms, count = hotspots.len(), "fire hotspots fetched");
        Ok(hotspots)
    }
}

fn column(header: &[&str], names: &[&str]) -> Option<usize> {
    header.iter().position(|h| names.contains(&h.trim()))
}

/// Parse a FIRMS CSV body.
///
/// The provider answers some errors (bad key, bad product) with a 200 and a
/// plain-text line, which shows up here as a header with no latitude column.
pub fn parse_csv(body: &str) -> Result<Vec<FireHotspot>, FeedError> {
    let mut lines = body.lines().filter(|l| !l.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<&str> = header_line.split(',').collect();

    let lat_col = column(&header, &["latitude"])
        .ok_or_else(|| FeedError::Parse(format!("unexpected FIRMS header: {}", header_line.trim())))?;
    let lng_col = column(&header, &["longitude"])
        .ok_or_else(|| FeedError::Parse("FIRMS header has no longitude column".into()))?;
    let bright_col = column(&header, &["bright_ti4", "brightness"]);
    let conf_col = column(&header, &["confidence"]);
    let frp_col = column(&header, &["frp"]);
    let date_col = column(&header, &["acq_date"]);
    let time_col = column(&header, &["acq_time"]);

    let mut hotspots = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let number = |idx: Option<usize>| idx.and_then(|i| fields.get(i)).and_then(|s| s.parse::<f64>().ok());
        let text = |idx: Option<usize>| {
            idx.and_then(|i| fields.get(i))
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };

        let (Some(lat), Some(lng)) = (number(Some(lat_col)), number(Some(lng_col))) else {
            continue; // Skip rows without usable coordinates
        };

        let acquired = match (text(date_col), text(time_col)) {
            (Some(date), Some(time)) => Some(format!("{} {}", date, time)),
            (date, _) => date,
        };

        hotspots.push(FireHotspot {
            lat,
            lng,
            brightness: number(bright_col),
            confidence: text(conf_col),
            frp: number(frp_col),
            acquired,
        });
    }
    Ok(hotspots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_viirs_csv() {
        let csv = "latitude,longitude,bright_ti4,scan,track,acq_date,acq_time,satellite,instrument,confidence,version,bright_ti5,frp,daynight\n\
                   1.01,36.02,330.5,0.4,0.4,2024-05-01,1030,N,VIIRS,n,2.0NRT,290.1,5.2,D\n\
                   1.05,36.10,341.0,0.4,0.4,2024-05-01,1030,N,VIIRS,h,2.0NRT,291.4,12.8,D\n";
        let hotspots = parse_csv(csv).unwrap();
        assert_eq!(hotspots.len(), 2);
        assert_eq!(hotspots[0].lat, 1.01);
        assert_eq!(hotspots[0].lng, 36.02);
        assert_eq!(hotspots[0].brightness, Some(330.5));
        assert_eq!(hotspots[0].confidence.as_deref(), Some("n"));
        assert_eq!(hotspots[1].frp, Some(12.8));
        assert_eq!(hotspots[1].acquired.as_deref(), Some("2024-05-01 1030"));
    }

    #[test]
    fn test_parse_modis_csv_uses_brightness_column() {
        let csv = "latitude,longitude,brightness,acq_date,confidence,frp\n-0.5,35.2,318.2,2024-05-02,77,9.1\n";
        let hotspots = parse_csv(csv).unwrap();
        assert_eq!(hotspots[0].brightness, Some(318.2));
        assert_eq!(hotspots[0].confidence.as_deref(), Some("77"));
        assert_eq!(hotspots[0].acquired.as_deref(), Some("2024-05-02"));
    }

    #[test]
    fn test_rows_without_coordinates_are_skipped() {
        let csv = "latitude,longitude\n,36.0\n1.0,abc\n2.0,37.0\n";
        assert_eq!(parse_csv(csv).unwrap().len(), 1);
    }

    #[test]
    fn test_header_only_and_empty_bodies() {
        assert!(parse_csv("latitude,longitude,frp\n").unwrap().is_empty());
        assert!(parse_csv("").unwrap().is_empty());
    }

    #[test]
    fn test_error_text_is_parse_error() {
        assert!(matches!(parse_csv("Invalid MAP_KEY."), Err(FeedError::Parse(_))));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let client = reqwest::Client::new();
        let feed = FirmsFeed::new(client, &FeedConfig::default());
        assert!(matches!(
            feed.fetch_fire_hotspots().await,
            Err(FeedError::NotConfigured(_))
        ));
    }
}
