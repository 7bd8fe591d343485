//! Feed Verification Module
//!
//! Checks each configured feed once and reports which ones are reachable
//! and returning usable data. Run it (`hazmon --verify`) after changing
//! keys, base URLs or the bounding box, before trusting the scheduler.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ingest::FeedSet;
use crate::logging::DataSource;
use crate::model::FeedError;
use crate::regions::RegionSeed;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub weather_results: Vec<WeatherVerification>,
    pub seismic: FeedVerification,
    pub hotspots: FeedVerification,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub weather_total: usize,
    pub weather_working: usize,
    pub weather_failed: usize,
    pub feeds_working: usize,
    pub feeds_failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherVerification {
    pub region: String,
    pub status: VerificationStatus,
    pub rainfall_mm: Option<f64>,
    pub temp_c: Option<f64>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedVerification {
    pub source: String,
    pub status: VerificationStatus,
    pub sample_data_count: usize,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    /// Reachable, but the answer was empty or missing fields.
    PartialSuccess,
    Failed,
}

impl VerificationStatus {
    fn is_working(self) -> bool {
        self != VerificationStatus::Failed
    }
}

fn count_result<T>(source: DataSource, result: Result<Vec<T>, FeedError>) -> FeedVerification {
    match result {
        Ok(items) => FeedVerification {
            source: source.to_string(),
            status: if items.is_empty() {
                VerificationStatus::PartialSuccess
            } else {
                VerificationStatus::Success
            },
            sample_data_count: items.len(),
            error_message: None,
        },
        Err(e) => FeedVerification {
            source: source.to_string(),
            status: VerificationStatus::Failed,
            sample_data_count: 0,
            error_message: Some(e.to_string()),
        },
    }
}

// ============================================================================
// Verification
// ============================================================================

/// Query the weather feed at each sample region and the seismic and hotspot
/// feeds once each.
pub async fn verify_feeds(feeds: &FeedSet, sample_regions: &[RegionSeed]) -> VerificationReport {
    let mut summary = VerificationSummary {
        weather_total: sample_regions.len(),
        ..Default::default()
    };

    let mut weather_results = Vec::with_capacity(sample_regions.len());
    for region in sample_regions {
        let result = match feeds
            .weather
            .fetch_weather(region.name, region.latitude, region.longitude)
            .await
        {
            Ok(obs) => WeatherVerification {
                region: region.name.to_string(),
                status: if obs.rainfall_mm.is_some() && obs.temp_c.is_some() {
                    VerificationStatus::Success
                } else {
                    VerificationStatus::PartialSuccess
                },
                rainfall_mm: obs.rainfall_mm,
                temp_c: obs.temp_c,
                error_message: None,
            },
            Err(e) => WeatherVerification {
                region: region.name.to_string(),
                status: VerificationStatus::Failed,
                rainfall_mm: None,
                temp_c: None,
                error_message: Some(e.to_string()),
            },
        };
        if result.status.is_working() {
            summary.weather_working += 1;
        } else {
            summary.weather_failed += 1;
        }
        weather_results.push(result);
    }

    let seismic = count_result(DataSource::Seismic, feeds.seismic.fetch_seismic_events().await);
    let hotspots = count_result(DataSource::Firms, feeds.hotspots.fetch_fire_hotspots().await);
    for feed in [&seismic, &hotspots] {
        if feed.status.is_working() {
            summary.feeds_working += 1;
        } else {
            summary.feeds_failed += 1;
        }
    }

    VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        weather_results,
        seismic,
        hotspots,
        summary,
    }
}

pub fn print_summary(report: &VerificationReport) {
    println!("==============================================================");
    println!("FEED VERIFICATION SUMMARY ({})", report.timestamp);
    println!("==============================================================");
    println!();
    println!(
        "Weather (regions): {}/{} working  ({} failed)",
        report.summary.weather_working, report.summary.weather_total, report.summary.weather_failed
    );
    for feed in [&report.seismic, &report.hotspots] {
        match feed.status {
            VerificationStatus::Success => {
                println!("{:<18} OK ({} records)", feed.source, feed.sample_data_count)
            }
            VerificationStatus::PartialSuccess => println!("{:<18} Responsive but no data", feed.source),
            VerificationStatus::Failed => println!(
                "{:<18} FAILED: {}",
                feed.source,
                feed.error_message.as_deref().unwrap_or("Unknown")
            ),
        }
    }
    println!("==============================================================");
}
