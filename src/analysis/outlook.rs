//! 72-hour threat outlook.
//!
//! A rule-based read of each region's three-day forecast: heavy cumulative
//! rain is an early flood warning, a hot dry spell an early drought watch.
//! Only the first few regions are assessed, matching the batch the forecast
//! provider is asked about per run.

use serde::Serialize;

use crate::model::{DailyForecast, IncidentKind, Severity};

/// Forecast days considered.
pub const OUTLOOK_DAYS: u8 = 3;
/// Regions assessed per outlook, in registry order.
pub const MAX_OUTLOOK_REGIONS: usize = 20;

/// Three-day rainfall (mm) above which a flood is expected.
pub const FLOOD_WATCH_MM: f64 = 25.0;
/// Three-day rainfall (mm) above which a flood is rated high likelihood.
pub const FLOOD_LIKELY_MM: f64 = 50.0;
/// Three-day maximum temperature (C) above which a dry spell is a drought risk.
pub const DROUGHT_WATCH_TEMP_C: f64 = 35.0;
/// Three-day rainfall (mm) below which a hot spell counts as dry.
pub const DROUGHT_WATCH_RAINFALL_MM: f64 = 2.0;

const FLOOD_ACTION: &str = "Issue advanced flood warning to riverine communities.";
const DROUGHT_ACTION: &str = "Monitor water sources and escalate tracking.";

/// A region with its fetched multi-day forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionForecast {
    pub region: String,
    pub forecast: DailyForecast,
}

/// An expected threat for one region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreatOutlook {
    pub region: String,
    pub threat: IncidentKind,
    /// Medium or High.
    pub likelihood: Severity,
    /// Hours until the threat is expected to materialise.
    pub within_hours: u32,
    pub rainfall_mm: f64,
    pub max_temp_c: f64,
    pub recommended_action: String,
}

/// Outlook for one region, or `None` when the forecast looks benign.
///
/// Flood takes precedence: a region is only checked for drought when its
/// rainfall is below the flood watch level.
pub fn outlook_for(region: &str, forecast: &DailyForecast) -> Option<ThreatOutlook> {
    let days = OUTLOOK_DAYS as usize;
    let rainfall_mm = forecast.rainfall_over(days);
    let max_temp_c = forecast.max_temp_over(days);

    let (threat, likelihood, within_hours, action) = if rainfall_mm > FLOOD_WATCH_MM {
        let likelihood = if rainfall_mm > FLOOD_LIKELY_MM {
            Severity::High
        } else {
            Severity::Medium
        };
        (IncidentKind::Flood, likelihood, 48, FLOOD_ACTION)
    } else if max_temp_c > DROUGHT_WATCH_TEMP_C && rainfall_mm < DROUGHT_WATCH_RAINFALL_MM {
        (IncidentKind::Drought, Severity::Medium, 72, DROUGHT_ACTION)
    } else {
        return None;
    };

    Some(ThreatOutlook {
        region: region.to_string(),
        threat,
        likelihood,
        within_hours,
        rainfall_mm,
        max_temp_c,
        recommended_action: action.to_string(),
    })
}

/// Outlooks for the first [`MAX_OUTLOOK_REGIONS`] forecasts, in input order.
pub fn predict_72h(forecasts: &[RegionForecast]) -> Vec<ThreatOutlook> {
    forecasts
        .iter()
        .take(MAX_OUTLOOK_REGIONS)
        .filter_map(|rf| outlook_for(&rf.region, &rf.forecast))
        .collect()
}
