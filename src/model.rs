/// Core data types for the hazard monitoring service.
///
/// This module defines the shared domain model imported by all other modules:
/// the persisted records (regions, incidents, responders, notifications,
/// cache entries), the normalized feed observations, and the error types for
/// each external boundary. It contains no I/O.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Risk score
// ---------------------------------------------------------------------------

/// A region's disaster risk, always within 0..=100.
///
/// The only ways to build one clamp their input, so a `RiskScore` that made
/// it into storage is in range by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
pub struct RiskScore(u8);

impl RiskScore {
    pub const MIN: RiskScore = RiskScore(0);
    pub const MAX: RiskScore = RiskScore(100);

    /// Clamps a raw score into range, truncating the fractional part.
    /// NaN is treated as zero; infinities clamp to the nearest bound.
    pub fn clamped(raw: f64) -> Self {
        if raw.is_nan() {
            return Self::MIN;
        }
        RiskScore(raw.clamp(0.0, 100.0) as u8)
    }

    pub fn from_i64(raw: i64) -> Self {
        RiskScore(raw.clamp(0, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl From<u8> for RiskScore {
    fn from(raw: u8) -> Self {
        RiskScore(raw.min(100))
    }
}

impl From<RiskScore> for u8 {
    fn from(score: RiskScore) -> Self {
        score.0
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Text-backed enums
// ---------------------------------------------------------------------------

/// A stored enum column held a value this build does not know about.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownValue {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

/// Category of a recorded disaster event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncidentKind {
    Flood,
    Drought,
    Earthquake,
    Wildfire,
    Landslide,
    Storm,
}

impl IncidentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentKind::Flood => "Flood",
            IncidentKind::Drought => "Drought",
            IncidentKind::Earthquake => "Earthquake",
            IncidentKind::Wildfire => "Wildfire",
            IncidentKind::Landslide => "Landslide",
            IncidentKind::Storm => "Storm",
        }
    }
}

impl FromStr for IncidentKind {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Flood" => Ok(IncidentKind::Flood),
            "Drought" => Ok(IncidentKind::Drought),
            "Earthquake" => Ok(IncidentKind::Earthquake),
            "Wildfire" => Ok(IncidentKind::Wildfire),
            "Landslide" => Ok(IncidentKind::Landslide),
            "Storm" => Ok(IncidentKind::Storm),
            other => Err(UnknownValue::new("incident kind", other)),
        }
    }
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident severity, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

impl FromStr for Severity {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Severity::Low),
            "Medium" => Ok(Severity::Medium),
            "High" => Ok(Severity::High),
            other => Err(UnknownValue::new("severity", other)),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an incident record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IncidentSource {
    Manual,
    SeismicFeed,
    FireFeed,
}

impl IncidentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentSource::Manual => "manual",
            IncidentSource::SeismicFeed => "seismic-feed",
            IncidentSource::FireFeed => "fire-feed",
        }
    }
}

impl FromStr for IncidentSource {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(IncidentSource::Manual),
            "seismic-feed" => Ok(IncidentSource::SeismicFeed),
            "fire-feed" => Ok(IncidentSource::FireFeed),
            other => Err(UnknownValue::new("incident source", other)),
        }
    }
}

impl fmt::Display for IncidentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Active,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Active => "active",
            IncidentStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for IncidentStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(IncidentStatus::Active),
            "resolved" => Ok(IncidentStatus::Resolved),
            other => Err(UnknownValue::new("incident status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponderStatus {
    Available,
    Deployed,
}

impl ResponderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponderStatus::Available => "available",
            ResponderStatus::Deployed => "deployed",
        }
    }
}

impl FromStr for ResponderStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(ResponderStatus::Available),
            "deployed" => Ok(ResponderStatus::Deployed),
            other => Err(UnknownValue::new("responder status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Sent,
    Partial,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Sent => "sent",
            NotificationStatus::Partial => "partial",
            NotificationStatus::Failed => "failed",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(NotificationStatus::Sent),
            "partial" => Ok(NotificationStatus::Partial),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(UnknownValue::new("notification status", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// An administrative area monitored for disaster risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: i64,
    pub name: String,
    /// Administrative grouping the region belongs to (former province).
    pub area: String,
    pub lat: f64,
    pub lng: f64,
    pub risk_score: RiskScore,
    /// `None` until the reconciliation loop scores the region for the first time.
    pub last_updated: Option<DateTime<Utc>>,
}

/// A recorded disaster event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub kind: IncidentKind,
    pub severity: Severity,
    pub region_id: Option<i64>,
    pub location: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub affected_people: u64,
    pub description: String,
    pub source: IncidentSource,
    pub status: IncidentStatus,
    pub reported_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Incident {
    pub fn is_active(&self) -> bool {
        self.status == IncidentStatus::Active
    }
}

/// Fields supplied when creating an incident. Identity, status and
/// `reported_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIncident {
    pub kind: IncidentKind,
    pub severity: Severity,
    pub region_id: Option<i64>,
    pub location: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub affected_people: u64,
    pub description: String,
    pub source: IncidentSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Responder {
    pub id: i64,
    pub name: String,
    pub role: String,
    pub phone: String,
    pub region_id: Option<i64>,
    pub status: ResponderStatus,
    pub current_incident_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewResponder {
    pub name: String,
    pub role: String,
    pub phone: String,
    pub region_id: Option<i64>,
}

/// A shelter or camp that alerts direct people to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefugeSite {
    pub id: i64,
    pub name: String,
    pub region_id: Option<i64>,
    pub lat: f64,
    pub lng: f64,
    /// People the site can hold.
    pub capacity: u32,
    /// "Camp", "School", "Church"...
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRefugeSite {
    pub name: String,
    pub region_id: Option<i64>,
    pub lat: f64,
    pub lng: f64,
    pub capacity: u32,
    pub kind: String,
}

/// One entry in the append-only log of alerts sent for an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub incident_id: i64,
    pub message_en: String,
    pub message_sw: String,
    pub recipients_count: u32,
    pub sent_at: DateTime<Utc>,
    pub status: NotificationStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub incident_id: i64,
    pub message_en: String,
    pub message_sw: String,
    pub recipients_count: u32,
    pub status: NotificationStatus,
}

/// A memoized derived result keyed by a caller-built fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    /// Serialized JSON, opaque to the store.
    pub value: String,
    pub generated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Feed observations
// ---------------------------------------------------------------------------

/// Neutral rainfall used when a weather provider omits the field.
pub const NEUTRAL_RAINFALL_MM: f64 = 0.0;

/// Neutral air temperature used when a weather provider omits the field.
pub const NEUTRAL_TEMP_C: f64 = 25.0;

/// Current weather at a region centroid.
///
/// Either field may be missing from the provider response; scoring treats
/// missing values as neutral rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub rainfall_mm: Option<f64>,
    pub temp_c: Option<f64>,
}

impl WeatherObservation {
    pub fn new(rainfall_mm: f64, temp_c: f64) -> Self {
        Self {
            rainfall_mm: Some(rainfall_mm),
            temp_c: Some(temp_c),
        }
    }

    pub fn rainfall_or_neutral(&self) -> f64 {
        self.rainfall_mm
            .filter(|v| v.is_finite())
            .unwrap_or(NEUTRAL_RAINFALL_MM)
    }

    pub fn temp_or_neutral(&self) -> f64 {
        self.temp_c.filter(|v| v.is_finite()).unwrap_or(NEUTRAL_TEMP_C)
    }
}

/// Day-by-day forecast at a point, today first. Either series may be
/// shorter than requested or hold gaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub precipitation_mm: Vec<Option<f64>>,
    pub temp_max_c: Vec<Option<f64>>,
}

impl DailyForecast {
    /// Precipitation summed over the first `days` days; gaps count as dry.
    pub fn rainfall_over(&self, days: usize) -> f64 {
        self.precipitation_mm
            .iter()
            .take(days)
            .flatten()
            .filter(|v| v.is_finite())
            .sum()
    }

    /// Hottest daily maximum over the first `days` days, or the neutral
    /// temperature when no day has a value.
    pub fn max_temp_over(&self, days: usize) -> f64 {
        self.temp_max_c
            .iter()
            .take(days)
            .flatten()
            .copied()
            .filter(|v| v.is_finite())
            .reduce(f64::max)
            .unwrap_or(NEUTRAL_TEMP_C)
    }

    /// Today's values as a single observation.
    pub fn today(&self) -> WeatherObservation {
        WeatherObservation {
            rainfall_mm: self.precipitation_mm.first().copied().flatten(),
            temp_c: self.temp_max_c.first().copied().flatten(),
        }
    }
}

/// A single earthquake reported by the seismic feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeismicEvent {
    pub lat: f64,
    pub lng: f64,
    pub magnitude: f64,
    pub depth_km: f64,
    pub place: String,
    pub severity: Severity,
}

/// Maps an earthquake magnitude onto incident severity.
///
///   M >= 6.0 → High, M >= 4.5 → Medium, otherwise Low
pub fn severity_for_magnitude(magnitude: f64) -> Severity {
    if magnitude >= 6.0 {
        Severity::High
    } else if magnitude >= 4.5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// A satellite fire detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireHotspot {
    pub lat: f64,
    pub lng: f64,
    /// Brightness temperature (Kelvin), when reported.
    pub brightness: Option<f64>,
    /// Provider confidence flag ("l", "n", "h" for VIIRS).
    pub confidence: Option<String>,
    /// Fire radiative power (MW), when reported.
    pub frp: Option<f64>,
    /// Acquisition date and time as reported ("2024-05-01 1030").
    pub acquired: Option<String>,
}

impl FireHotspot {
    pub fn at(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            brightness: None,
            confidence: None,
            frp: None,
            acquired: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when fetching or decoding an external feed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeedError {
    /// Non-2xx HTTP response from the provider.
    #[error("HTTP error: {0}")]
    Http(u16),
    /// Connection failure, DNS failure or timeout.
    #[error("Network error: {0}")]
    Network(String),
    /// The response body could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),
    /// The response decoded but held no usable values.
    #[error("No data: {0}")]
    NoData(String),
    /// A required key or setting is missing, so the feed was not called.
    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            FeedError::Http(status.as_u16())
        } else if err.is_decode() {
            FeedError::Parse(err.to_string())
        } else {
            FeedError::Network(err.to_string())
        }
    }
}

/// Errors surfaced by a record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] postgres::Error),
    /// A row held a value that does not map onto the domain model.
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    /// The connection worker is gone; every later call fails the same way.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<UnknownValue> for StoreError {
    fn from(err: UnknownValue) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
