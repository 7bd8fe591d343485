//! Service configuration.
//!
//! Settings are read from a TOML file (`hazmon.toml` by default). Every field
//! has a default, so a missing section or an empty file yields a working
//! configuration. Secrets never live in the file: they are read from the
//! environment (after `.env` is loaded by the binary) through
//! [`Config::apply_env`].

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::analysis::clustering::ClusterPolicy;
use crate::analysis::dedup::Tolerances;
use crate::analysis::scoring::GenerationPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Replace live feeds with canned fixtures and use the in-memory store.
    pub dev_mode: bool,
    /// Degrees of latitude added to every dev-mode fixture coordinate.
    pub dev_drift_deg: f64,
    pub database_url: Option<String>,
    pub scheduler: SchedulerConfig,
    pub thresholds: ThresholdConfig,
    pub scoring: ScoringConfig,
    pub feeds: FeedConfig,
    pub generator: GeneratorConfig,
    pub sms: SmsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_minutes: u64,
    /// Regions scored between rate-limit pauses.
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    /// A region not rescored within this many minutes is reported as stale.
    pub stale_after_minutes: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            batch_size: 10,
            batch_pause_ms: 1_000,
            stale_after_minutes: 90,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

/// Incident-creation policy constants. Their values are domain policy, so
/// they are configuration rather than code.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub min_quake_magnitude: f64,
    pub quake_tolerance_deg: f64,
    pub wildfire_tolerance_deg: f64,
    pub default_tolerance_deg: f64,
    pub min_cluster_points: usize,
    pub high_severity_points: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_quake_magnitude: 3.5,
            quake_tolerance_deg: 0.1,
            wildfire_tolerance_deg: 1.0,
            default_tolerance_deg: 0.1,
            min_cluster_points: 3,
            high_severity_points: 10,
        }
    }
}

impl ThresholdConfig {
    pub fn tolerances(&self) -> Tolerances {
        Tolerances {
            earthquake: self.quake_tolerance_deg,
            wildfire: self.wildfire_tolerance_deg,
            default: self.default_tolerance_deg,
        }
    }

    pub fn cluster_policy(&self) -> ClusterPolicy {
        ClusterPolicy {
            min_points: self.min_cluster_points,
            high_severity_points: self.high_severity_points,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Whether the scoring job may call the text-generation backend.
    pub generation: GenerationPolicy,
    /// Upper bound of the smoothing jitter; 0 makes scores deterministic.
    pub max_jitter: u8,
    /// Fixed seed for the jitter source, for reproducible audits.
    pub jitter_seed: Option<u64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            generation: GenerationPolicy::Never,
            max_jitter: 15,
            jitter_seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub weather_base_url: String,
    pub seismic_base_url: String,
    pub firms_base_url: String,
    pub firms_map_key: Option<String>,
    /// FIRMS product, e.g. VIIRS_SNPP_NRT.
    pub firms_source: String,
    /// Seismic look-back window.
    pub seismic_window_hours: i64,
    /// Smallest magnitude requested from the seismic provider.
    pub seismic_min_magnitude: f64,
    pub bbox: BoundingBox,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            weather_base_url: "https://api.open-meteo.com".to_string(),
            seismic_base_url: "https://earthquake.usgs.gov".to_string(),
            firms_base_url: "https://firms.modaps.eosdis.nasa.gov".to_string(),
            firms_map_key: None,
            firms_source: "VIIRS_SNPP_NRT".to_string(),
            seismic_window_hours: 24,
            seismic_min_magnitude: 2.5,
            bbox: BoundingBox::default(),
            timeout_secs: 20,
        }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Geographic window queried from the seismic and fire providers.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Default for BoundingBox {
    /// Kenya plus a small margin.
    fn default() -> Self {
        Self {
            west: 33.5,
            south: -5.0,
            east: 42.5,
            north: 5.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
    /// Wait before the single retry after a rate-limit response.
    pub retry_delay_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            temperature: 0.3,
            max_output_tokens: 1024,
            timeout_secs: 60,
            retry_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub username: String,
    pub api_key: Option<String>,
    pub sender_id: String,
    /// Country calling code used to rewrite local numbers (07…, 01…).
    pub country_code: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            username: "sandbox".to_string(),
            api_key: None,
            sender_id: "NDMA-KE".to_string(),
            country_code: "254".to_string(),
        }
    }
}

impl SmsConfig {
    pub fn is_sandbox(&self) -> bool {
        self.username == "sandbox"
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `HAZMON_LOG`/`RUST_LOG` are unset.
    pub level: String,
    pub json: bool,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Fill secrets from the environment. `lookup` is normally
    /// `|k| std::env::var(k).ok()`; tests pass a map instead.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = non_empty("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.generator.api_key = Some(key);
        }
        if let Some(key) = non_empty("FIRMS_MAP_KEY") {
            self.feeds.firms_map_key = Some(key);
        }
        if let Some(user) = non_empty("AFRICASTALKING_USERNAME") {
            self.sms.username = user;
        }
        if let Some(key) = non_empty("AFRICASTALKING_API_KEY") {
            self.sms.api_key = Some(key);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.interval_minutes == 0 {
            return Err(ConfigError::Invalid("scheduler.interval_minutes must be > 0".into()));
        }
        if self.scheduler.batch_size == 0 {
            return Err(ConfigError::Invalid("scheduler.batch_size must be > 0".into()));
        }
        if self.thresholds.min_cluster_points == 0 {
            return Err(ConfigError::Invalid("thresholds.min_cluster_points must be > 0".into()));
        }
        if !(self.dev_drift_deg.is_finite() && self.dev_drift_deg.abs() <= 1.0) {
            return Err(ConfigError::Invalid("dev_drift_deg must be within [-1, 1]".into()));
        }
        let t = &self.thresholds;
        for (name, value) in [
            ("quake_tolerance_deg", t.quake_tolerance_deg),
            ("wildfire_tolerance_deg", t.wildfire_tolerance_deg),
            ("default_tolerance_deg", t.default_tolerance_deg),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Invalid(format!("thresholds.{} must be >= 0", name)));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_yields_documented_defaults() {
        let config = Config::from_toml_str("").expect("empty config should parse");
        assert_eq!(config.scheduler.interval_minutes, 30);
        assert_eq!(config.scheduler.batch_size, 10);
        assert_eq!(config.scheduler.batch_pause(), Duration::from_secs(1));
        assert_eq!(config.thresholds.min_quake_magnitude, 3.5);
        assert_eq!(config.thresholds.min_cluster_points, 3);
        assert_eq!(config.thresholds.high_severity_points, 10);
        assert_eq!(config.scoring.generation, GenerationPolicy::Never);
        assert_eq!(config.generator.retry_delay_secs, 5);
        assert!(!config.dev_mode);
        assert_eq!(config.dev_drift_deg, 0.0);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            dev_mode = true

            [scheduler]
            interval_minutes = 5

            [thresholds]
            wildfire_tolerance_deg = 0.5

            [scoring]
            generation = "allowed"
            max_jitter = 0
            "#,
        )
        .expect("config should parse");

        assert!(config.dev_mode);
        assert_eq!(config.scheduler.interval(), Duration::from_secs(300));
        assert_eq!(config.scheduler.batch_size, 10);
        assert_eq!(config.thresholds.tolerances().wildfire, 0.5);
        assert_eq!(config.thresholds.tolerances().earthquake, 0.1);
        assert_eq!(config.scoring.generation, GenerationPolicy::Allowed);
        assert_eq!(config.scoring.max_jitter, 0);
    }

    #[test]
    fn test_dev_drift_is_read_and_bounded() {
        let config = Config::from_toml_str("dev_mode = true\ndev_drift_deg = 0.05\n").unwrap();
        assert_eq!(config.dev_drift_deg, 0.05);

        let result = Config::from_toml_str("dev_drift_deg = 3.0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let result = Config::from_toml_str("[scheduler]\ninterval_minutes = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_negative_tolerance_is_rejected() {
        let result = Config::from_toml_str("[thresholds]\nquake_tolerance_deg = -0.1\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let result = Config::from_toml_str("[scheduler\ninterval_minutes = 5");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_supplies_secrets_and_ignores_blank_values() {
        let env: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgres://hazmon@localhost/hazmon"),
            ("GEMINI_API_KEY", "  abc123  "),
            ("FIRMS_MAP_KEY", ""),
            ("AFRICASTALKING_USERNAME", "ndma"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database_url.as_deref(), Some("postgres://hazmon@localhost/hazmon"));
        assert_eq!(config.generator.api_key.as_deref(), Some("abc123"));
        assert!(config.feeds.firms_map_key.is_none(), "blank key must not count as configured");
        assert_eq!(config.sms.username, "ndma");
        assert!(!config.sms.is_sandbox());
        assert!(config.sms.api_key.is_none());
    }
}
