/// Structured logging for the hazard monitoring service
///
/// Installs the `tracing` subscriber and provides context-rich helpers that
/// tag every event with its data source and, where relevant, the unit of
/// work (region name, event place). Supports console output and file-based
/// logging for daemon operations.

use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::model::FeedError;

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Weather,
    Seismic,
    Firms,
    Database,
    Generator,
    Sms,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Weather => write!(f, "WEATHER"),
            DataSource::Seismic => write!(f, "SEISMIC"),
            DataSource::Firms => write!(f, "FIRMS"),
            DataSource::Database => write!(f, "DB"),
            DataSource::Generator => write!(f, "GEN"),
            DataSource::Sms => write!(f, "SMS"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - feed deliberately not configured, or nothing to report
    Expected,
    /// Unexpected failure - indicates service degradation or an API change
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify a feed failure so transient noise does not page anyone.
pub fn classify_feed_failure(err: &FeedError) -> FailureType {
    match err {
        FeedError::NotConfigured(_) => FailureType::Expected,
        // Provider had nothing for this location right now
        FeedError::NoData(_) => FailureType::Unknown,
        // 5xx and 429 are provider-side and usually clear on the next run
        FeedError::Http(code) if *code == 429 || *code >= 500 => FailureType::Unknown,
        FeedError::Http(_) => FailureType::Unexpected,
        // Parse errors suggest API changes or bugs
        FeedError::Parse(_) => FailureType::Unexpected,
        FeedError::Network(msg) if msg.contains("timed out") || msg.contains("timeout") => {
            FailureType::Unknown
        }
        FeedError::Network(_) => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Subscriber Setup
// ---------------------------------------------------------------------------

/// Install the global subscriber.
///
/// The filter comes from `HAZMON_LOG`, then `RUST_LOG`, then the configured
/// level. When `file` is set, events are appended there instead of stderr.
/// Calling this twice is harmless; the second call keeps the first subscriber.
pub fn init_logging(config: &LoggingConfig) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_env("HAZMON_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let result = match (&config.file, config.json) {
        (Some(path), json) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
            if json {
                builder.json().try_init()
            } else {
                builder.try_init()
            }
        }
        (None, true) => builder.json().try_init(),
        (None, false) => builder.try_init(),
    };

    if result.is_err() {
        debug!("tracing subscriber already installed");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a feed failure with automatic classification.
///
/// `unit` names the unit of work that failed (a region, a provider call).
pub fn log_feed_failure(source: DataSource, unit: Option<&str>, operation: &str, err: &FeedError) {
    let failure_type = classify_feed_failure(err);
    let unit = unit.unwrap_or("-");

    match failure_type {
        FailureType::Expected => {
            debug!(source = %source, unit, failure = %failure_type, "{} skipped: {}", operation, err)
        }
        FailureType::Unexpected => {
            error!(source = %source, unit, failure = %failure_type, "{} failed: {}", operation, err)
        }
        FailureType::Unknown => {
            warn!(source = %source, unit, failure = %failure_type, "{} failed: {}", operation, err)
        }
    }
}

// ---------------------------------------------------------------------------
// Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a batch of independent units of work.
pub fn log_phase_summary(source: DataSource, phase: &str, total: usize, successful: usize, failed: usize) {
    if failed == 0 {
        info!(source = %source, total, successful, failed, "{} complete: {}/{} successful", phase, successful, total);
    } else if successful == 0 {
        error!(source = %source, total, successful, failed, "{} complete: {}/{} successful, {} failed", phase, successful, total, failed);
    } else {
        warn!(source = %source, total, successful, failed, "{} complete: {}/{} successful, {} failed", phase, successful, total, failed);
    }
}
