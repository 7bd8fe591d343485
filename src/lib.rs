//! Hazard monitoring service.
//!
//! Periodically scores every monitored region for flood and drought risk
//! from weather data, and turns seismic and satellite fire feeds into
//! deduplicated incidents. Bilingual SMS alerts, situation reports and the
//! operator chat assistant sit on top of the same records.

pub mod alert;
pub mod analysis;
pub mod cache;
pub mod config;
pub mod dev_mode;
pub mod generate;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod regions;
pub mod scheduler;
pub mod store;
pub mod verify;
