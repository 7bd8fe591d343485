//! Risk band thresholds.
//!
//! Region scores are reported to operators as bands rather than raw
//! numbers. "High risk" in dashboards and situation reports means the High
//! band or above.

use std::fmt;

use serde::Serialize;

use crate::model::RiskScore;

pub const MODERATE_FROM: u8 = 40;
pub const HIGH_FROM: u8 = 70;
pub const CRITICAL_FROM: u8 = 85;

/// Risk bands, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskBand {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskBand {
    pub fn for_score(score: RiskScore) -> Self {
        match score.value() {
            v if v >= CRITICAL_FROM => RiskBand::Critical,
            v if v >= HIGH_FROM => RiskBand::High,
            v if v >= MODERATE_FROM => RiskBand::Moderate,
            _ => RiskBand::Low,
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskBand::Low => "Low",
            RiskBand::Moderate => "Moderate",
            RiskBand::High => "High",
            RiskBand::Critical => "Critical",
        };
        f.write_str(label)
    }
}

pub fn is_high_risk(score: RiskScore) -> bool {
    RiskBand::for_score(score) >= RiskBand::High
}
