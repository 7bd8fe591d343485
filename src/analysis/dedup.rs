//! Spatial deduplication of auto-generated incidents.
//!
//! Feeds report the same physical event on every poll. Before an incident is
//! created it is compared against the active incidents of the same kind; a
//! match inside the per-kind box tolerance means the event is already on
//! record.

use crate::model::{Incident, IncidentKind};

/// Slack absorbed on the tolerance comparison so that a point exactly on the
/// box edge (0.1 apart in decimal) is not lost to binary rounding.
const EDGE_EPSILON: f64 = 1e-9;

/// A prospective incident location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub kind: IncidentKind,
    pub lat: f64,
    pub lng: f64,
}

impl Candidate {
    pub fn new(kind: IncidentKind, lat: f64, lng: f64) -> Self {
        Self { kind, lat, lng }
    }
}

/// Per-kind box half-widths in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub earthquake: f64,
    pub wildfire: f64,
    pub default: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            earthquake: 0.1,
            wildfire: 1.0,
            default: 0.1,
        }
    }
}

impl Tolerances {
    pub fn for_kind(&self, kind: IncidentKind) -> f64 {
        match kind {
            IncidentKind::Earthquake => self.earthquake,
            IncidentKind::Wildfire => self.wildfire,
            _ => self.default,
        }
    }
}

/// Box test: both axes within `tolerance_deg`.
pub fn within_tolerance(lat_a: f64, lng_a: f64, lat_b: f64, lng_b: f64, tolerance_deg: f64) -> bool {
    (lat_a - lat_b).abs() <= tolerance_deg + EDGE_EPSILON
        && (lng_a - lng_b).abs() <= tolerance_deg + EDGE_EPSILON
}

/// True iff an active incident of the candidate's kind lies inside the box.
///
/// `existing` may hold any mix of kinds and statuses; only active incidents
/// of the same kind count.
pub fn is_duplicate(candidate: &Candidate, existing: &[Incident], tolerance_deg: f64) -> bool {
    existing.iter().any(|incident| {
        incident.kind == candidate.kind
            && incident.is_active()
            && within_tolerance(candidate.lat, candidate.lng, incident.lat, incident.lng, tolerance_deg)
    })
}
