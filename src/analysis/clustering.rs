//! Grid clustering of satellite fire detections.
//!
//! Hotspots are bucketed into whole-degree cells. A cell with enough points
//! becomes one wildfire candidate located at the first point seen in that
//! cell. Adjacent cells are never merged, so a fire front straddling a cell
//! boundary can yield two candidates; the 1° wildfire dedup tolerance
//! usually folds them together on the next run.

use std::collections::BTreeMap;

use crate::analysis::dedup::{Candidate, is_duplicate, within_tolerance};
use crate::model::{FireHotspot, Incident, IncidentKind, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterPolicy {
    /// Minimum hotspots in a cell for it to count as a fire.
    pub min_points: usize,
    /// Point count at which a cluster is reported as high severity.
    pub high_severity_points: usize,
}

impl Default for ClusterPolicy {
    fn default() -> Self {
        Self {
            min_points: 3,
            high_severity_points: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotspotCluster {
    /// `(round(lat), round(lng))` of the member points.
    pub cell: (i32, i32),
    /// Members in input order.
    pub points: Vec<FireHotspot>,
    pub severity: Severity,
}

impl HotspotCluster {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Coordinates used for the incident: the first point of the cell.
    pub fn representative(&self) -> (f64, f64) {
        self.points
            .first()
            .map(|p| (p.lat, p.lng))
            .unwrap_or((self.cell.0 as f64, self.cell.1 as f64))
    }

    pub fn description(&self) -> String {
        format!("{} active fire hotspots detected via satellite.", self.len())
    }
}

/// Whole-degree cell for a point. `f64::round` rounds half away from zero.
pub fn grid_cell(lat: f64, lng: f64) -> (i32, i32) {
    (lat.round() as i32, lng.round() as i32)
}

/// Buckets hotspots into qualifying cells, returned in ascending cell order.
pub fn cluster_hotspots(hotspots: &[FireHotspot], policy: &ClusterPolicy) -> Vec<HotspotCluster> {
    if hotspots.len() < policy.min_points {
        return Vec::new();
    }

    let mut cells: BTreeMap<(i32, i32), Vec<FireHotspot>> = BTreeMap::new();
    for hotspot in hotspots {
        if !hotspot.lat.is_finite() || !hotspot.lng.is_finite() {
            continue;
        }
        cells
            .entry(grid_cell(hotspot.lat, hotspot.lng))
            .or_default()
            .push(hotspot.clone());
    }

    cells
        .into_iter()
        .filter(|(_, points)| points.len() >= policy.min_points)
        .map(|(cell, points)| {
            let severity = if points.len() >= policy.high_severity_points {
                Severity::High
            } else {
                Severity::Medium
            };
            HotspotCluster { cell, points, severity }
        })
        .collect()
}

/// Drops clusters that duplicate an active wildfire incident, or an earlier
/// cluster in the same batch.
pub fn propose_new(clusters: Vec<HotspotCluster>, existing: &[Incident], tolerance_deg: f64) -> Vec<HotspotCluster> {
    let mut accepted: Vec<HotspotCluster> = Vec::new();
    for cluster in clusters {
        let (lat, lng) = cluster.representative();
        let candidate = Candidate::new(IncidentKind::Wildfire, lat, lng);
        if is_duplicate(&candidate, existing, tolerance_deg) {
            continue;
        }
        let overlaps_accepted = accepted.iter().any(|other| {
            let (olat, olng) = other.representative();
            within_tolerance(lat, lng, olat, olng, tolerance_deg)
        });
        if !overlaps_accepted {
            accepted.push(cluster);
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IncidentSource, IncidentStatus};
    use chrono::Utc;

    fn scatter(count: usize, lat: f64, lng: f64) -> Vec<FireHotspot> {
        (0..count)
            .map(|i| FireHotspot::at(lat + i as f64 * 0.01, lng + i as f64 * 0.01))
            .collect()
    }

    fn wildfire(lat: f64, lng: f64) -> Incident {
        Incident {
            id: 7,
            kind: IncidentKind::Wildfire,
            severity: Severity::Medium,
            region_id: None,
            location: None,
            lat,
            lng,
            affected_people: 0,
            description: String::new(),
            source: IncidentSource::FireFeed,
            status: IncidentStatus::Active,
            reported_at: Utc::now(),
            resolved_at: None,
        }
    }

    #[test]
    fn test_five_points_make_one_medium_cluster() {
        let clusters = cluster_hotspots(&scatter(5, 1.0, 36.0), &ClusterPolicy::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].cell, (1, 36));
        assert_eq!(clusters[0].severity, Severity::Medium);
        assert_eq!(clusters[0].representative(), (1.0, 36.0));
        assert_eq!(
            clusters[0].description(),
            "5 active fire hotspots detected via satellite."
        );
    }

    #[test]
    fn test_twelve_points_make_high_cluster() {
        let clusters = cluster_hotspots(&scatter(12, 1.0, 36.0), &ClusterPolicy::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].severity, Severity::High);
        assert_eq!(clusters[0].len(), 12);
    }

    #[test]
    fn test_two_points_make_nothing() {
        assert!(cluster_hotspots(&scatter(2, 1.0, 36.0), &ClusterPolicy::default()).is_empty());
        assert!(cluster_hotspots(&[], &ClusterPolicy::default()).is_empty());
    }

    #[test]
    fn test_sparse_cells_are_dropped() {
        let mut hotspots = scatter(3, -1.0, 37.0);
        hotspots.extend(scatter(2, 2.0, 35.0));
        let clusters = cluster_hotspots(&hotspots, &ClusterPolicy::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].cell, (-1, 37));
    }

    #[test]
    fn test_half_degree_rounds_away_from_zero() {
        assert_eq!(grid_cell(0.5, 35.5), (1, 36));
        assert_eq!(grid_cell(-0.5, 35.49), (-1, 35));
    }

    #[test]
    fn test_clusters_come_back_in_cell_order() {
        let mut hotspots = scatter(3, 2.0, 35.0);
        hotspots.extend(scatter(3, -1.0, 37.0));
        let cells: Vec<_> = cluster_hotspots(&hotspots, &ClusterPolicy::default())
            .iter()
            .map(|c| c.cell)
            .collect();
        assert_eq!(cells, vec![(-1, 37), (2, 35)]);
    }

    #[test]
    fn test_non_finite_points_are_skipped() {
        let mut hotspots = scatter(2, 1.0, 36.0);
        hotspots.push(FireHotspot::at(f64::NAN, 36.0));
        assert!(cluster_hotspots(&hotspots, &ClusterPolicy::default()).is_empty());
    }

    #[test]
    fn test_propose_new_skips_known_fires() {
        let clusters = cluster_hotspots(&scatter(5, 1.0, 36.0), &ClusterPolicy::default());
        assert!(propose_new(clusters.clone(), &[wildfire(1.4, 36.6)], 1.0).is_empty());
        assert_eq!(propose_new(clusters, &[wildfire(3.0, 36.0)], 1.0).len(), 1);
    }

    #[test]
    fn test_propose_new_folds_adjacent_cells_in_one_batch() {
        // 0.4 and 0.6 fall in neighbouring cells but sit well inside 1°
        let mut hotspots = scatter(3, 0.4, 36.0);
        hotspots.extend(scatter(3, 0.6, 36.0));
        let clusters = cluster_hotspots(&hotspots, &ClusterPolicy::default());
        assert_eq!(clusters.len(), 2);
        assert_eq!(propose_new(clusters, &[], 1.0).len(), 1);
    }
}
