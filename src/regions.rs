/// Region registry for the hazard monitoring service.
///
/// Defines the canonical list of administrative regions (Kenya's 47
/// counties) scored by the reconciliation loop, along with their centroid
/// coordinates and the former province each belongs to. This is the single
/// source of truth for the fixed region set; storage is seeded from here at
/// start-up and never gains or loses regions afterwards.

use crate::model::Region;
use crate::store::{Store, StoreResult};

// ---------------------------------------------------------------------------
// Region metadata
// ---------------------------------------------------------------------------

/// Static metadata for one monitored region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionSeed {
    /// Official county code (1–47).
    pub code: u8,
    pub name: &'static str,
    /// Former province, used to group regions in reports.
    pub area: &'static str,
    /// WGS84 latitude of the approximate centroid.
    pub latitude: f64,
    /// WGS84 longitude of the approximate centroid.
    pub longitude: f64,
}

const fn seed(code: u8, name: &'static str, area: &'static str, latitude: f64, longitude: f64) -> RegionSeed {
    RegionSeed {
        code,
        name,
        area,
        latitude,
        longitude,
    }
}

/// All monitored regions, in official county-code order.
///
/// Centroids are approximate (±0.1°) and only used to request point weather
/// and to attach nearby incidents; they are not boundaries.
pub static REGION_REGISTRY: &[RegionSeed] = &[
    seed(1, "Mombasa", "Coast", -4.0435, 39.6682),
    seed(2, "Kwale", "Coast", -4.1816, 39.4606),
    seed(3, "Kilifi", "Coast", -3.5107, 39.9093),
    seed(4, "Tana River", "Coast", -1.6519, 39.6516),
    seed(5, "Lamu", "Coast", -2.2717, 40.9020),
    seed(6, "Taita-Taveta", "Coast", -3.3961, 38.5561),
    seed(7, "Garissa", "North Eastern", -0.4532, 39.6461),
    seed(8, "Wajir", "North Eastern", 1.7471, 40.0573),
    seed(9, "Mandera", "North Eastern", 3.9366, 41.8670),
    seed(10, "Marsabit", "Eastern", 2.3284, 37.9899),
    seed(11, "Isiolo", "Eastern", 0.3546, 37.5822),
    seed(12, "Meru", "Eastern", 0.0463, 37.6559),
    seed(13, "Tharaka-Nithi", "Eastern", -0.2965, 37.8849),
    seed(14, "Embu", "Eastern", -0.5310, 37.4506),
    seed(15, "Kitui", "Eastern", -1.3670, 38.0106),
    seed(16, "Machakos", "Eastern", -1.5177, 37.2634),
    seed(17, "Makueni", "Eastern", -1.8041, 37.6203),
    seed(18, "Nyandarua", "Central", -0.1804, 36.5230),
    seed(19, "Nyeri", "Central", -0.4167, 36.9500),
    seed(20, "Kirinyaga", "Central", -0.5590, 37.2833),
    seed(21, "Murang'a", "Central", -0.7839, 37.0400),
    seed(22, "Kiambu", "Central", -1.0314, 36.8681),
    seed(23, "Turkana", "Rift Valley", 3.3122, 35.5658),
    seed(24, "West Pokot", "Rift Valley", 1.6210, 35.3905),
    seed(25, "Samburu", "Rift Valley", 1.2155, 36.9541),
    seed(26, "Trans Nzoia", "Rift Valley", 1.0567, 34.9507),
    seed(27, "Uasin Gishu", "Rift Valley", 0.5143, 35.2698),
    seed(28, "Elgeyo-Marakwet", "Rift Valley", 0.7836, 35.5087),
    seed(29, "Nandi", "Rift Valley", 0.1836, 35.1269),
    seed(30, "Baringo", "Rift Valley", 0.4669, 35.9741),
    seed(31, "Laikipia", "Rift Valley", 0.3606, 36.7820),
    seed(32, "Nakuru", "Rift Valley", -0.3031, 36.0800),
    seed(33, "Narok", "Rift Valley", -1.0876, 35.8711),
    seed(34, "Kajiado", "Rift Valley", -2.0981, 36.7820),
    seed(35, "Kericho", "Rift Valley", -0.3689, 35.2863),
    seed(36, "Bomet", "Rift Valley", -0.7813, 35.3416),
    seed(37, "Kakamega", "Western", 0.2827, 34.7519),
    seed(38, "Vihiga", "Western", 0.0836, 34.7073),
    seed(39, "Bungoma", "Western", 0.5635, 34.5606),
    seed(40, "Busia", "Western", 0.4347, 34.2422),
    seed(41, "Siaya", "Nyanza", 0.0607, 34.2881),
    seed(42, "Kisumu", "Nyanza", -0.0917, 34.7680),
    seed(43, "Homa Bay", "Nyanza", -0.5273, 34.4571),
    seed(44, "Migori", "Nyanza", -1.0634, 34.4731),
    seed(45, "Kisii", "Nyanza", -0.6817, 34.7667),
    seed(46, "Nyamira", "Nyanza", -0.5669, 34.9341),
    seed(47, "Nairobi", "Nairobi", -1.2921, 36.8219),
];

/// Looks up a region by name (case-insensitive). Returns `None` if not found.
pub fn find_region(name: &str) -> Option<&'static RegionSeed> {
    REGION_REGISTRY.iter().find(|r| r.name.eq_ignore_ascii_case(name))
}

/// Returns the registry entries belonging to one former province.
pub fn regions_in_area(area: &str) -> Vec<&'static RegionSeed> {
    REGION_REGISTRY.iter().filter(|r| r.area == area).collect()
}

/// Finds the registry region whose centroid is nearest to a point, by
/// squared degree distance. Good enough to attribute an incident to a region.
pub fn nearest_region<'a>(regions: &'a [Region], lat: f64, lng: f64) -> Option<&'a Region> {
    regions.iter().min_by(|a, b| {
        let da = (a.lat - lat).powi(2) + (a.lng - lng).powi(2);
        let db = (b.lat - lat).powi(2) + (b.lng - lng).powi(2);
        da.total_cmp(&db)
    })
}

/// Seeds the store with the full registry. Idempotent: existing regions
/// (matched by name) keep their id and current score.
pub async fn seed_registry(store: &dyn Store) -> StoreResult<usize> {
    store.seed_regions(REGION_REGISTRY).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
