/// Region score staleness detection.
///
/// A region's score is refreshed once per reconciliation run (every 30
/// minutes by default). A score that has not moved for several intervals
/// usually means the weather feed is failing for that centroid, which is not
/// obvious from the risk map alone. The run summary reports how many regions
/// are stale so the gap shows up in logs.
///
/// # Clock injection
/// All functions accept a `now: DateTime<Utc>` parameter rather than calling
/// `Utc::now()` internally, so tests stay deterministic.

use chrono::{DateTime, Utc};

use crate::model::Region;

/// Returns `true` if the region was last scored more than `max_age_minutes`
/// before `now`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age_minutes  →  stale
///   age == max_age_minutes →  not stale
///
/// A region that has never been scored is stale.
pub fn is_stale_at(region: &Region, max_age_minutes: u64, now: DateTime<Utc>) -> bool {
    let Some(updated) = region.last_updated else {
        return true;
    };
    let age_minutes = (now - updated).num_minutes();
    // A timestamp in the future (clock skew) counts as fresh
    age_minutes > 0 && age_minutes as u64 > max_age_minutes
}

/// Convenience wrapper that uses the real current time.
pub fn is_stale(region: &Region, max_age_minutes: u64) -> bool {
    is_stale_at(region, max_age_minutes, Utc::now())
}

/// Regions whose score is older than the threshold, in input order.
pub fn stale_regions(regions: &[Region], max_age_minutes: u64, now: DateTime<Utc>) -> Vec<&Region> {
    regions
        .iter()
        .filter(|r| is_stale_at(r, max_age_minutes, now))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
