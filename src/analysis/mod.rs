/// Pure analysis for the hazard monitoring service.
///
/// Nothing in here performs I/O: each function takes observations and, where
/// needed, the relevant slice of stored state, and returns a decision. The
/// reconciliation loop in `scheduler` does the fetching and persisting.
///
/// Submodules:
/// - `scoring`: weather observation → region risk score and threat category.
/// - `dedup`: is a candidate incident already recorded nearby?
/// - `clustering`: groups fire hotspots into incident-sized clusters.
/// - `outlook`: three-day forecast → expected flood or drought.

pub mod clustering;
pub mod dedup;
pub mod outlook;
pub mod scoring;
