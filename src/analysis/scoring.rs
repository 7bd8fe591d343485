//! Region risk scoring.
//!
//! The reconciliation loop scores every region on every run through the
//! [`RiskScorer`] trait. The default strategy is the closed-form
//! [`FallbackScorer`]; [`GenerativeScorer`] asks the text-generation backend
//! for the same output shape and drops back to the formula whenever the
//! backend is disallowed, unavailable, or returns something unusable.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::generate::{TextGeneration, parse_structured};
use crate::model::{IncidentKind, RiskScore, WeatherObservation};

/// Rainfall above which a region is flagged for flooding.
pub const FLOOD_RAINFALL_MM: f64 = 20.0;
/// Drought needs both heat above this and rainfall below `DROUGHT_RAINFALL_MM`.
pub const DROUGHT_TEMP_C: f64 = 36.0;
pub const DROUGHT_RAINFALL_MM: f64 = 2.0;
/// Temperature above which heat starts contributing to the score.
pub const HEAT_BASELINE_C: f64 = 32.0;

const RAINFALL_WEIGHT: f64 = 2.5;
const HEAT_WEIGHT: f64 = 1.5;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Whether a non-interactive job may spend text-generation quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationPolicy {
    #[default]
    Never,
    Allowed,
}

/// Best-guess threat category for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisasterType {
    Flood,
    Drought,
    None,
}

impl DisasterType {
    pub fn incident_kind(&self) -> Option<IncidentKind> {
        match self {
            DisasterType::Flood => Some(IncidentKind::Flood),
            DisasterType::Drought => Some(IncidentKind::Drought),
            DisasterType::None => None,
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "flood" => Some(DisasterType::Flood),
            "drought" => Some(DisasterType::Drought),
            "none" | "" => Some(DisasterType::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Confidence::Low),
            "medium" => Some(Confidence::Medium),
            "high" => Some(Confidence::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: RiskScore,
    pub disaster_type: DisasterType,
    pub confidence: Confidence,
    pub reasoning: String,
}

// ---------------------------------------------------------------------------
// Formula
// ---------------------------------------------------------------------------

/// Threat category from rainfall and temperature. Flood is checked first, so
/// a hot, very wet day is a flood risk.
pub fn classify(weather: &WeatherObservation) -> DisasterType {
    let rainfall = weather.rainfall_or_neutral();
    let temp = weather.temp_or_neutral();
    if rainfall > FLOOD_RAINFALL_MM {
        DisasterType::Flood
    } else if temp > DROUGHT_TEMP_C && rainfall < DROUGHT_RAINFALL_MM {
        DisasterType::Drought
    } else {
        DisasterType::None
    }
}

/// The unclamped score before jitter:
///   rainfall_mm * 2.5 + max(0, temp_c - 32) * 1.5
pub fn raw_score(weather: &WeatherObservation) -> f64 {
    let rainfall = weather.rainfall_or_neutral();
    let heat = (weather.temp_or_neutral() - HEAT_BASELINE_C).max(0.0);
    rainfall * RAINFALL_WEIGHT + heat * HEAT_WEIGHT
}

/// Scores one observation with an explicit jitter value.
pub fn assess_with_jitter(weather: &WeatherObservation, jitter: u8) -> RiskAssessment {
    RiskAssessment {
        risk_score: RiskScore::clamped(raw_score(weather) + jitter as f64),
        disaster_type: classify(weather),
        confidence: Confidence::Low,
        reasoning: format!(
            "Auto-calculated from rainfall={:.1}mm, temp={:.1}°C.",
            weather.rainfall_or_neutral(),
            weather.temp_or_neutral()
        ),
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// A region scoring strategy. Infallible: implementations must degrade to a
/// usable assessment rather than error.
#[async_trait]
pub trait RiskScorer: Send + Sync {
    async fn score(&self, region: &str, weather: &WeatherObservation) -> RiskAssessment;
}

/// The closed-form scorer.
///
/// Adds a small random smoothing term in `0..=max_jitter` so regions with
/// identical inputs do not tie exactly on the risk map. The jitter only moves
/// the score; the threat category is reproducible. Set `max_jitter` to 0, or
/// give a seed, when scores must be reproducible for audit.
pub struct FallbackScorer {
    max_jitter: u8,
    rng: Mutex<StdRng>,
}

impl FallbackScorer {
    pub fn new(max_jitter: u8, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            max_jitter,
            rng: Mutex::new(rng),
        }
    }

    /// No jitter at all.
    pub fn deterministic() -> Self {
        Self::new(0, Some(0))
    }

    fn next_jitter(&self) -> u8 {
        if self.max_jitter == 0 {
            return 0;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.random_range(0..=self.max_jitter),
            // A poisoned lock only means another thread panicked mid-draw
            Err(poisoned) => poisoned.into_inner().random_range(0..=self.max_jitter),
        }
    }

    pub fn assess(&self, weather: &WeatherObservation) -> RiskAssessment {
        assess_with_jitter(weather, self.next_jitter())
    }
}

#[async_trait]
impl RiskScorer for FallbackScorer {
    async fn score(&self, _region: &str, weather: &WeatherObservation) -> RiskAssessment {
        self.assess(weather)
    }
}

/// Shape requested from the text-generation backend. Every field is
/// optional so partial answers can still be salvaged.
#[derive(Debug, Default, Deserialize)]
struct GeneratedAssessment {
    risk_score: Option<f64>,
    disaster_type: Option<String>,
    confidence: Option<String>,
    reasoning: Option<String>,
}

/// Scores through the text-generation backend when policy allows it.
pub struct GenerativeScorer {
    generator: Arc<dyn TextGeneration>,
    fallback: FallbackScorer,
    policy: GenerationPolicy,
}

impl GenerativeScorer {
    pub fn new(generator: Arc<dyn TextGeneration>, fallback: FallbackScorer, policy: GenerationPolicy) -> Self {
        Self {
            generator,
            fallback,
            policy,
        }
    }

    fn prompt(region: &str, weather: &WeatherObservation) -> String {
        format!(
            "You are a disaster risk analyst for the national disaster management authority.\n\
             Assess the disaster risk for {region} County from current weather.\n\
             - Rainfall (24h): {rain:.1} mm\n\
             - Max temperature: {temp:.1} °C\n\n\
             Respond with ONLY valid JSON (no markdown):\n\
             {{\"risk_score\": <0-100>, \"disaster_type\": \"Flood|Drought|None\", \
             \"confidence\": \"Low|Medium|High\", \"reasoning\": \"<one sentence>\"}}",
            region = region,
            rain = weather.rainfall_or_neutral(),
            temp = weather.temp_or_neutral(),
        )
    }
}

#[async_trait]
impl RiskScorer for GenerativeScorer {
    async fn score(&self, region: &str, weather: &WeatherObservation) -> RiskAssessment {
        if self.policy == GenerationPolicy::Never {
            return self.fallback.assess(weather);
        }

        let text = match self.generator.generate(&Self::prompt(region, weather)).await {
            Ok(text) => text,
            Err(e) => {
                warn!(region, "generative scoring unavailable, using formula: {}", e);
                return self.fallback.assess(weather);
            }
        };

        let generated: GeneratedAssessment = parse_structured(&text);
        let Some(score) = generated.risk_score else {
            debug!(region, "generated assessment had no risk_score, using formula");
            return self.fallback.assess(weather);
        };

        RiskAssessment {
            risk_score: RiskScore::clamped(score),
            disaster_type: generated
                .disaster_type
                .as_deref()
                .and_then(DisasterType::from_label)
                .unwrap_or_else(|| classify(weather)),
            confidence: generated
                .confidence
                .as_deref()
                .and_then(Confidence::from_label)
                .unwrap_or(Confidence::Medium),
            reasoning: generated.reasoning.unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::GenerationError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedGenerator {
        reply: Result<String, GenerationError>,
        calls: AtomicUsize,
    }

    impl CannedGenerator {
        fn new(reply: Result<String, GenerationError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TextGeneration for CannedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    // --- Formula ------------------------------------------------------------

    #[test]
    fn test_score_is_clamped_for_extreme_inputs() {
        let scorer = FallbackScorer::new(15, None);
        for (rain, temp) in [
            (0.0, -40.0),
            (500.0, 60.0),
            (-30.0, 25.0),
            (1e9, 1e9),
            (f64::NAN, f64::NAN),
        ] {
            for _ in 0..20 {
                let score = scorer.assess(&WeatherObservation::new(rain, temp)).risk_score.value();
                assert!(score <= 100, "score {} out of range for ({}, {})", score, rain, temp);
            }
        }
        assert_eq!(
            scorer.assess(&WeatherObservation::new(500.0, 60.0)).risk_score,
            RiskScore::MAX
        );
    }

    #[test]
    fn test_overflowing_rainfall_scores_maximum() {
        // f64::MAX * 2.5 overflows to +inf before clamping
        let deluge = WeatherObservation::new(f64::MAX, 25.0);
        assert!(raw_score(&deluge).is_infinite());

        let assessment = FallbackScorer::deterministic().assess(&deluge);
        assert_eq!(assessment.risk_score, RiskScore::MAX, "an infinite score must clamp to 100, not 0");
        assert_eq!(assessment.disaster_type, DisasterType::Flood);
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let scorer = FallbackScorer::new(15, Some(7));
        let calm = WeatherObservation::new(0.0, 20.0);
        for _ in 0..200 {
            assert!(scorer.assess(&calm).risk_score.value() <= 15);
        }
    }

    #[test]
    fn test_seeded_jitter_is_reproducible() {
        let a = FallbackScorer::new(15, Some(42));
        let b = FallbackScorer::new(15, Some(42));
        let weather = WeatherObservation::new(8.0, 30.0);
        let scores_a: Vec<_> = (0..10).map(|_| a.assess(&weather).risk_score).collect();
        let scores_b: Vec<_> = (0..10).map(|_| b.assess(&weather).risk_score).collect();
        assert_eq!(scores_a, scores_b);
    }

    #[test]
    fn test_disaster_type_is_reproducible_despite_jitter() {
        let scorer = FallbackScorer::new(15, None);
        let weather = WeatherObservation::new(1.0, 38.0);
        for _ in 0..50 {
            assert_eq!(scorer.assess(&weather).disaster_type, DisasterType::Drought);
        }
    }

    #[test]
    fn test_classification_order() {
        // Flood wins even when drought heat conditions also hold
        assert_eq!(classify(&WeatherObservation::new(30.0, 38.0)), DisasterType::Flood);
        assert_eq!(classify(&WeatherObservation::new(1.9, 36.1)), DisasterType::Drought);
        // Boundaries are strict
        assert_eq!(classify(&WeatherObservation::new(20.0, 25.0)), DisasterType::None);
        assert_eq!(classify(&WeatherObservation::new(2.0, 40.0)), DisasterType::None);
        assert_eq!(classify(&WeatherObservation::new(0.0, 36.0)), DisasterType::None);
    }

    #[test]
    fn test_missing_fields_score_as_neutral() {
        let assessment = FallbackScorer::deterministic().assess(&WeatherObservation::default());
        assert_eq!(assessment.risk_score.value(), 0);
        assert_eq!(assessment.disaster_type, DisasterType::None);
        assert_eq!(assessment.confidence, Confidence::Low);
    }

    #[test]
    fn test_heat_only_counts_above_baseline() {
        assert_eq!(raw_score(&WeatherObservation::new(0.0, 32.0)), 0.0);
        assert_eq!(raw_score(&WeatherObservation::new(0.0, 34.0)), 3.0);
        assert_eq!(raw_score(&WeatherObservation::new(4.0, 20.0)), 10.0);
    }

    #[tokio::test]
    async fn test_turkana_heavy_rain_scores_as_flood() {
        let scorer = FallbackScorer::new(15, None);
        let assessment = scorer.score("Turkana", &WeatherObservation::new(30.0, 38.0)).await;
        // 30 * 2.5 = 75, plus 6 * 1.5 = 9 of heat, plus jitter
        assert!(assessment.risk_score.value() >= 84);
        assert_eq!(assessment.disaster_type, DisasterType::Flood);
        assert_eq!(assessment.disaster_type.incident_kind(), Some(IncidentKind::Flood));
    }

    // --- Generative strategy ------------------------------------------------

    #[tokio::test]
    async fn test_never_policy_does_not_call_backend() {
        let generator = CannedGenerator::new(Ok("{\"risk_score\": 99}".into()));
        let scorer = GenerativeScorer::new(
            generator.clone(),
            FallbackScorer::deterministic(),
            GenerationPolicy::Never,
        );
        let assessment = scorer.score("Kisumu", &WeatherObservation::new(4.0, 20.0)).await;
        assert_eq!(assessment.risk_score.value(), 10);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_allowed_policy_uses_generated_answer() {
        let generator = CannedGenerator::new(Ok(
            "```json\n{\"risk_score\": 140, \"disaster_type\": \"Drought\", \"confidence\": \"high\", \"reasoning\": \"Dry spell\",}\n```"
                .into(),
        ));
        let scorer = GenerativeScorer::new(
            generator.clone(),
            FallbackScorer::deterministic(),
            GenerationPolicy::Allowed,
        );
        let assessment = scorer.score("Wajir", &WeatherObservation::new(0.0, 39.0)).await;
        assert_eq!(assessment.risk_score, RiskScore::MAX);
        assert_eq!(assessment.disaster_type, DisasterType::Drought);
        assert_eq!(assessment.confidence, Confidence::High);
        assert_eq!(assessment.reasoning, "Dry spell");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backend_error_falls_back_to_formula() {
        let generator = CannedGenerator::new(Err(GenerationError::RateLimited("429".into())));
        let scorer = GenerativeScorer::new(
            generator,
            FallbackScorer::deterministic(),
            GenerationPolicy::Allowed,
        );
        let assessment = scorer.score("Turkana", &WeatherObservation::new(30.0, 38.0)).await;
        assert_eq!(assessment.risk_score.value(), 84);
        assert_eq!(assessment.confidence, Confidence::Low);
    }

    #[tokio::test]
    async fn test_unparsable_answer_falls_back_to_formula() {
        let generator = CannedGenerator::new(Ok("I think the risk is high.".into()));
        let scorer = GenerativeScorer::new(
            generator,
            FallbackScorer::deterministic(),
            GenerationPolicy::Allowed,
        );
        let assessment = scorer.score("Lamu", &WeatherObservation::new(22.0, 30.0)).await;
        assert_eq!(assessment.risk_score.value(), 55);
        assert_eq!(assessment.disaster_type, DisasterType::Flood);
    }
}
