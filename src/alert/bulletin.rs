//! Generated operator and public text.
//!
//! - bilingual SMS alerts (English and Swahili) for an incident
//! - the national situation report
//! - replies for the administrator chat assistant
//!
//! All of them go through the text-generation backend. SMS text is cached by
//! an input fingerprint and has a template fallback, because an alert must
//! go out even when the backend is down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::cache::ResultCache;
use crate::generate::{GenerationError, TextGeneration, parse_structured};
use crate::logging::DataSource;
use crate::model::{Incident, IncidentKind};
use crate::store::SystemStats;

/// Hard per-message cap for a single SMS segment.
pub const SMS_MAX_CHARS: usize = 160;
pub const EMERGENCY_LINE: &str = "1199";

const MAX_REPORT_INCIDENTS: usize = 10;
const DEFAULT_REFUGE: &str = "nearest county offices";

pub const QUOTA_EXCEEDED_REPLY: &str = "**Text generation quota exceeded.** The assistant has used up its request \
allowance. Please wait a few minutes for the quota to reset and try again.";

/// SHA-256 over the parts, hex encoded. Parts are separated by a unit
/// separator so ("ab", "c") and ("a", "bc") differ.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}

/// Truncates to the SMS cap, marking the cut with "...".
pub fn cap_sms(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= SMS_MAX_CHARS {
        return text.to_string();
    }
    let kept: String = text.chars().take(SMS_MAX_CHARS - 3).collect();
    format!("{}...", kept)
}

// ---------------------------------------------------------------------------
// SMS alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmsBulletin {
    #[serde(default)]
    pub english: String,
    #[serde(default)]
    pub swahili: String,
}

impl SmsBulletin {
    fn is_complete(&self) -> bool {
        !self.english.trim().is_empty() && !self.swahili.trim().is_empty()
    }

    fn capped(self) -> Self {
        Self {
            english: cap_sms(&self.english),
            swahili: cap_sms(&self.swahili),
        }
    }
}

fn swahili_kind(kind: IncidentKind) -> &'static str {
    match kind {
        IncidentKind::Flood => "Mafuriko",
        IncidentKind::Drought => "Ukame",
        IncidentKind::Earthquake => "Tetemeko la ardhi",
        IncidentKind::Wildfire => "Moto wa nyika",
        IncidentKind::Landslide => "Maporomoko ya ardhi",
        IncidentKind::Storm => "Dhoruba",
    }
}

fn place_name<'a>(incident: &'a Incident, region: Option<&'a str>) -> &'a str {
    region
        .or(incident.location.as_deref())
        .unwrap_or("your area")
}

/// Fixed-wording alert used when generation is unavailable.
pub fn template_bulletin(incident: &Incident, region: Option<&str>, refuges: &[String]) -> SmsBulletin {
    let place = place_name(incident, region);
    let refuge = refuges.first().map(String::as_str).unwrap_or(DEFAULT_REFUGE);
    SmsBulletin {
        english: format!(
            "ALERT: {} {} in {}. Move to safety at {}. Emergency line: {}",
            incident.severity, incident.kind, place, refuge, EMERGENCY_LINE
        ),
        swahili: format!(
            "TAHADHARI: {} {}. Nenda mahali salama {}. Piga simu ya dharura: {}",
            swahili_kind(incident.kind),
            place,
            refuge,
            EMERGENCY_LINE
        ),
    }
    .capped()
}

fn sms_prompt(incident: &Incident, region: Option<&str>, refuges: &[String]) -> String {
    let refuge_names = if refuges.is_empty() {
        DEFAULT_REFUGE.to_string()
    } else {
        refuges.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
    };
    format!(
        "You are the national disaster management emergency communications system.\n\n\
         Write two SMS alerts for a disaster event, one English, one Swahili.\n\
         STRICT REQUIREMENT: Each message must be under 160 characters including spaces.\n\
         Include: alert keyword, disaster type, affected area, refuge location, emergency number.\n\n\
         Disaster:\n\
         - Type: {kind}\n\
         - Location: {place}\n\
         - Severity: {severity}\n\
         - People at risk: {affected}\n\
         - Nearest refuge: {refuge_names}\n\
         - Emergency line: {line}\n\n\
         Respond with ONLY valid JSON (no markdown):\n\
         {{\"english\": \"<message under 160 chars>\", \"swahili\": \"<message under 160 chars>\"}}",
        kind = incident.kind,
        place = place_name(incident, region),
        severity = incident.severity,
        affected = incident.affected_people,
        refuge_names = refuge_names,
        line = EMERGENCY_LINE,
    )
}

/// Cache key for an incident's SMS text. Changes whenever any input the
/// text depends on changes.
pub fn sms_cache_key(incident: &Incident, region: Option<&str>, refuges: &[String]) -> String {
    let affected = incident.affected_people.to_string();
    let mut parts = vec![
        incident.kind.as_str(),
        incident.severity.as_str(),
        place_name(incident, region),
        affected.as_str(),
        incident.description.as_str(),
    ];
    parts.extend(refuges.iter().map(String::as_str));
    format!("sms:{}", fingerprint(&parts))
}

/// Bilingual SMS for an incident, each message capped at 160 characters.
///
/// Served from the cache when the same inputs were seen before. Generated
/// text is cached only when both languages came back; otherwise the
/// template is returned and the next call tries the backend again.
pub async fn compose_sms(
    generator: &dyn TextGeneration,
    cache: &ResultCache,
    incident: &Incident,
    region: Option<&str>,
    refuges: &[String],
) -> SmsBulletin {
    let key = sms_cache_key(incident, region, refuges);
    match cache.get_as::<SmsBulletin>(&key).await {
        Ok(Some(cached)) => return cached,
        Ok(None) => {}
        Err(e) => warn!(source = %DataSource::Database, key, "SMS cache read failed: {}", e),
    }

    let generated = match generator.generate(&sms_prompt(incident, region, refuges)).await {
        Ok(text) => parse_structured::<SmsBulletin>(&text),
        Err(e) => {
            warn!(source = %DataSource::Generator, incident = incident.id, "SMS generation failed, using template: {}", e);
            return template_bulletin(incident, region, refuges);
        }
    };

    if !generated.is_complete() {
        warn!(source = %DataSource::Generator, incident = incident.id, "generated SMS incomplete, using template");
        return template_bulletin(incident, region, refuges);
    }

    let bulletin = generated.capped();
    if let Err(e) = cache.set_as(&key, &bulletin).await {
        warn!(source = %DataSource::Database, key, "SMS cache write failed: {}", e);
    }
    bulletin
}

// ---------------------------------------------------------------------------
// Situation report
// ---------------------------------------------------------------------------

/// Markdown situation report for senior officers. Only the first ten active
/// incidents are included in the prompt.
pub async fn situation_report(
    generator: &dyn TextGeneration,
    stats: &SystemStats,
    incidents: &[Incident],
    now: DateTime<Utc>,
) -> Result<String, GenerationError> {
    let active: Vec<&Incident> = incidents
        .iter()
        .filter(|i| i.is_active())
        .take(MAX_REPORT_INCIDENTS)
        .collect();
    let listing = serde_json::to_string_pretty(&active).unwrap_or_else(|_| "[]".to_string());

    let prompt = format!(
        "You are the national disaster operations centre reporting system.\n\
         Generate a formal Situation Report (SitRep) for senior officers.\n\n\
         Date: {date}\n\n\
         Current National Status:\n\
         - Active disaster incidents: {active}\n\
         - Total estimated affected population: {affected}\n\
         - Regions at elevated risk (score >= 70): {high_risk}\n\
         - Field responders deployed: {deployed}\n\
         - Field responders available for deployment: {available}\n\n\
         Active Incidents:\n{listing}\n\n\
         Write a professional markdown SitRep with these exact sections:\n\
         ## Executive Summary\n\
         ## Active Incidents\n\
         ## Resource & Personnel Status\n\
         ## Priority Actions (next 24 hours)\n\
         ## 72-Hour Outlook\n\n\
         Use ## headers. Be concise, factual, and action-oriented. Do not use placeholder text.",
        date = now.format("%d %B %Y, %H:%M UTC"),
        active = stats.active_incidents,
        affected = stats.total_affected,
        high_risk = stats.high_risk_regions,
        deployed = stats.deployed_responders,
        available = stats.available_responders,
        listing = listing,
    );
    generator.generate(&prompt).await
}

// ---------------------------------------------------------------------------
// Administrator chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
}

/// Reply to the last user message in `history`. Never fails: backend
/// problems come back as a readable message for the operator.
pub async fn chat_reply(generator: &dyn TextGeneration, history: &[ChatMessage], stats: &SystemStats) -> String {
    let transcript = history
        .iter()
        .map(|m| format!("{}: {}", m.role.to_uppercase(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "You are the disaster management system assistant, helping the system administrator \
         navigate the dashboard and manage incidents.\n\n\
         Current System Context:\n\
         - Active incidents: {active}\n\
         - Total affected: {affected}\n\
         - High risk regions: {high_risk}\n\
         - Responders: {deployed} deployed, {available} available\n\n\
         Conversation History:\n{transcript}\n\n\
         Respond to the final USER message. Be helpful, concise, and professional. \
         Use markdown sparingly. Do not invent statistics outside the context provided.",
        active = stats.active_incidents,
        affected = stats.total_affected,
        high_risk = stats.high_risk_regions,
        deployed = stats.deployed_responders,
        available = stats.available_responders,
        transcript = transcript,
    );

    match generator.generate(&prompt).await {
        Ok(reply) => reply,
        Err(e) if e.is_rate_limited() => QUOTA_EXCEEDED_REPLY.to_string(),
        Err(e) => {
            warn!(source = %DataSource::Generator, "chat reply failed: {}", e);
            format!("**Connection error:** the assistant backend could not be reached ({}).", e)
        }
    }
}
