//! Bulk SMS delivery.
//!
//! [`AfricasTalkingGateway`] posts to the Africa's Talking messaging API.
//! Sending never returns an error: the outcome, including transport failure,
//! is carried in the [`DeliveryReport`] so callers can record it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SmsConfig;
use crate::logging::DataSource;

const LIVE_URL: &str = "https://api.africastalking.com/version1/messaging";
const SANDBOX_URL: &str = "https://api.sandbox.africastalking.com/version1/messaging";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub sent: u32,
    pub failed: u32,
    /// Delivered through the sandbox account; no handset received anything.
    pub sandbox: bool,
    /// No API key: the send was only logged.
    pub mock: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, recipients: &[String], message: &str) -> DeliveryReport;
}

/// Rewrites a local number to E.164 for the given country code.
///
///   "0712 345 678" → "+254712345678"
///   "254712345678" → "+254712345678"
///
/// Returns `None` for blank input. Anything else is passed through with
/// spaces removed.
pub fn normalize_msisdn(raw: &str, country_code: &str) -> Option<String> {
    let number: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if number.is_empty() {
        return None;
    }
    if number.starts_with("07") || number.starts_with("01") {
        Some(format!("+{}{}", country_code, &number[1..]))
    } else if number.starts_with(country_code) {
        Some(format!("+{}", number))
    } else {
        Some(number)
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(rename = "SMSMessageData")]
    data: MessageData,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    #[serde(rename = "Recipients", default)]
    recipients: Vec<RecipientStatus>,
}

#[derive(Debug, Deserialize)]
struct RecipientStatus {
    status: String,
}

/// Counts recipients the provider accepted.
pub fn count_accepted(body: &str) -> Result<u32, serde_json::Error> {
    let response: SendResponse = serde_json::from_str(body)?;
    Ok(response
        .data
        .recipients
        .iter()
        .filter(|r| r.status == "Success")
        .count() as u32)
}

pub struct AfricasTalkingGateway {
    client: reqwest::Client,
    config: SmsConfig,
}

impl AfricasTalkingGateway {
    pub fn new(client: reqwest::Client, config: SmsConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self) -> &'static str {
        if self.config.is_sandbox() { SANDBOX_URL } else { LIVE_URL }
    }
}

#[async_trait]
impl SmsGateway for AfricasTalkingGateway {
    async fn send(&self, recipients: &[String], message: &str) -> DeliveryReport {
        let sandbox = self.config.is_sandbox();
        let numbers: Vec<String> = recipients
            .iter()
            .filter_map(|r| normalize_msisdn(r, &self.config.country_code))
            .collect();

        if numbers.is_empty() {
            return DeliveryReport {
                sandbox: true,
                error: Some("No recipients".into()),
                ..Default::default()
            };
        }
        let total = numbers.len() as u32;

        let Some(api_key) = self.config.api_key.as_deref() else {
            info!(source = %DataSource::Sms, count = total, "no SMS API key, message logged but not sent");
            return DeliveryReport {
                sent: total,
                sandbox: true,
                mock: true,
                ..Default::default()
            };
        };

        let to = numbers.join(",");
        let form = [
            ("username", self.config.username.as_str()),
            ("to", to.as_str()),
            ("message", message),
            ("from", self.config.sender_id.as_str()),
        ];

        let result = self
            .client
            .post(self.endpoint())
            .header("apiKey", api_key)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await;

        let failure = |error: String| {
            warn!(source = %DataSource::Sms, "SMS send failed: {}", error);
            DeliveryReport {
                failed: total,
                sandbox,
                error: Some(error),
                ..Default::default()
            }
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => return failure(e.to_string()),
        };
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return failure(e.to_string()),
        };
        if !status.is_success() {
            return failure(format!("HTTP {}: {}", status.as_u16(), body.trim()));
        }

        match count_accepted(&body) {
            Ok(sent) => {
                let sent = sent.min(total);
                info!(
                    source = %DataSource::Sms,
                    sent,
                    failed = total - sent,
                    mode = if sandbox { "sandbox" } else { "live" },
                    "SMS batch delivered"
                );
                DeliveryReport {
                    sent,
                    failed: total - sent,
                    sandbox,
                    ..Default::default()
                }
            }
            Err(e) => failure(format!("unreadable provider response: {}", e)),
        }
    }
}
