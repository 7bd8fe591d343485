/// Open-Meteo forecast client.
///
/// Requests daily precipitation sums and maximum 2 m temperatures at a
/// point, in the Africa/Nairobi day: today only for scoring, a few days
/// ahead for the outlook. No API key is needed.
///
/// API Documentation: https://open-meteo.com/en/docs

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{WeatherFeed, check_status};
use crate::config::FeedConfig;
use crate::logging::DataSource;
use crate::model::{DailyForecast, FeedError, WeatherObservation};

#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    pub daily: Option<DailyBlock>,
}

#[derive(Debug, Deserialize)]
pub struct DailyBlock {
    #[serde(default)]
    pub precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    pub temperature_2m_max: Vec<Option<f64>>,
}

pub struct OpenMeteoFeed {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteoFeed {
    pub fn new(client: reqwest::Client, config: &FeedConfig) -> Self {
        Self {
            client,
            base_url: config.weather_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn request_daily(&self, lat: f64, lng: f64, days: u8) -> Result<String, FeedError> {
        let url = format!("{}/v1/forecast", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", format!("{:.4}", lat)),
                ("longitude", format!("{:.4}", lng)),
                ("daily", "precipitation_sum,temperature_2m_max".to_string()),
                ("timezone", "Africa/Nairobi".to_string()),
                ("forecast_days", days.max(1).to_string()),
            ])
            .send()
            .await?;
        Ok(check_status(response)?.text().await?)
    }
}

#[async_trait]
impl WeatherFeed for OpenMeteoFeed {
    async fn fetch_weather(&self, region: &str, lat: f64, lng: f64) -> Result<WeatherObservation, FeedError> {
        let body = self.request_daily(lat, lng, 1).await?;
        let observation = parse_forecast(&body)?;
        debug!(
            source = %DataSource::Weather,
            region,
            rainfall_mm = ?observation.rainfall_mm,
            temp_c = ?observation.temp_c,
            "weather fetched"
        );
        Ok(observation)
    }

    async fn fetch_forecast(&self, region: &str, lat: f64, lng: f64, days: u8) -> Result<DailyForecast, FeedError> {
        let body = self.request_daily(lat, lng, days).await?;
        let forecast = parse_daily(&body)?;
        debug!(
            source = %DataSource::Weather,
            region,
            days = forecast.precipitation_mm.len(),
            "forecast fetched"
        );
        Ok(forecast)
    }
}

/// Decodes every day of a forecast body. A body with no daily block at
/// all is reported as `NoData`.
pub fn parse_daily(body: &str) -> Result<DailyForecast, FeedError> {
    let response: ForecastResponse =
        serde_json::from_str(body).map_err(|e| FeedError::Parse(e.to_string()))?;
    let daily = response
        .daily
        .ok_or_else(|| FeedError::NoData("forecast has no daily block".into()))?;

    Ok(DailyForecast {
        precipitation_mm: daily.precipitation_sum,
        temp_max_c: daily.temperature_2m_max,
    })
}

/// Decodes today's values. Missing or null values stay `None` so scoring
/// can substitute neutral inputs.
pub fn parse_forecast(body: &str) -> Result<WeatherObservation, FeedError> {
    parse_daily(body).map(|forecast| forecast.today())
}
