//! Open-Meteo point-forecast provider (free, no API key).
//!
//! Takes the first `min(horizon_hours, available)` hourly samples and
//! averages them: arithmetic means for temperature, humidity, and wind
//! speed, circular mean for wind direction.

use super::{
    circular_mean_deg, mean, WeatherProvider, DEFAULT_HUMIDITY_PCT, DEFAULT_TEMPERATURE_C,
    DEFAULT_WIND_SPEED_KMH,
};
use crate::{IngestError, Result};
use async_trait::async_trait;
use risk_engine::WeatherSummary;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    hourly: HourlyBlock,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct HourlyBlock {
    #[serde(default)]
    pub temperature_2m: Vec<f64>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<f64>,
    #[serde(default)]
    pub wind_speed_10m: Vec<f64>,
    #[serde(default)]
    pub wind_direction_10m: Vec<f64>,
}

/// Aggregate the leading `horizon_hours` samples of each hourly series.
pub(crate) fn summarize_hourly(hourly: &HourlyBlock, horizon_hours: u32) -> WeatherSummary {
    let take = |values: &[f64]| -> Vec<f64> {
        values[..values.len().min(horizon_hours as usize)].to_vec()
    };

    let temps = take(&hourly.temperature_2m);
    let humidity = take(&hourly.relative_humidity_2m);
    let wind_speed = take(&hourly.wind_speed_10m);
    let wind_dir = take(&hourly.wind_direction_10m);

    WeatherSummary {
        temperature_c: mean(&temps).unwrap_or(DEFAULT_TEMPERATURE_C),
        humidity_pct: mean(&humidity).unwrap_or(DEFAULT_HUMIDITY_PCT),
        wind_speed_kmh: mean(&wind_speed).unwrap_or(DEFAULT_WIND_SPEED_KMH),
        wind_direction_deg: circular_mean_deg(&wind_dir),
        source: "openmeteo".to_string(),
    }
}

/// Hourly forecast client.
pub struct OpenMeteoProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteoProvider {
    pub fn new() -> Self {
        Self::with_base_url(FORECAST_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl Default for OpenMeteoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn name(&self) -> &str {
        "openmeteo"
    }

    async fn fetch_summary(
        &self,
        lat: f64,
        lon: f64,
        horizon_hours: u32,
    ) -> Result<WeatherSummary> {
        let url = format!(
            "{}?latitude={lat}&longitude={lon}\
             &hourly=temperature_2m,relative_humidity_2m,wind_speed_10m,wind_direction_10m\
             &forecast_days=2",
            self.base_url
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IngestError::upstream("openmeteo", e))?;
        if !response.status().is_success() {
            return Err(IngestError::upstream(
                "openmeteo",
                format!("status {}", response.status()),
            ));
        }
        let data: ForecastResponse = response
            .json()
            .await
            .map_err(|e| IngestError::upstream("openmeteo", e))?;

        debug!(
            lat,
            lon,
            samples = data.hourly.temperature_2m.len(),
            "openmeteo hourly forecast fetched"
        );
        Ok(summarize_hourly(&data.hourly, horizon_hours))
    }
}
