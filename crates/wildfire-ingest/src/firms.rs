//! NASA FIRMS active fire ingestion.
//!
//! Fetches the area CSV product for a bounding box and day window, maps
//! categorical/numeric confidence values onto a 0-100 score, and drops rows
//! without usable coordinates.

use crate::{IngestError, Result};
use chrono::NaiveDate;
use risk_engine::{BoundingBox, FireDetection};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use ttl_cache::IngestionCache;

pub const FIRMS_BASE: &str = "https://firms.modaps.eosdis.nasa.gov/api/area/csv";
pub const DEFAULT_FIRE_SOURCE: &str = "VIIRS_NOAA20_NRT";

/// Fire detections stay fresh for 15 minutes.
pub const FIRE_CACHE_MAX_AGE: Duration = Duration::from_secs(15 * 60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// FIRMS area API client.
pub struct FirmsClient {
    client: reqwest::Client,
    api_key: Option<String>,
    cache: Arc<dyn IngestionCache>,
}

impl FirmsClient {
    /// Build a client. `api_key` comes from deployment configuration; with
    /// no key configured, fetches yield an empty detection list.
    pub fn new(api_key: Option<String>, cache: Arc<dyn IngestionCache>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            client,
            api_key,
            cache,
        }
    }

    fn cache_key(bbox: &BoundingBox, days: u32, source: &str) -> String {
        format!("firms_{source}_{days}_{bbox}").replace(',', "_")
    }

    /// Fetch detections for `bbox` over the trailing `days` window.
    ///
    /// `min_confidence` filters on the normalized score, keeping only rows
    /// that carry one.
    pub async fn fetch_fires(
        &self,
        bbox: &BoundingBox,
        days: u32,
        source: &str,
        min_confidence: Option<f64>,
    ) -> Result<Vec<FireDetection>> {
        let key = Self::cache_key(bbox, days, source);
        if let Some(cached) =
            ttl_cache::get_json::<Vec<FireDetection>>(&self.cache, &key, FIRE_CACHE_MAX_AGE).await?
        {
            debug!(%bbox, days, source, "fires served from cache");
            return Ok(filter_by_confidence(cached, min_confidence));
        }

        let Some(api_key) = &self.api_key else {
            warn!("no FIRMS api key configured; returning empty detection list");
            return Ok(Vec::new());
        };

        let url = format!("{FIRMS_BASE}/{api_key}/{source}/{bbox}/{days}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IngestError::upstream("firms", e))?;
        if !response.status().is_success() {
            return Err(IngestError::upstream(
                "firms",
                format!("status {}", response.status()),
            ));
        }
        let body = response
            .text()
            .await
            .map_err(|e| IngestError::upstream("firms", e))?;

        let points = parse_firms_csv(&body);
        info!(%bbox, days, source, count = points.len(), "fetched fire detections");

        ttl_cache::put_json(&self.cache, &key, &points).await?;
        Ok(filter_by_confidence(points, min_confidence))
    }
}

fn filter_by_confidence(
    points: Vec<FireDetection>,
    min_confidence: Option<f64>,
) -> Vec<FireDetection> {
    let Some(min) = min_confidence else {
        return points;
    };
    points
        .into_iter()
        .filter(|p| p.confidence_score.is_some_and(|s| s >= min))
        .collect()
}

fn column<'a>(row: &'a [&str], columns: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    columns
        .get(name)
        .and_then(|&i| row.get(i))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Parse the FIRMS area CSV. Rows without parseable lat/lon are dropped.
pub fn parse_firms_csv(body: &str) -> Vec<FireDetection> {
    let mut lines = body.lines();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let columns: HashMap<String, usize> = header
        .split(',')
        .enumerate()
        .map(|(i, name)| (name.trim().to_string(), i))
        .collect();

    let mut points = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let row: Vec<&str> = line.split(',').collect();

        let coords = column(&row, &columns, "latitude")
            .zip(column(&row, &columns, "longitude"))
            .and_then(|(lat, lon)| Some((lat.parse::<f64>().ok()?, lon.parse::<f64>().ok()?)));
        let Some((lat, lon)) = coords else {
            debug!("dropping detection row without coordinates");
            continue;
        };

        let confidence = column(&row, &columns, "confidence").map(str::to_string);
        let confidence_score = confidence.as_deref().and_then(confidence_score);
        let brightness = column(&row, &columns, "bright_ti4")
            .or_else(|| column(&row, &columns, "brightness"))
            .and_then(|v| v.parse::<f64>().ok());
        let acq_date = column(&row, &columns, "acq_date")
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
        let acq_time = column(&row, &columns, "acq_time").map(str::to_string);

        let id = column(&row, &columns, "track")
            .map(str::to_string)
            .or_else(|| acq_time.clone())
            .unwrap_or_else(|| format!("fire_{}", points.len()));

        points.push(FireDetection {
            id,
            lat,
            lon,
            brightness,
            confidence,
            confidence_score,
            acq_date,
            acq_time,
        });
    }
    points
}

/// Normalize a FIRMS confidence value to a 0-100 score.
///
/// Some products emit categorical labels instead of numbers.
pub fn confidence_score(raw: &str) -> Option<f64> {
    let raw = raw.trim().to_lowercase();
    if raw.is_empty() {
        return None;
    }
    match raw.as_str() {
        "l" | "low" => Some(30.0),
        "n" | "nominal" => Some(60.0),
        "h" | "high" => Some(90.0),
        other => other.parse::<f64>().ok().map(|v| v.clamp(0.0, 100.0)),
    }
}
