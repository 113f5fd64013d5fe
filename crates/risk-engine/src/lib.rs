//! Wildfire Risk Engine
//!
//! Scores discrete infrastructure assets (substations, hospitals, water
//! facilities, major roads) against active fire detections and a weather
//! summary, then derives second-order cascade consequences: which downstream
//! facilities a high-risk substation would take out, and which roads are
//! rendered impassable by fire proximity.
//!
//! # Scoring Model
//!
//! ```text
//! linear = bias + a_dist*(5.0 - dist_km) + a_wind*wind_kmh*alignment - a_hum*humidity
//! risk   = sigmoid(linear)
//! ```
//!
//! | Feature   | Effect                                              |
//! |-----------|-----------------------------------------------------|
//! | dist_km   | Risk grows as distance shrinks below a 5 km reference |
//! | alignment | Wind toward the asset raises risk, away lowers it   |
//! | humidity  | Suppresses risk                                     |
//!
//! All entities are request-scoped value objects: ingestion constructs them,
//! the scorer and cascade analyzer consume them read-only, and nothing is
//! persisted across requests.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod cascade;
pub mod scorer;

pub use cascade::{
    compute_cascade_impacts, CascadeCard, CascadeConfig, CascadeImpact, CompromisedRoad,
    ImpactedFacility,
};
pub use scorer::{score_asset, score_assets, RiskConfig};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid bounding box '{0}': expected west,south,east,north")]
    InvalidBoundingBox(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Infrastructure asset categories tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Substation,
    PowerLine,
    Hospital,
    WaterFacility,
    MajorRoad,
}

impl AssetType {
    /// Label used when an upstream record carries no name.
    pub fn label(&self) -> &'static str {
        match self {
            AssetType::Substation => "substation",
            AssetType::PowerLine => "power_line",
            AssetType::Hospital => "hospital",
            AssetType::WaterFacility => "water_facility",
            AssetType::MajorRoad => "major_road",
        }
    }
}

/// A single satellite fire detection, immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FireDetection {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    /// Raw upstream confidence value (categorical or numeric).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    /// Confidence normalized to a 0-100 score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acq_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acq_time: Option<String>,
}

/// A discrete infrastructure asset inside the query window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfrastructureAsset {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub asset_type: AssetType,
    pub name: String,
    /// Free-form source tags carried through from ingestion.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}

/// Aggregated weather over the forecast horizon at one point.
///
/// Wind direction uses the "toward" convention and is always normalized to
/// [0, 360). `source` records which upstream provider produced the summary,
/// including fallback variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_speed_kmh: f64,
    pub wind_direction_deg: f64,
    pub source: String,
}

/// Discrete risk bucket derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBucket {
    Low,
    Medium,
    High,
}

impl RiskBucket {
    /// Bucket boundaries are inclusive on the lower bound: >= 0.75 is high,
    /// >= 0.4 is medium, everything below is low.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.75 {
            RiskBucket::High
        } else if score >= 0.4 {
            RiskBucket::Medium
        } else {
            RiskBucket::Low
        }
    }
}

/// Feature snapshot behind a risk score.
///
/// Distance/alignment fields are absent when no fire detection was reachable;
/// the weather echoes are always populated.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RiskFeatures {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_dist_to_fire_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_alignment: Option<f64>,
    /// Raw distance shrunk by wind push toward the asset. Reported as a
    /// diagnostic; it does not feed the linear score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_dist: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed_kmh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity_pct: Option<f64>,
}

/// Per-asset risk output, produced once per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub asset_id: String,
    pub risk_score: f64,
    pub risk_bucket: RiskBucket,
    pub features: RiskFeatures,
}

/// A west,south,east,north query rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Center point as (lat, lon).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }
}

impl FromStr for BoundingBox {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| EngineError::InvalidBoundingBox(s.to_string()))?;

        match parts.as_slice() {
            [west, south, east, north] => Ok(BoundingBox {
                west: *west,
                south: *south,
                east: *east,
                north: *north,
            }),
            _ => Err(EngineError::InvalidBoundingBox(s.to_string())),
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}
