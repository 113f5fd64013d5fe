//! Per-asset risk scoring.
//!
//! One call per asset: find the nearest fire, compute the wind-aware
//! features, run the linear model through a logistic squash, and bucket the
//! result. An empty fire set is a defined zero-risk result, not an error.

use crate::{
    FireDetection, InfrastructureAsset, RiskAssessment, RiskBucket, RiskFeatures, WeatherSummary,
};
use geo_features::{bearing_deg, nearest_point, wind_alignment_cos};
use std::collections::HashMap;
use tracing::debug;

/// Default linear-model coefficients.
pub const BASE_BIAS: f64 = -1.2;
pub const ALPHA_DIST: f64 = 1.1;
pub const ALPHA_WIND: f64 = 0.08;
pub const ALPHA_HUMIDITY: f64 = 0.03;

/// Distance at which proximity stops contributing positively (km).
pub const REFERENCE_DIST_KM: f64 = 5.0;

/// Risk model coefficients.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub base_bias: f64,
    pub alpha_dist: f64,
    pub alpha_wind: f64,
    pub alpha_humidity: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            base_bias: BASE_BIAS,
            alpha_dist: ALPHA_DIST,
            alpha_wind: ALPHA_WIND,
            alpha_humidity: ALPHA_HUMIDITY,
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Round to a fixed number of decimal places for stable, comparable output.
fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn zero_risk(asset: &InfrastructureAsset, weather: &WeatherSummary) -> RiskAssessment {
    RiskAssessment {
        asset_id: asset.id.clone(),
        risk_score: 0.0,
        risk_bucket: RiskBucket::Low,
        features: RiskFeatures {
            wind_speed_kmh: Some(round_to(weather.wind_speed_kmh, 2)),
            humidity_pct: Some(round_to(weather.humidity_pct, 2)),
            ..RiskFeatures::default()
        },
    }
}

/// Score one asset against the fire set and weather summary.
pub fn score_asset(
    asset: &InfrastructureAsset,
    fires: &[FireDetection],
    weather: &WeatherSummary,
    config: &RiskConfig,
) -> RiskAssessment {
    let candidates: Vec<(f64, f64)> = fires.iter().map(|f| (f.lat, f.lon)).collect();

    let nearest = match nearest_point(asset.lat, asset.lon, &candidates) {
        Some(n) if n.distance_km.is_finite() => n,
        _ => return zero_risk(asset, weather),
    };

    let fire_to_asset = bearing_deg(nearest.lat, nearest.lon, asset.lat, asset.lon);
    let alignment = wind_alignment_cos(fire_to_asset, weather.wind_direction_deg);
    let wind_speed = weather.wind_speed_kmh;
    let humidity = weather.humidity_pct;

    // Wind toward the asset shrinks the effective distance. The 0.3 floor on
    // the push term keeps still air near the raw distance; the 0.2 minimum
    // divisor bounds the ratio.
    let effective_dist =
        nearest.distance_km / f64::max(0.2, wind_speed * f64::max(0.0, alignment) + 0.3);

    let linear = config.base_bias
        + config.alpha_dist * (REFERENCE_DIST_KM - nearest.distance_km)
        + config.alpha_wind * wind_speed * alignment
        - config.alpha_humidity * humidity;
    let risk = sigmoid(linear);

    debug!(
        asset_id = %asset.id,
        dist_km = nearest.distance_km,
        alignment,
        risk,
        "scored asset"
    );

    RiskAssessment {
        asset_id: asset.id.clone(),
        risk_score: round_to(risk, 4),
        risk_bucket: RiskBucket::from_score(risk),
        features: RiskFeatures {
            min_dist_to_fire_km: Some(round_to(nearest.distance_km, 3)),
            wind_alignment: Some(round_to(alignment, 3)),
            effective_dist: Some(round_to(effective_dist, 3)),
            wind_speed_kmh: Some(round_to(wind_speed, 2)),
            humidity_pct: Some(round_to(humidity, 2)),
        },
    }
}

/// Score every asset, keyed by asset id for the cascade step.
pub fn score_assets(
    assets: &[InfrastructureAsset],
    fires: &[FireDetection],
    weather: &WeatherSummary,
    config: &RiskConfig,
) -> HashMap<String, RiskAssessment> {
    assets
        .iter()
        .map(|asset| (asset.id.clone(), score_asset(asset, fires, weather, config)))
        .collect()
}
