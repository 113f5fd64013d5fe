//! Cascade impact analysis.
//!
//! Derives outage cards for high-risk substations (which hospitals and water
//! facilities sit inside the outage radius) and flags major roads within
//! fire-proximity of the nearest detection.

use crate::{AssetType, FireDetection, InfrastructureAsset, RiskAssessment};
use geo_features::{distance_km, nearest_point};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Substation risk score at or above which an outage card is emitted.
pub const SUBSTATION_THRESHOLD: f64 = 0.7;
/// Radius around a triggered substation within which facilities are impacted (km).
pub const OUTAGE_RADIUS_KM: f64 = 8.0;
/// Nearest-fire distance at or below which a road is compromised (km).
pub const ROAD_FIRE_KM: f64 = 2.0;

/// Cascade thresholds. All three are parameters, not baked-in rules.
#[derive(Debug, Clone)]
pub struct CascadeConfig {
    pub substation_threshold: f64,
    pub outage_radius_km: f64,
    pub road_fire_km: f64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            substation_threshold: SUBSTATION_THRESHOLD,
            outage_radius_km: OUTAGE_RADIUS_KM,
            road_fire_km: ROAD_FIRE_KM,
        }
    }
}

/// A facility inside a triggered substation's outage radius.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactedFacility {
    pub asset_id: String,
    pub name: String,
    pub distance_km: f64,
}

/// Downstream exposure card for one high-risk substation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeCard {
    #[serde(rename = "type")]
    pub kind: String,
    pub trigger_asset_id: String,
    pub trigger_name: String,
    pub trigger_risk: f64,
    pub impacted_hospitals: Vec<ImpactedFacility>,
    pub impacted_water_facilities: Vec<ImpactedFacility>,
}

/// A major road within fire proximity of the nearest detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompromisedRoad {
    pub asset_id: String,
    pub name: String,
    pub distance_to_fire_km: f64,
    pub status: String,
}

/// Cascade analysis output for one request.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CascadeImpact {
    pub cascade_cards: Vec<CascadeCard>,
    pub compromised_roads: Vec<CompromisedRoad>,
}

fn facilities_within_radius(
    source: &InfrastructureAsset,
    candidates: &[&InfrastructureAsset],
    radius_km: f64,
) -> Vec<ImpactedFacility> {
    candidates
        .iter()
        .filter_map(|c| {
            let d = distance_km(source.lat, source.lon, c.lat, c.lon);
            (d <= radius_km).then(|| ImpactedFacility {
                asset_id: c.id.clone(),
                name: c.name.clone(),
                distance_km: round3(d),
            })
        })
        .collect()
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Derive cascade cards and compromised roads from scored assets.
///
/// Substations below the risk threshold are silently skipped; roads with no
/// fire inside the proximity threshold are omitted.
pub fn compute_cascade_impacts(
    assets: &[InfrastructureAsset],
    risks_by_asset_id: &HashMap<String, RiskAssessment>,
    fires: &[FireDetection],
    config: &CascadeConfig,
) -> CascadeImpact {
    let mut by_type: HashMap<AssetType, Vec<&InfrastructureAsset>> = HashMap::new();
    for asset in assets {
        by_type.entry(asset.asset_type).or_default().push(asset);
    }

    let hospitals = by_type.get(&AssetType::Hospital).cloned().unwrap_or_default();
    let water = by_type.get(&AssetType::WaterFacility).cloned().unwrap_or_default();
    let roads = by_type.get(&AssetType::MajorRoad).cloned().unwrap_or_default();

    let mut cascade_cards = Vec::new();
    for sub in by_type.get(&AssetType::Substation).cloned().unwrap_or_default() {
        let risk = risks_by_asset_id
            .get(&sub.id)
            .map(|r| r.risk_score)
            .unwrap_or(0.0);
        if risk < config.substation_threshold {
            continue;
        }

        let card = CascadeCard {
            kind: "substation_outage".to_string(),
            trigger_asset_id: sub.id.clone(),
            trigger_name: sub.name.clone(),
            trigger_risk: risk,
            impacted_hospitals: facilities_within_radius(sub, &hospitals, config.outage_radius_km),
            impacted_water_facilities: facilities_within_radius(sub, &water, config.outage_radius_km),
        };
        debug!(
            substation = %sub.id,
            risk,
            hospitals = card.impacted_hospitals.len(),
            water = card.impacted_water_facilities.len(),
            "substation outage card"
        );
        cascade_cards.push(card);
    }

    let fire_points: Vec<(f64, f64)> = fires.iter().map(|f| (f.lat, f.lon)).collect();
    let mut compromised_roads = Vec::new();
    for road in roads {
        let Some(nearest) = nearest_point(road.lat, road.lon, &fire_points) else {
            continue;
        };
        if nearest.distance_km <= config.road_fire_km {
            compromised_roads.push(CompromisedRoad {
                asset_id: road.id.clone(),
                name: road.name.clone(),
                distance_to_fire_km: round3(nearest.distance_km),
                status: "compromised".to_string(),
            });
        }
    }

    CascadeImpact {
        cascade_cards,
        compromised_roads,
    }
}
