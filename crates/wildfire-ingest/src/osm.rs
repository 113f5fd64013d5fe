//! OSM Overpass infrastructure asset ingestion.
//!
//! Queries substations, power lines, hospitals, water facilities, and major
//! roads inside a bounding box. Ways are located by their `center`; elements
//! without coordinates or a recognized classification are dropped.

use crate::{IngestError, Result};
use risk_engine::{AssetType, BoundingBox, InfrastructureAsset};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use ttl_cache::IngestionCache;

pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Asset inventories stay fresh for an hour.
pub const ASSET_CACHE_MAX_AGE: Duration = Duration::from_secs(60 * 60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Render the Overpass QL query for a bounding box.
pub fn overpass_query(bbox: &BoundingBox) -> String {
    let BoundingBox {
        west,
        south,
        east,
        north,
    } = bbox;
    format!(
        r#"[out:json][timeout:25];
(
  node["power"="substation"]({south},{west},{north},{east});
  way["power"="substation"]({south},{west},{north},{east});

  way["power"="line"]({south},{west},{north},{east});
  way["power"="minor_line"]({south},{west},{north},{east});

  node["amenity"="hospital"]({south},{west},{north},{east});
  way["amenity"="hospital"]({south},{west},{north},{east});

  node["man_made"="water_works"]({south},{west},{north},{east});
  way["man_made"="water_works"]({south},{west},{north},{east});
  node["utility"="water"]({south},{west},{north},{east});

  way["highway"~"motorway|trunk|primary|secondary"]({south},{west},{north},{east});
);
out center tags;"#
    )
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: u64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => self.center.as_ref().map(|c| (c.lat, c.lon)),
        }
    }
}

/// Map OSM tags onto an asset category.
fn classify(tags: &HashMap<String, String>) -> Option<AssetType> {
    let tag = |key: &str| tags.get(key).map(String::as_str);

    match tag("power") {
        Some("substation") => return Some(AssetType::Substation),
        Some("line") | Some("minor_line") => return Some(AssetType::PowerLine),
        _ => {}
    }
    if tag("amenity") == Some("hospital") {
        return Some(AssetType::Hospital);
    }
    if tag("man_made") == Some("water_works") || tag("utility") == Some("water") {
        return Some(AssetType::WaterFacility);
    }
    if matches!(
        tag("highway"),
        Some("motorway") | Some("trunk") | Some("primary") | Some("secondary")
    ) {
        return Some(AssetType::MajorRoad);
    }
    None
}

fn asset_from_element(element: OverpassElement) -> Option<InfrastructureAsset> {
    let (lat, lon) = element.coordinates()?;
    let asset_type = classify(&element.tags)?;
    let name = element
        .tags
        .get("name")
        .cloned()
        .unwrap_or_else(|| asset_type.label().to_string());

    Some(InfrastructureAsset {
        id: format!("osm_{}_{}", element.kind, element.id),
        lat,
        lon,
        asset_type,
        name,
        tags: element.tags,
    })
}

/// Overpass API client.
pub struct OverpassClient {
    client: reqwest::Client,
    cache: Arc<dyn IngestionCache>,
}

impl OverpassClient {
    pub fn new(cache: Arc<dyn IngestionCache>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self { client, cache }
    }

    fn cache_key(bbox: &BoundingBox) -> String {
        format!("osm_{bbox}").replace(',', "_")
    }

    /// Fetch selected infrastructure assets inside `bbox`.
    pub async fn fetch_assets(&self, bbox: &BoundingBox) -> Result<Vec<InfrastructureAsset>> {
        let key = Self::cache_key(bbox);
        if let Some(cached) =
            ttl_cache::get_json::<Vec<InfrastructureAsset>>(&self.cache, &key, ASSET_CACHE_MAX_AGE)
                .await?
        {
            debug!(%bbox, "assets served from cache");
            return Ok(cached);
        }

        let response = self
            .client
            .post(OVERPASS_URL)
            .form(&[("data", overpass_query(bbox))])
            .send()
            .await
            .map_err(|e| IngestError::upstream("overpass", e))?;
        if !response.status().is_success() {
            return Err(IngestError::upstream(
                "overpass",
                format!("status {}", response.status()),
            ));
        }
        let data: OverpassResponse = response
            .json()
            .await
            .map_err(|e| IngestError::upstream("overpass", e))?;

        let assets: Vec<InfrastructureAsset> = data
            .elements
            .into_iter()
            .filter_map(asset_from_element)
            .collect();
        info!(%bbox, count = assets.len(), "fetched infrastructure assets");

        ttl_cache::put_json(&self.cache, &key, &assets).await?;
        Ok(assets)
    }
}
