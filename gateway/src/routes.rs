//! Request handlers.
//!
//! Ingestion failures map to 502 so the dashboard can distinguish "upstream
//! down" from a normal empty result; malformed query input maps to 400.

use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use risk_engine::{
    cascade::compute_cascade_impacts, scorer::score_assets, BoundingBox, CascadeImpact,
    FireDetection, InfrastructureAsset, RiskAssessment, WeatherSummary,
};
use wildfire_ingest::{firms::DEFAULT_FIRE_SOURCE, osm::overpass_query, IngestError};

/// Error body returned for every failed request.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        let status = match error {
            // A bad source name is the caller's mistake, not an outage.
            IngestError::UnsupportedSource(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        error!(%error, "ingestion failed");
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn parse_bbox(raw: &str) -> Result<BoundingBox, ApiError> {
    raw.parse::<BoundingBox>()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

pub async fn health() -> Json<Value> {
    Json(json!({"ok": true}))
}

// ---- Fires ----

fn default_days() -> u32 {
    1
}

fn default_fire_source() -> String {
    DEFAULT_FIRE_SOURCE.to_string()
}

#[derive(Deserialize)]
pub struct FiresQuery {
    /// west,south,east,north
    pub bbox: String,
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default = "default_fire_source")]
    pub source: String,
}

#[derive(Serialize)]
pub struct FiresResponse {
    pub bbox: String,
    pub count: usize,
    pub fires: Vec<FireDetection>,
}

pub async fn fires(
    State(state): State<AppState>,
    Query(query): Query<FiresQuery>,
) -> Result<Json<FiresResponse>, ApiError> {
    let bbox = parse_bbox(&query.bbox)?;
    if !(1..=10).contains(&query.days) {
        return Err(ApiError::bad_request("days must be between 1 and 10"));
    }

    let fires = state
        .firms
        .fetch_fires(&bbox, query.days, &query.source, None)
        .await?;
    Ok(Json(FiresResponse {
        bbox: query.bbox,
        count: fires.len(),
        fires,
    }))
}

// ---- Assets ----

#[derive(Deserialize)]
pub struct AssetsQuery {
    pub bbox: String,
}

#[derive(Serialize)]
pub struct AssetsResponse {
    pub bbox: String,
    pub count: usize,
    pub assets: Vec<InfrastructureAsset>,
}

pub async fn assets(
    State(state): State<AppState>,
    Query(query): Query<AssetsQuery>,
) -> Result<Json<AssetsResponse>, ApiError> {
    let bbox = parse_bbox(&query.bbox)?;
    let assets = state.overpass.fetch_assets(&bbox).await?;
    Ok(Json(AssetsResponse {
        bbox: query.bbox,
        count: assets.len(),
        assets,
    }))
}

pub async fn assets_overpass_query(
    Query(query): Query<AssetsQuery>,
) -> Result<Json<Value>, ApiError> {
    let bbox = parse_bbox(&query.bbox)?;
    Ok(Json(json!({
        "bbox": query.bbox,
        "query": overpass_query(&bbox),
    })))
}

// ---- Risk ----

fn default_horizon() -> u32 {
    24
}

fn default_weather_source() -> String {
    "gridmet".to_string()
}

#[derive(Deserialize)]
pub struct RiskRequest {
    /// west,south,east,north
    pub bbox: String,
    #[serde(default = "default_horizon")]
    pub horizon_hours: u32,
    #[serde(default = "default_days")]
    pub firms_days: u32,
    #[serde(default = "default_fire_source")]
    pub fire_source: String,
    #[serde(default = "default_weather_source")]
    pub weather_source: String,
}

/// Asset record merged with its risk assessment, mirroring the shape the
/// dashboard consumes.
#[derive(Serialize)]
pub struct ScoredAsset {
    #[serde(flatten)]
    pub asset: InfrastructureAsset,
    #[serde(flatten)]
    pub assessment: RiskAssessment,
}

#[derive(Serialize)]
pub struct RiskResponse {
    pub bbox: String,
    pub horizon_hours: u32,
    pub weather: WeatherSummary,
    pub fire_count: usize,
    pub asset_count: usize,
    pub assets: Vec<ScoredAsset>,
    pub cascade: CascadeImpact,
}

pub async fn risk(
    State(state): State<AppState>,
    Json(request): Json<RiskRequest>,
) -> Result<Json<RiskResponse>, ApiError> {
    let bbox = parse_bbox(&request.bbox)?;
    if !(1..=48).contains(&request.horizon_hours) {
        return Err(ApiError::bad_request(
            "horizon_hours must be between 1 and 48",
        ));
    }
    if !(1..=10).contains(&request.firms_days) {
        return Err(ApiError::bad_request("firms_days must be between 1 and 10"));
    }

    let fires = state
        .firms
        .fetch_fires(&bbox, request.firms_days, &request.fire_source, None)
        .await?;
    let assets = state.overpass.fetch_assets(&bbox).await?;

    let (center_lat, center_lon) = bbox.center();
    let weather = state
        .weather
        .get_summary(
            center_lat,
            center_lon,
            request.horizon_hours,
            &request.weather_source,
        )
        .await?;

    let risks = score_assets(&assets, &fires, &weather, &state.risk_config);
    let cascade = compute_cascade_impacts(&assets, &risks, &fires, &state.cascade_config);

    let scored: Vec<ScoredAsset> = assets
        .iter()
        .filter_map(|asset| {
            risks.get(&asset.id).map(|assessment| ScoredAsset {
                asset: asset.clone(),
                assessment: assessment.clone(),
            })
        })
        .collect();

    Ok(Json(RiskResponse {
        bbox: request.bbox,
        horizon_hours: request.horizon_hours,
        weather,
        fire_count: fires.len(),
        asset_count: assets.len(),
        assets: scored,
        cascade,
    }))
}
