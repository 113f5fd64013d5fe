//! Wildfire Cascade Gateway
//!
//! HTTP orchestration layer: ingests fires, assets, and weather for a
//! bounding box, runs the risk scorer and cascade analyzer, and returns the
//! combined result. The engine itself is synchronous per request; only
//! ingestion suspends.

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use risk_engine::{CascadeConfig, RiskConfig};
use ttl_cache::{DiskCache, IngestionCache};
use wildfire_ingest::{FirmsClient, OverpassClient, WeatherSource};

mod routes;

#[derive(Clone)]
pub struct AppState {
    pub firms: Arc<FirmsClient>,
    pub overpass: Arc<OverpassClient>,
    pub weather: Arc<WeatherSource>,
    pub risk_config: Arc<RiskConfig>,
    pub cascade_config: Arc<CascadeConfig>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "cascade_gateway=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cache_dir =
        std::env::var("CASCADE_CACHE_DIR").unwrap_or_else(|_| "data_cache".to_string());
    let cache: Arc<dyn IngestionCache> = Arc::new(DiskCache::new(&cache_dir)?);
    tracing::info!("   Ingestion cache at {}", cache_dir);

    let firms_key = std::env::var("FIRMS_API_KEY").ok();
    if firms_key.is_none() {
        tracing::warn!("   FIRMS_API_KEY not set - fire queries will return empty lists");
    }

    let state = AppState {
        firms: Arc::new(FirmsClient::new(firms_key, cache.clone())),
        overpass: Arc::new(OverpassClient::new(cache.clone())),
        weather: Arc::new(WeatherSource::new(cache)),
        risk_config: Arc::new(RiskConfig::default()),
        cascade_config: Arc::new(CascadeConfig::default()),
    };

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/fires", get(routes::fires))
        .route("/assets", get(routes::assets))
        .route("/assets/overpass_query", get(routes::assets_overpass_query))
        .route("/risk", post(routes::risk))
        .with_state(state)
        .layer(CorsLayer::permissive());

    let port = std::env::var("CASCADE_GATEWAY_PORT")
        .or_else(|_| std::env::var("PORT"))
        .unwrap_or_else(|_| "18790".to_string());
    let addr = format!("0.0.0.0:{}", port);

    tracing::info!("🔥 Cascade Gateway starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
