//! Wildfire Ingestion Layer
//!
//! Request-scoped ingestion of the three upstream inputs the risk engine
//! consumes: active fire detections (NASA FIRMS), infrastructure assets
//! (OSM Overpass), and an aggregated weather summary (gridded THREDDS
//! archive with point-forecast fallback). All clients read through the
//! injected [`ttl_cache::IngestionCache`] to avoid redundant upstream
//! requests.
//!
//! Records missing required coordinates are dropped during parsing; the
//! engine only ever sees well-formed entities. Upstream failures surface as
//! [`IngestError::UpstreamUnavailable`] except where the weather fallback
//! chain absorbs them.

use thiserror::Error;

pub mod firms;
pub mod osm;
pub mod weather;

pub use firms::FirmsClient;
pub use osm::OverpassClient;
pub use weather::{WeatherProvider, WeatherSource};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("upstream {service} unavailable: {reason}")]
    UpstreamUnavailable { service: String, reason: String },
    #[error("unsupported weather source: {0}")]
    UnsupportedSource(String),
    #[error("malformed upstream payload: {0}")]
    MalformedPayload(String),
    #[error(transparent)]
    Cache(#[from] ttl_cache::CacheError),
}

impl IngestError {
    /// Wrap a transport/provider failure for `service`.
    pub fn upstream(service: &str, reason: impl ToString) -> Self {
        IngestError::UpstreamUnavailable {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
