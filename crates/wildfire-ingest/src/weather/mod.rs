//! Multi-source weather ingestion with fallback.
//!
//! A logical source name resolves to an ordered provider chain: `"gridmet"`
//! tries the gridded THREDDS archive first and falls back to the Open-Meteo
//! point forecast, `"openmeteo"` goes straight to the point forecast with no
//! fallback. Callers either get a result from the requested provider or a
//! clearly-tagged fallback result; only the last provider's failure
//! propagates.

use crate::{IngestError, Result};
use async_trait::async_trait;
use risk_engine::WeatherSummary;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use ttl_cache::IngestionCache;

pub mod gridmet;
pub mod openmeteo;

pub use gridmet::{DapStore, GridmetProvider, HttpDapStore};
pub use openmeteo::OpenMeteoProvider;

/// Defaults applied only when a provider returns an empty sample set.
pub const DEFAULT_TEMPERATURE_C: f64 = 25.0;
pub const DEFAULT_HUMIDITY_PCT: f64 = 35.0;
pub const DEFAULT_WIND_SPEED_KMH: f64 = 15.0;
pub const DEFAULT_WIND_DIRECTION_DEG: f64 = 180.0;

/// Weather summaries stay fresh for 30 minutes.
pub const WEATHER_CACHE_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Circular mean of angles in degrees, normalized to [0, 360).
///
/// Angles are averaged as unit vectors so wraparound at 360 behaves:
/// `[10, 350]` averages to 0, not 180. When opposing directions cancel both
/// vector sums to ~0, the mean is undefined and 180 is returned as the
/// defined default.
pub fn circular_mean_deg(angles_deg: &[f64]) -> f64 {
    if angles_deg.is_empty() {
        return DEFAULT_WIND_DIRECTION_DEG;
    }

    let (sin_sum, cos_sum) = angles_deg.iter().fold((0.0f64, 0.0f64), |(s, c), a| {
        let r = a.to_radians();
        (s + r.sin(), c + r.cos())
    });

    if sin_sum.abs() < 1e-9 && cos_sum.abs() < 1e-9 {
        return 180.0;
    }
    (sin_sum.atan2(cos_sum).to_degrees() + 360.0) % 360.0
}

/// Arithmetic mean, `None` on an empty slice.
pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// One upstream weather provider.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Aggregate weather at (lat, lon) over the next `horizon_hours`.
    async fn fetch_summary(&self, lat: f64, lon: f64, horizon_hours: u32)
        -> Result<WeatherSummary>;
}

/// Weather entry point: resolves a source name to its provider chain, walks
/// the chain, and caches the resulting summary.
pub struct WeatherSource {
    chains: HashMap<String, Vec<Arc<dyn WeatherProvider>>>,
    cache: Arc<dyn IngestionCache>,
}

impl WeatherSource {
    /// Wire the default chains against the live upstream endpoints.
    pub fn new(cache: Arc<dyn IngestionCache>) -> Self {
        let gridmet: Arc<dyn WeatherProvider> = Arc::new(GridmetProvider::new());
        let openmeteo: Arc<dyn WeatherProvider> = Arc::new(OpenMeteoProvider::new());

        let mut chains: HashMap<String, Vec<Arc<dyn WeatherProvider>>> = HashMap::new();
        chains.insert("gridmet".to_string(), vec![gridmet, openmeteo.clone()]);
        chains.insert("openmeteo".to_string(), vec![openmeteo]);

        Self { chains, cache }
    }

    /// Replace the chain for a source name (tests and custom wiring).
    pub fn with_chain(
        mut self,
        source_name: &str,
        chain: Vec<Arc<dyn WeatherProvider>>,
    ) -> Self {
        self.chains.insert(source_name.to_string(), chain);
        self
    }

    fn cache_key(lat: f64, lon: f64, horizon_hours: u32, source_name: &str) -> String {
        format!("weather_{source_name}_{lat:.3}_{lon:.3}_{horizon_hours}")
    }

    /// Fetch an aggregated summary for the point and horizon.
    ///
    /// Fails with [`IngestError::UnsupportedSource`] for an unrecognized
    /// source name. A non-primary provider's result is tagged with a
    /// `_fallback` provenance suffix.
    pub async fn get_summary(
        &self,
        lat: f64,
        lon: f64,
        horizon_hours: u32,
        source_name: &str,
    ) -> Result<WeatherSummary> {
        let chain = self
            .chains
            .get(source_name)
            .ok_or_else(|| IngestError::UnsupportedSource(source_name.to_string()))?;

        let key = Self::cache_key(lat, lon, horizon_hours, source_name);
        if let Some(cached) =
            ttl_cache::get_json::<WeatherSummary>(&self.cache, &key, WEATHER_CACHE_MAX_AGE).await?
        {
            debug!(source_name, lat, lon, "weather summary served from cache");
            return Ok(cached);
        }

        let mut last_error: Option<IngestError> = None;
        for (position, provider) in chain.iter().enumerate() {
            match provider.fetch_summary(lat, lon, horizon_hours).await {
                Ok(mut summary) => {
                    if position > 0 {
                        warn!(
                            requested = source_name,
                            served_by = provider.name(),
                            "primary weather provider failed; serving fallback"
                        );
                        summary.source = format!("{}_fallback", summary.source);
                    }
                    info!(
                        source = %summary.source,
                        lat,
                        lon,
                        horizon_hours,
                        "weather summary ready"
                    );
                    ttl_cache::put_json(&self.cache, &key, &summary).await?;
                    return Ok(summary);
                }
                Err(error) => {
                    warn!(provider = provider.name(), %error, "weather provider failed");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| IngestError::upstream("weather", "empty provider chain")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use ttl_cache::MemoryCache;

    struct StaticProvider {
        name: String,
        summary: WeatherSummary,
        calls: AtomicU32,
    }

    impl StaticProvider {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                summary: WeatherSummary {
                    temperature_c: 21.5,
                    humidity_pct: 40.0,
                    wind_speed_kmh: 12.0,
                    wind_direction_deg: 200.0,
                    source: name.to_string(),
                },
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl WeatherProvider for StaticProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch_summary(&self, _: f64, _: f64, _: u32) -> Result<WeatherSummary> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.summary.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl WeatherProvider for FailingProvider {
        fn name(&self) -> &str {
            "gridmet"
        }

        async fn fetch_summary(&self, _: f64, _: f64, _: u32) -> Result<WeatherSummary> {
            Err(IngestError::upstream("gridmet", "connection refused"))
        }
    }

    fn source_with(chain: Vec<Arc<dyn WeatherProvider>>, name: &str) -> WeatherSource {
        let cache: Arc<dyn IngestionCache> = Arc::new(MemoryCache::new());
        WeatherSource {
            chains: HashMap::new(),
            cache,
        }
        .with_chain(name, chain)
    }

    #[test]
    fn test_circular_mean_respects_wraparound() {
        let mean = circular_mean_deg(&[10.0, 350.0]);
        assert!(mean < 1.0 || mean > 359.0, "got {}", mean);
    }

    #[test]
    fn test_circular_mean_simple_angles() {
        assert!((circular_mean_deg(&[90.0]) - 90.0).abs() < 1e-9);
        assert!((circular_mean_deg(&[80.0, 100.0]) - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_circular_mean_opposing_defaults_to_180() {
        assert_eq!(circular_mean_deg(&[0.0, 180.0]), 180.0);
        assert_eq!(circular_mean_deg(&[90.0, 270.0]), 180.0);
    }

    #[test]
    fn test_circular_mean_empty_defaults() {
        assert_eq!(circular_mean_deg(&[]), DEFAULT_WIND_DIRECTION_DEG);
    }

    #[tokio::test]
    async fn test_unsupported_source_name() {
        let cache: Arc<dyn IngestionCache> = Arc::new(MemoryCache::new());
        let source = WeatherSource::new(cache);

        let result = source.get_summary(39.75, -121.6, 24, "noaa_magic").await;
        assert!(matches!(result, Err(IngestError::UnsupportedSource(_))));
    }

    #[tokio::test]
    async fn test_primary_failure_falls_back_with_tag() {
        let fallback = StaticProvider::new("openmeteo");
        let source = source_with(
            vec![Arc::new(FailingProvider), fallback.clone()],
            "gridmet",
        );

        let summary = source.get_summary(39.75, -121.6, 24, "gridmet").await.unwrap();
        assert_eq!(summary.source, "openmeteo_fallback");
        assert!(summary.temperature_c.is_finite());
        assert!(summary.humidity_pct.is_finite());
        assert!(summary.wind_speed_kmh.is_finite());
        assert!(summary.wind_direction_deg.is_finite());
    }

    #[tokio::test]
    async fn test_primary_success_keeps_provenance() {
        let primary = StaticProvider::new("gridmet");
        let source = source_with(vec![primary.clone()], "gridmet");

        let summary = source.get_summary(39.75, -121.6, 24, "gridmet").await.unwrap();
        assert_eq!(summary.source, "gridmet");
    }

    #[tokio::test]
    async fn test_sole_provider_failure_propagates() {
        let source = source_with(vec![Arc::new(FailingProvider)], "openmeteo");

        let result = source.get_summary(39.75, -121.6, 24, "openmeteo").await;
        assert!(matches!(
            result,
            Err(IngestError::UpstreamUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_summary_cached_across_calls() {
        let provider = StaticProvider::new("openmeteo");
        let source = source_with(vec![provider.clone()], "openmeteo");

        source.get_summary(39.75, -121.6, 24, "openmeteo").await.unwrap();
        source.get_summary(39.75, -121.6, 24, "openmeteo").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        // A different horizon is a different key.
        source.get_summary(39.75, -121.6, 48, "openmeteo").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
