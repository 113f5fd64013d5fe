//! GridMET gridded-archive provider.
//!
//! Reads six daily variables (wind speed/direction, min/max temperature,
//! min/max relative humidity) from the Northwest Knowledge THREDDS
//! aggregations via OPeNDAP ASCII subsetting: nearest grid cell to the
//! query point, most recent `ceil(horizon_hours/24)` daily samples.
//!
//! Unit handling: wind speed arrives in m/s and is converted to km/h;
//! temperatures arrive in Kelvin and are converted when the averaged raw
//! value exceeds 150 (Celsius values in this domain never reach that).
//! Wind direction is an angle and is averaged circularly.
//!
//! Dataset coordinate handles are cached in an LRU bounded at
//! [`HANDLE_CACHE_CAPACITY`] entries so repeated queries do not re-read the
//! coordinate arrays.

use super::{circular_mean_deg, mean, WeatherProvider};
use crate::{IngestError, Result};
use async_trait::async_trait;
use risk_engine::WeatherSummary;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

pub const THREDDS_BASE: &str = "https://thredds.northwestknowledge.net/thredds/dodsC";

/// Bound on cached dataset handles.
pub const HANDLE_CACHE_CAPACITY: usize = 16;

/// GridMET encodes missing cells with large fill values.
const FILL_THRESHOLD: f64 = 30000.0;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn dataset_url(code: &str) -> String {
    format!("{THREDDS_BASE}/agg_met_{code}_1979_CurrentYear_CONUS.nc")
}

/// Transport for OPeNDAP ASCII requests; faked in tests.
#[async_trait]
pub trait DapStore: Send + Sync {
    async fn fetch_ascii(&self, url: &str) -> Result<String>;
}

/// reqwest-backed store for the live THREDDS server.
pub struct HttpDapStore {
    client: reqwest::Client,
}

impl HttpDapStore {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self { client }
    }
}

impl Default for HttpDapStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DapStore for HttpDapStore {
    async fn fetch_ascii(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::upstream("gridmet", e))?;
        if !response.status().is_success() {
            return Err(IngestError::upstream(
                "gridmet",
                format!("status {}", response.status()),
            ));
        }
        response
            .text()
            .await
            .map_err(|e| IngestError::upstream("gridmet", e))
    }
}

/// Extract the numeric values for `var_name` from a DAP ASCII response.
///
/// The payload echoes the constraint header and per-row index prefixes
/// (`[0][0], 3.2`); everything that is not a bare number is skipped.
pub(crate) fn parse_dap_values(body: &str, var_name: &str) -> Vec<f64> {
    let mut in_data = false;
    let mut values = Vec::new();

    for line in body.lines() {
        let line = line.trim();
        if !in_data {
            if line.starts_with(var_name) && line.contains('[') {
                in_data = true;
            }
            continue;
        }
        if line.is_empty() {
            break;
        }
        for token in line.split(',') {
            let token = token.trim();
            if token.is_empty() || token.contains('[') {
                continue;
            }
            if let Ok(value) = token.parse::<f64>() {
                values.push(value);
            }
        }
    }
    values
}

/// Coordinate arrays of one remote dataset, fetched once per handle.
struct DatasetHandle {
    lats: Vec<f64>,
    lons: Vec<f64>,
    time_len: usize,
}

impl DatasetHandle {
    /// Longitudes may use the 0-360 convention; queries adjust to match.
    fn uses_360(&self) -> bool {
        self.lons.iter().cloned().fold(f64::MIN, f64::max) > 180.0
    }
}

fn nearest_index(values: &[f64], target: f64) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (*a - target)
                .abs()
                .total_cmp(&(*b - target).abs())
        })
        .map(|(i, _)| i)
}

/// Bounded LRU of open dataset handles, keyed by dataset URL.
struct HandleCache {
    entries: HashMap<String, Arc<DatasetHandle>>,
    order: VecDeque<String>,
    capacity: usize,
}

impl HandleCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&mut self, url: &str) -> Option<Arc<DatasetHandle>> {
        let handle = self.entries.get(url).cloned()?;
        self.order.retain(|u| u != url);
        self.order.push_back(url.to_string());
        Some(handle)
    }

    fn insert(&mut self, url: &str, handle: Arc<DatasetHandle>) {
        if self.entries.contains_key(url) {
            self.order.retain(|u| u != url);
        } else if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
                debug!(url = %evicted, "evicted dataset handle");
            }
        }
        self.entries.insert(url.to_string(), handle);
        self.order.push_back(url.to_string());
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Gridded-archive weather provider.
pub struct GridmetProvider {
    store: Arc<dyn DapStore>,
    handles: Mutex<HandleCache>,
}

impl GridmetProvider {
    pub fn new() -> Self {
        Self::with_store(Arc::new(HttpDapStore::new()))
    }

    pub fn with_store(store: Arc<dyn DapStore>) -> Self {
        Self {
            store,
            handles: Mutex::new(HandleCache::new(HANDLE_CACHE_CAPACITY)),
        }
    }

    async fn open_handle(&self, url: &str) -> Result<Arc<DatasetHandle>> {
        if let Some(handle) = self.handles.lock().await.get(url) {
            return Ok(handle);
        }

        let lats = parse_dap_values(&self.store.fetch_ascii(&format!("{url}.ascii?lat")).await?, "lat");
        let lons = parse_dap_values(&self.store.fetch_ascii(&format!("{url}.ascii?lon")).await?, "lon");
        if lats.is_empty() || lons.is_empty() {
            return Err(IngestError::MalformedPayload(format!(
                "dataset {url} has no lat/lon coordinates"
            )));
        }

        // GridMET aggregations index time as "day"; tolerate plain "time".
        let mut time_len = 0;
        for coord in ["day", "time"] {
            if let Ok(body) = self.store.fetch_ascii(&format!("{url}.ascii?{coord}")).await {
                time_len = parse_dap_values(&body, coord).len();
                if time_len > 0 {
                    break;
                }
            }
        }
        if time_len == 0 {
            return Err(IngestError::MalformedPayload(format!(
                "dataset {url} has no day/time coordinate"
            )));
        }

        let handle = Arc::new(DatasetHandle {
            lats,
            lons,
            time_len,
        });
        self.handles.lock().await.insert(url, handle.clone());
        debug!(url, "opened gridmet dataset handle");
        Ok(handle)
    }

    /// Read the trailing `days` daily samples of one variable at the grid
    /// cell nearest to (lat, lon).
    async fn read_series(
        &self,
        code: &str,
        var_name: &str,
        lat: f64,
        lon: f64,
        days: usize,
    ) -> Result<Vec<f64>> {
        let url = dataset_url(code);
        let handle = self.open_handle(&url).await?;

        let query_lon = if handle.uses_360() && lon < 0.0 {
            lon + 360.0
        } else {
            lon
        };
        let lat_idx = nearest_index(&handle.lats, lat)
            .ok_or_else(|| IngestError::MalformedPayload(format!("{code}: empty lat axis")))?;
        let lon_idx = nearest_index(&handle.lons, query_lon)
            .ok_or_else(|| IngestError::MalformedPayload(format!("{code}: empty lon axis")))?;

        let t_end = handle.time_len - 1;
        let t_start = t_end.saturating_sub(days.saturating_sub(1));

        let body = self
            .store
            .fetch_ascii(&format!(
                "{url}.ascii?{var_name}[{t_start}:{t_end}][{lat_idx}][{lon_idx}]"
            ))
            .await?;

        let values: Vec<f64> = parse_dap_values(&body, var_name)
            .into_iter()
            .filter(|v| v.is_finite() && v.abs() < FILL_THRESHOLD)
            .collect();
        if values.is_empty() {
            return Err(IngestError::MalformedPayload(format!(
                "{code}: variable {var_name} returned no samples"
            )));
        }
        Ok(values)
    }
}

impl Default for GridmetProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeatherProvider for GridmetProvider {
    fn name(&self) -> &str {
        "gridmet"
    }

    async fn fetch_summary(
        &self,
        lat: f64,
        lon: f64,
        horizon_hours: u32,
    ) -> Result<WeatherSummary> {
        let days = (horizon_hours as usize).div_ceil(24).max(1);

        let (vs, th, tmmn, tmmx, rmin, rmax) = tokio::try_join!(
            self.read_series("vs", "daily_mean_wind_speed", lat, lon, days),
            self.read_series("th", "daily_mean_wind_direction", lat, lon, days),
            self.read_series("tmmn", "daily_minimum_temperature", lat, lon, days),
            self.read_series("tmmx", "daily_maximum_temperature", lat, lon, days),
            self.read_series("rmin", "daily_minimum_relative_humidity", lat, lon, days),
            self.read_series("rmax", "daily_maximum_relative_humidity", lat, lon, days),
        )?;

        // read_series guarantees non-empty sample vectors.
        let wind_speed_ms = mean(&vs).unwrap_or_default();
        let temp_raw = (mean(&tmmn).unwrap_or_default() + mean(&tmmx).unwrap_or_default()) / 2.0;
        let temperature_c = if temp_raw > 150.0 {
            temp_raw - 273.15
        } else {
            temp_raw
        };
        let humidity_pct =
            ((mean(&rmin).unwrap_or_default() + mean(&rmax).unwrap_or_default()) / 2.0)
                .clamp(0.0, 100.0);

        Ok(WeatherSummary {
            temperature_c,
            humidity_pct,
            wind_speed_kmh: wind_speed_ms * 3.6,
            wind_direction_deg: circular_mean_deg(&th),
            source: "gridmet".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeDapStore {
        responses: HashMap<String, String>,
        fetches: AtomicU32,
    }

    impl FakeDapStore {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
                fetches: AtomicU32::new(0),
            }
        }

        fn coord_response(name: &str, values: &[f64]) -> String {
            let joined = values
                .iter()
                .map(f64::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "Dataset {{\n    Float64 {name}[{name} = {len}];\n}} agg;\n\
                 ---------------------------------------------\n\
                 {name}[{len}]\n{joined}\n",
                len = values.len()
            )
        }

        fn series_response(var_name: &str, constraint: &str, values: &[f64]) -> String {
            let mut body = format!(
                "Dataset {{\n    Float32 {var_name}{constraint};\n}} agg;\n\
                 ---------------------------------------------\n\
                 {var_name}{constraint}\n"
            );
            for (i, v) in values.iter().enumerate() {
                body.push_str(&format!("[{i}][0], {v}\n"));
            }
            body
        }

        /// Register coords plus one variable slice for a dataset.
        fn with_dataset(
            mut self,
            code: &str,
            var_name: &str,
            constraint: &str,
            values: &[f64],
        ) -> Self {
            let url = dataset_url(code);
            self.responses.insert(
                format!("{url}.ascii?lat"),
                Self::coord_response("lat", &[39.0, 39.5, 40.0]),
            );
            self.responses.insert(
                format!("{url}.ascii?lon"),
                Self::coord_response("lon", &[-122.0, -121.5, -121.0]),
            );
            self.responses.insert(
                format!("{url}.ascii?day"),
                Self::coord_response("day", &[1.0, 2.0, 3.0, 4.0, 5.0]),
            );
            self.responses.insert(
                format!("{url}.ascii?{var_name}{constraint}"),
                Self::series_response(var_name, constraint, values),
            );
            self
        }
    }

    #[async_trait]
    impl DapStore for FakeDapStore {
        async fn fetch_ascii(&self, url: &str) -> Result<String> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| IngestError::upstream("gridmet", format!("no response for {url}")))
        }
    }

    /// Five days of data, horizon 48h -> days [3:4]; lat 39.8 -> index 2,
    /// lon -121.6 -> index 1.
    fn full_store() -> FakeDapStore {
        FakeDapStore::new()
            .with_dataset("vs", "daily_mean_wind_speed", "[3:4][2][1]", &[3.0, 5.0])
            .with_dataset("th", "daily_mean_wind_direction", "[3:4][2][1]", &[350.0, 10.0])
            .with_dataset("tmmn", "daily_minimum_temperature", "[3:4][2][1]", &[280.0, 282.0])
            .with_dataset("tmmx", "daily_maximum_temperature", "[3:4][2][1]", &[290.0, 292.0])
            .with_dataset("rmin", "daily_minimum_relative_humidity", "[3:4][2][1]", &[20.0, 30.0])
            .with_dataset("rmax", "daily_maximum_relative_humidity", "[3:4][2][1]", &[60.0, 70.0])
    }

    #[test]
    fn test_parse_coordinate_payload() {
        let body = FakeDapStore::coord_response("lat", &[39.0, 39.5, 40.0]);
        assert_eq!(parse_dap_values(&body, "lat"), vec![39.0, 39.5, 40.0]);
    }

    #[test]
    fn test_parse_series_skips_index_prefixes() {
        let body =
            FakeDapStore::series_response("daily_mean_wind_speed", "[3:4][2][1]", &[3.2, 4.5]);
        assert_eq!(
            parse_dap_values(&body, "daily_mean_wind_speed"),
            vec![3.2, 4.5]
        );
    }

    #[test]
    fn test_parse_ignores_header_dimensions() {
        // The Dataset block mentions sizes; none of them may leak into data.
        let body = "Dataset {\n    Float64 lon[lon = 1386];\n} agg;\n\
                    ---------------------------------------------\n\
                    lon[3]\n-122.0, -121.5, -121.0\n";
        assert_eq!(parse_dap_values(body, "lon"), vec![-122.0, -121.5, -121.0]);
    }

    #[test]
    fn test_nearest_index_prefers_first_on_tie() {
        assert_eq!(nearest_index(&[39.0, 39.5, 40.0], 39.8), Some(2));
        assert_eq!(nearest_index(&[39.0, 40.0], 39.5), Some(0));
        assert_eq!(nearest_index(&[], 39.5), None);
    }

    #[test]
    fn test_handle_cache_lru_eviction() {
        let mut cache = HandleCache::new(2);
        let handle = || {
            Arc::new(DatasetHandle {
                lats: vec![0.0],
                lons: vec![0.0],
                time_len: 1,
            })
        };
        cache.insert("a", handle());
        cache.insert("b", handle());
        // Touch "a" so "b" becomes least recent.
        assert!(cache.get("a").is_some());
        cache.insert("c", handle());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[tokio::test]
    async fn test_fetch_summary_converts_units() {
        let provider = GridmetProvider::with_store(Arc::new(full_store()));
        let summary = provider.fetch_summary(39.8, -121.6, 48).await.unwrap();

        // 4 m/s mean -> 14.4 km/h.
        assert!((summary.wind_speed_kmh - 14.4).abs() < 1e-9);
        // Kelvin mean 286 -> 12.85 C.
        assert!((summary.temperature_c - 12.85).abs() < 1e-9);
        // Humidity: mean of band means (25 + 65) / 2.
        assert!((summary.humidity_pct - 45.0).abs() < 1e-9);
        // Circular mean of 350 and 10 wraps to ~0, not 180.
        assert!(summary.wind_direction_deg < 1.0 || summary.wind_direction_deg > 359.0);
        assert_eq!(summary.source, "gridmet");
    }

    #[tokio::test]
    async fn test_handles_reused_across_fetches() {
        let store = Arc::new(full_store());
        let provider = GridmetProvider::with_store(store.clone());

        provider.fetch_summary(39.8, -121.6, 48).await.unwrap();
        let after_first = store.fetches.load(Ordering::SeqCst);
        provider.fetch_summary(39.8, -121.6, 48).await.unwrap();
        let after_second = store.fetches.load(Ordering::SeqCst);

        // Second fetch reuses all six handles: only the six data reads recur.
        assert_eq!(after_second - after_first, 6);
    }

    #[tokio::test]
    async fn test_missing_time_coordinate_fails() {
        let mut store = full_store();
        let url = dataset_url("vs");
        store
            .responses
            .insert(format!("{url}.ascii?day"), "error".to_string());
        // No "time" fallback registered either -> upstream error on ?time.
        let provider = GridmetProvider::with_store(Arc::new(store));

        let result = provider.fetch_summary(39.8, -121.6, 48).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fill_values_rejected() {
        let store = full_store().with_dataset(
            "vs",
            "daily_mean_wind_speed",
            "[3:4][2][1]",
            &[32767.0, 32767.0],
        );
        let provider = GridmetProvider::with_store(Arc::new(store));

        let result = provider.fetch_summary(39.8, -121.6, 48).await;
        assert!(
            matches!(result, Err(IngestError::MalformedPayload(_))),
            "fill-only series must fail so the fallback chain engages"
        );
    }
}
