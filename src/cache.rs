use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use once_cell::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clipper::{self, ClippedPolygon};
use crate::country_catalog::{AVAILABLE_COUNTRIES, CountryCatalog, CountryInfo};
use crate::download_client::{AirspaceDataClient, ProgressFn};
use crate::error::AirspaceError;
use crate::geometry_codec::Bounds;
use crate::geometry_store::GeometryStore;
use crate::ingest::{DownloadResult, Ingestor};
use crate::viewport::ViewportParams;

/// OpenAIP's public dataset bucket; countries are published as
/// `{code}_asp.geojson`.
pub const DEFAULT_BASE_URL: &str =
    "https://storage.googleapis.com/29f98e10-a489-4c82-ae5e-489dbcd4912f";

const DB_FILE_NAME: &str = "airspace_cache.db";

/// Bytes a coordinate pair occupies as GeoJSON text, used to estimate the
/// binary format's compression ratio.
const JSON_BYTES_PER_POINT: i64 = 24;
/// Bytes per point in the Int32 format (two i32 values).
const BLOB_BYTES_PER_POINT: i64 = 8;

/// The selected-country preference lives with the UI; this seam lets the
/// cache read it without owning its persistence.
pub trait PreferenceStore: Send + Sync {
    fn selected_countries(&self) -> Vec<String>;
    fn set_selected_countries(&self, codes: Vec<String>);
}

/// In-process preference store, the default for tests and headless use.
#[derive(Default)]
pub struct MemoryPreferences {
    codes: Mutex<Vec<String>>,
}

impl PreferenceStore for MemoryPreferences {
    fn selected_countries(&self) -> Vec<String> {
        self.codes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_selected_countries(&self, codes: Vec<String>) {
        *self
            .codes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = codes;
    }
}

/// Cache health numbers for the settings UI.
#[derive(Debug, Clone, Default)]
pub struct CacheStatistics {
    pub total_geometries: i64,
    pub total_bytes: i64,
    pub db_size_mb: f64,
    /// Estimated GeoJSON text size over stored blob size.
    pub compression_ratio: f64,
    /// Fraction of id lookups satisfied from the store.
    pub hit_rate: f64,
    /// Epoch ms of the most recent ingest, if any.
    pub last_updated: Option<i64>,
}

/// The airspace subsystem's front door: country downloads, the viewport
/// hot path, and cache maintenance.
pub struct AirspaceCache {
    store: GeometryStore,
    catalog: CountryCatalog,
    client: Arc<AirspaceDataClient>,
    ingestor: Ingestor,
    prefs: Arc<dyn PreferenceStore>,
}

static GLOBAL: OnceCell<AirspaceCache> = OnceCell::new();

fn default_db_path() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home)
            .join(".local/share/airspace-cache")
            .join(DB_FILE_NAME),
        Err(_) => PathBuf::from(DB_FILE_NAME),
    }
}

impl AirspaceCache {
    pub fn new(db_path: impl Into<PathBuf>, base_url: &str) -> Self {
        Self::with_preferences(db_path, base_url, Arc::new(MemoryPreferences::default()))
    }

    pub fn with_preferences(
        db_path: impl Into<PathBuf>,
        base_url: &str,
        prefs: Arc<dyn PreferenceStore>,
    ) -> Self {
        let store = GeometryStore::new(db_path);
        let catalog = CountryCatalog::new(store.clone());
        let client = Arc::new(AirspaceDataClient::new(base_url));
        let ingestor = Ingestor::new(client.clone(), store.clone(), catalog.clone());
        Self {
            store,
            catalog,
            client,
            ingestor,
            prefs,
        }
    }

    /// Process-wide instance backed by the app data directory. Tests build
    /// their own instances against temporary paths instead.
    pub fn global() -> &'static AirspaceCache {
        GLOBAL.get_or_init(|| AirspaceCache::new(default_db_path(), DEFAULT_BASE_URL))
    }

    pub fn list_available_countries() -> &'static [CountryInfo] {
        AVAILABLE_COUNTRIES
    }

    pub fn selected_countries(&self) -> Vec<String> {
        self.prefs.selected_countries()
    }

    pub fn set_selected_countries(&self, codes: Vec<String>) {
        self.prefs.set_selected_countries(codes);
    }

    /// True when the last download attempt exhausted its retries on
    /// transport errors; cleared by the next success.
    pub fn is_offline(&self) -> bool {
        self.client.is_offline()
    }

    pub async fn download_country(
        &self,
        code: &str,
        progress: Option<&ProgressFn>,
        cancel: &CancellationToken,
    ) -> DownloadResult {
        self.ingestor.ingest_country(code, progress, cancel).await
    }

    pub async fn delete_country(&self, code: &str) -> Result<()> {
        self.catalog.delete_country(code.to_uppercase()).await?;
        Ok(())
    }

    pub async fn needs_update(&self, code: &str) -> Result<bool> {
        self.ingestor.needs_update(code).await
    }

    /// The render hot path: one spatial query, one clipping pass, styled
    /// polygons out. Never fails across this boundary; on error the map
    /// keeps its previous frame and this returns empty.
    #[allow(clippy::too_many_arguments)]
    pub async fn fetch_polygons_for_viewport(
        &self,
        bounds: Bounds,
        opacity: f32,
        excluded_types: Vec<i32>,
        excluded_classes: Vec<i32>,
        max_altitude_ft: Option<i32>,
        clipping_enabled: bool,
        cancel: &CancellationToken,
    ) -> Vec<ClippedPolygon> {
        let started = Instant::now();
        let countries = self.prefs.selected_countries();
        info!(
            event = "DIRECT_POLYGON_FETCH",
            countries = countries.len(),
            clipping_enabled,
            "viewport fetch"
        );
        if countries.is_empty() {
            return Vec::new();
        }

        let params = ViewportParams {
            bounds: Some(bounds),
            countries,
            excluded_types,
            excluded_classes,
            max_altitude_ft,
            sort_by_altitude: clipping_enabled,
        };

        let polygons = match self.store.query_viewport(params).await {
            Ok(geometries) => {
                match clipper::clip_viewport(geometries, &bounds, opacity, clipping_enabled, cancel)
                {
                    Ok(polygons) => polygons,
                    Err(err) if AirspaceError::is_cancellation(&err) => {
                        debug!("viewport clip cancelled");
                        return Vec::new();
                    }
                    Err(err) => {
                        warn!(error = %err, "viewport clip failed");
                        return Vec::new();
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "viewport query failed");
                return Vec::new();
            }
        };

        info!(
            event = "DIRECT_POLYGON_COMPLETE",
            polygons = polygons.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "viewport fetch complete"
        );
        polygons
    }

    pub async fn get_cache_statistics(&self) -> Result<CacheStatistics> {
        let stats = self.store.statistics().await?;
        let estimated_json_bytes = stats.point_count * JSON_BYTES_PER_POINT;
        let blob_point_bytes = stats.point_count * BLOB_BYTES_PER_POINT;
        Ok(CacheStatistics {
            total_geometries: stats.total_geometries,
            total_bytes: stats.blob_bytes,
            db_size_mb: stats.db_file_bytes as f64 / (1024.0 * 1024.0),
            compression_ratio: if blob_point_bytes > 0 {
                estimated_json_bytes as f64 / blob_point_bytes as f64
            } else {
                0.0
            },
            hit_rate: if stats.lookups > 0 {
                stats.lookup_hits as f64 / stats.lookups as f64
            } else {
                0.0
            },
            last_updated: stats.last_updated,
        })
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.store.clear_all().await
    }

    pub async fn clean_expired_cache(&self) -> Result<usize> {
        self.store.clean_expired().await
    }

    pub fn store(&self) -> &GeometryStore {
        &self.store
    }

    pub fn catalog(&self) -> &CountryCatalog {
        &self.catalog
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }
}
