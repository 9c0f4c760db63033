//! Airspace geometry cache and rendering pipeline.
//!
//! Downloads per-country airspace datasets (GeoJSON), stores polygon
//! geometry in a compact Int32 fixed-point format inside an embedded
//! SQLite database, and answers viewport queries with altitude-sorted,
//! subtractively clipped, styled polygons ready for the map layer.

pub mod airspace;
pub mod altitude;
pub mod cache;
pub mod clipper;
pub mod country_catalog;
pub mod download_client;
pub mod error;
pub mod geometry_codec;
pub mod geometry_store;
pub mod ingest;
pub mod style;
pub mod viewport;

pub use airspace::{AirspaceClass, AirspaceRecord, AirspaceType};
pub use altitude::{AltitudeLimit, RawLimit, UNKNOWN_ALTITUDE_FT};
pub use cache::{AirspaceCache, CacheStatistics, MemoryPreferences, PreferenceStore};
pub use clipper::ClippedPolygon;
pub use country_catalog::{AVAILABLE_COUNTRIES, CountryCatalog, CountryInfo};
pub use download_client::{AirspaceDataClient, ProgressFn};
pub use error::AirspaceError;
pub use geometry_codec::{Bounds, EncodedGeometry};
pub use geometry_store::GeometryStore;
pub use ingest::{DownloadResult, Ingestor};
pub use style::{AirspaceStyle, Rgba};
pub use viewport::{Geometry, ViewportParams};
