//! Common test utilities for store-backed integration tests.
//!
//! Each test gets its own temporary database file, so tests stay isolated
//! and can run in parallel.

#![allow(dead_code)]

use std::sync::Once;

use airspace_cache::geometry_codec::{self, Bounds};
use airspace_cache::{AirspaceRecord, Geometry, GeometryStore, RawLimit};
use tempfile::TempDir;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness; `RUST_LOG` controls
/// verbosity.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A store backed by a fresh temporary directory. The directory (and the
/// database file in it) is removed when the guard drops.
pub struct TestStore {
    pub store: GeometryStore,
    _dir: TempDir,
}

impl TestStore {
    pub fn new() -> Self {
        init_tracing();
        let dir = TempDir::new().expect("create temp dir");
        let store = GeometryStore::new(dir.path().join("airspace_cache.db"));
        Self { store, _dir: dir }
    }

    pub fn with_size_limits(max_bytes: u64, target_bytes: u64) -> Self {
        init_tracing();
        let dir = TempDir::new().expect("create temp dir");
        let store = GeometryStore::with_size_limits(
            dir.path().join("airspace_cache.db"),
            max_bytes,
            target_bytes,
        );
        Self { store, _dir: dir }
    }
}

/// Closed rectangle ring as `(lng, lat)` pairs, first point not repeated.
pub fn rect_ring(west: f64, south: f64, east: f64, north: f64) -> Vec<(f64, f64)> {
    vec![(west, south), (west, north), (east, north), (east, south)]
}

/// A ready-to-store record over a single rectangular ring.
pub fn rect_record(
    id: &str,
    west: f64,
    south: f64,
    east: f64,
    north: f64,
    lower_ft: i32,
    upper_ft: i32,
) -> AirspaceRecord {
    let encoded =
        geometry_codec::encode_polygons(&[rect_ring(west, south, east, north)]).expect("encode");
    AirspaceRecord {
        id: id.to_string(),
        name: format!("Airspace {id}"),
        type_code: 4,
        icao_class: Some(3),
        country: None,
        activity: None,
        lower_limit: RawLimit::ground(),
        upper_limit: RawLimit::default(),
        lower_altitude_ft: lower_ft,
        upper_altitude_ft: upper_ft,
        geometry_hash: geometry_codec::geometry_hash(&encoded.coords),
        bounds: encoded.bounds,
        coords: encoded.coords,
        offsets: encoded.offsets,
        extra_properties: None,
    }
}

/// An in-memory geometry over one ring, for exercising the clipper without
/// a store.
pub fn ring_geometry(id: &str, ring: Vec<(f64, f64)>, lower_ft: i32) -> Geometry {
    let encoded = geometry_codec::encode_polygons(&[ring]).expect("encode");
    let coords = geometry_codec::decode_coords(&encoded.coords).expect("decode coords");
    let offsets = geometry_codec::decode_offsets(&encoded.offsets).expect("decode offsets");
    Geometry {
        id: id.to_string(),
        name: format!("Airspace {id}"),
        type_code: 4,
        icao_class: Some(3),
        coords,
        offsets,
        bounds: encoded.bounds,
        lower_altitude_ft: lower_ft,
        upper_altitude_ft: lower_ft + 5000,
        properties: serde_json::json!({}),
    }
}

/// Absolute shoelace area of a ring in square degrees.
pub fn ring_area(ring: &[(f64, f64)]) -> f64 {
    let mut sum = 0.0;
    for i in 0..ring.len() {
        let (x1, y1) = ring[i];
        let (x2, y2) = ring[(i + 1) % ring.len()];
        sum += x1 * y2 - x2 * y1;
    }
    (sum / 2.0).abs()
}

/// Viewport bounds helper.
pub fn bounds(west: f64, south: f64, east: f64, north: f64) -> Bounds {
    Bounds::new(west, south, east, north)
}
