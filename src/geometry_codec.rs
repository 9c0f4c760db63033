use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::AirspaceError;

/// Fixed-point scale for encoded coordinates: degrees × 10⁷, about 1.11 cm
/// of longitude at the equator.
pub const COORD_SCALE: f64 = 1e7;

/// Axis-aligned bounding box in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Bounding-box intersection test. Antimeridian-crossing boxes are not
    /// supported; callers reject those before querying.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.west <= other.east
            && self.east >= other.west
            && self.south <= other.north
            && self.north >= other.south
    }
}

/// The persisted form of one airspace's geometry: two little-endian Int32
/// blobs that feed both the database and the clipping engine.
#[derive(Debug, Clone)]
pub struct EncodedGeometry {
    /// Pairs of `(lng × 10⁷, lat × 10⁷)` as little-endian i32.
    pub coords: Vec<u8>,
    /// One little-endian i32 per ring: the point index where the ring starts.
    pub offsets: Vec<u8>,
    pub bounds: Bounds,
    pub point_count: usize,
}

fn valid_point(lng: f64, lat: f64) -> bool {
    lng.is_finite() && lat.is_finite() && (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat)
}

/// Encode a sequence of rings of `(lng, lat)` points in floating degrees.
///
/// Points outside the valid coordinate ranges are dropped with a warning;
/// rings left with fewer than three points are dropped; a polygon with no
/// surviving rings is rejected as corrupt.
pub fn encode_polygons(rings: &[Vec<(f64, f64)>]) -> Result<EncodedGeometry> {
    let mut coords = Vec::with_capacity(rings.iter().map(|r| r.len() * 8).sum());
    let mut offsets = Vec::with_capacity(rings.len() * 4);
    let mut point_count = 0usize;

    let (mut west, mut south) = (f64::MAX, f64::MAX);
    let (mut east, mut north) = (f64::MIN, f64::MIN);

    for ring in rings {
        let kept: Vec<(f64, f64)> = ring
            .iter()
            .copied()
            .filter(|&(lng, lat)| {
                let ok = valid_point(lng, lat);
                if !ok {
                    warn!(lng, lat, "dropping out-of-range coordinate");
                }
                ok
            })
            .collect();

        if kept.len() < 3 {
            if !ring.is_empty() {
                warn!(
                    original = ring.len(),
                    kept = kept.len(),
                    "dropping degenerate ring"
                );
            }
            continue;
        }

        offsets.extend_from_slice(&(point_count as i32).to_le_bytes());
        for (lng, lat) in kept {
            coords.extend_from_slice(&((lng * COORD_SCALE).round() as i32).to_le_bytes());
            coords.extend_from_slice(&((lat * COORD_SCALE).round() as i32).to_le_bytes());
            point_count += 1;

            west = west.min(lng);
            east = east.max(lng);
            south = south.min(lat);
            north = north.max(lat);
        }
    }

    if point_count == 0 {
        return Err(AirspaceError::CorruptGeometry("polygon has no valid rings".into()).into());
    }

    Ok(EncodedGeometry {
        coords,
        offsets,
        bounds: Bounds::new(west, south, east, north),
        point_count,
    })
}

/// Decode a coordinate blob into i32 values.
///
/// The store hands back bytes at arbitrary alignment, so each value is read
/// through `from_le_bytes` on a 4-byte copy rather than by reinterpreting
/// the slice as `&[i32]`.
pub fn decode_coords(blob: &[u8]) -> Result<Vec<i32>> {
    if blob.is_empty() || blob.len() % 8 != 0 {
        return Err(AirspaceError::CorruptGeometry(format!(
            "coordinate blob length {} is not a positive multiple of 8",
            blob.len()
        ))
        .into());
    }
    Ok(decode_i32_values(blob))
}

/// Decode an offsets blob into ring start indices.
pub fn decode_offsets(blob: &[u8]) -> Result<Vec<i32>> {
    if blob.is_empty() || blob.len() % 4 != 0 {
        return Err(AirspaceError::CorruptGeometry(format!(
            "offset blob length {} is not a positive multiple of 4",
            blob.len()
        ))
        .into());
    }
    Ok(decode_i32_values(blob))
}

fn decode_i32_values(blob: &[u8]) -> Vec<i32> {
    blob.chunks_exact(4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Split a decoded coordinate array into per-ring point ranges.
///
/// Offsets must be strictly increasing and in range; the final ring runs to
/// the end of the coordinate array.
pub fn ring_ranges(point_count: usize, offsets: &[i32]) -> Result<Vec<std::ops::Range<usize>>> {
    let mut ranges = Vec::with_capacity(offsets.len());
    for (i, &start) in offsets.iter().enumerate() {
        let start = start as usize;
        let end = offsets
            .get(i + 1)
            .map(|&next| next as usize)
            .unwrap_or(point_count);
        if start >= end || end > point_count {
            return Err(AirspaceError::CorruptGeometry(format!(
                "offset {i} spans points {start}..{end} of {point_count}"
            ))
            .into());
        }
        ranges.push(start..end);
    }
    Ok(ranges)
}

/// Decode both blobs back into rings of `(lng, lat)` floating degrees.
pub fn decode_rings(coords: &[u8], offsets: &[u8]) -> Result<Vec<Vec<(f64, f64)>>> {
    let values = decode_coords(coords)?;
    let offsets = decode_offsets(offsets)?;
    let point_count = values.len() / 2;

    ring_ranges(point_count, &offsets)?
        .into_iter()
        .map(|range| {
            Ok(range
                .map(|p| {
                    (
                        values[p * 2] as f64 / COORD_SCALE,
                        values[p * 2 + 1] as f64 / COORD_SCALE,
                    )
                })
                .collect())
        })
        .collect()
}

/// Content hash of a coordinate blob, used for change detection between
/// ingests of the same airspace.
pub fn geometry_hash(coords: &[u8]) -> String {
    hex::encode(Sha256::digest(coords))
}
