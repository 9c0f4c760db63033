use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::airspace::AirspaceRecord;
use crate::altitude::{AltitudeLimit, RawLimit};
use crate::country_catalog::CountryCatalog;
use crate::download_client::{AirspaceDataClient, ProgressFn};
use crate::error::AirspaceError;
use crate::geometry_codec;
use crate::geometry_store::GeometryStore;

/// Country metadata older than this makes `needs_update` fire.
const STALE_AFTER_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Outcome of one country ingestion, reported rather than thrown.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub success: bool,
    pub country: String,
    pub airspace_count: Option<usize>,
    pub size_mb: Option<f64>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl DownloadResult {
    fn failure(country: &str, duration_ms: u64, error: String) -> Self {
        Self {
            success: false,
            country: country.to_string(),
            airspace_count: None,
            size_mb: None,
            duration_ms,
            error: Some(error),
        }
    }
}

/// Canonical per-feature properties; both the nested `Feature.properties`
/// shape and the legacy top-level shape flatten into this.
#[derive(Debug, Default, Deserialize)]
struct FeatureProperties {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    type_code: Option<i32>,
    #[serde(
        default,
        rename = "icaoClass",
        deserialize_with = "deserialize_icao_class"
    )]
    icao_class: Option<i32>,
    #[serde(default, rename = "lowerLimit")]
    lower_limit: Option<RawLimit>,
    #[serde(default, rename = "upperLimit")]
    upper_limit: Option<RawLimit>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    activity: Option<i64>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

/// Some datasets carry the ICAO class as a letter instead of the numeric
/// code; accept both.
fn deserialize_icao_class<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().map(|v| v as i32),
        Some(Value::String(s)) => match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(0),
            "B" => Some(1),
            "C" => Some(2),
            "D" => Some(3),
            "E" => Some(4),
            "F" => Some(5),
            "G" => Some(6),
            _ => None,
        },
        _ => None,
    })
}

/// Downloads country datasets and turns them into stored geometry.
pub struct Ingestor {
    client: Arc<AirspaceDataClient>,
    store: GeometryStore,
    catalog: CountryCatalog,
}

impl Ingestor {
    pub fn new(
        client: Arc<AirspaceDataClient>,
        store: GeometryStore,
        catalog: CountryCatalog,
    ) -> Self {
        Self {
            client,
            store,
            catalog,
        }
    }

    /// Download and store one country. Never fails across the boundary:
    /// the outcome, including any error message, lands in the result.
    pub async fn ingest_country(
        &self,
        code: &str,
        progress: Option<&ProgressFn>,
        cancel: &CancellationToken,
    ) -> DownloadResult {
        let started = Instant::now();
        info!(event = "COUNTRY_DOWNLOAD_START", country = %code, "downloading country dataset");

        let download = match self.client.fetch_country(code, progress, cancel).await {
            Ok(download) => download,
            Err(err) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                if AirspaceError::is_cancellation(&err) {
                    debug!(country = %code, "download cancelled");
                    return DownloadResult::failure(code, duration_ms, "cancelled".into());
                }
                warn!(country = %code, error = %err, "country download failed");
                return DownloadResult::failure(code, duration_ms, err.to_string());
            }
        };

        let size_bytes = download.bytes.len();
        let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
        info!(
            event = "COUNTRY_DOWNLOAD_COMPLETE",
            country = %code,
            bytes = size_bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "country dataset downloaded"
        );

        if cancel.is_cancelled() {
            return DownloadResult::failure(
                code,
                started.elapsed().as_millis() as u64,
                "cancelled".into(),
            );
        }

        info!(event = "COUNTRY_STORE_START", country = %code, "storing country dataset");
        match self
            .ingest_bytes(
                code,
                &download.bytes,
                download.etag,
                download.last_modified,
            )
            .await
        {
            Ok(count) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    event = "COUNTRY_STORE_COMPLETE",
                    country = %code,
                    airspaces = count,
                    duration_ms,
                    "country dataset stored"
                );
                DownloadResult {
                    success: true,
                    country: code.to_string(),
                    airspace_count: Some(count),
                    size_mb: Some(size_mb),
                    duration_ms,
                    error: None,
                }
            }
            Err(err) => {
                warn!(country = %code, error = %err, "country store failed");
                DownloadResult::failure(
                    code,
                    started.elapsed().as_millis() as u64,
                    err.to_string(),
                )
            }
        }
    }

    /// Decode a feature collection and persist it: geometry batch, country
    /// mappings, country metadata. This is the store half of
    /// [`ingest_country`], directly usable with on-disk datasets.
    pub async fn ingest_bytes(
        &self,
        code: &str,
        bytes: &[u8],
        etag: Option<String>,
        last_modified: Option<String>,
    ) -> Result<usize> {
        let records = decode_feature_collection(code, bytes)?;
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

        let existing = self.store.existing_ids(ids.clone()).await?;
        debug!(
            country = %code,
            new = ids.len() - existing.len(),
            updated = existing.len(),
            "computed ingest delta"
        );

        let count = self.store.put_batch(records).await?;
        // Metadata first: the mapping rows reference the country row.
        self.catalog
            .put_country_metadata(
                code.to_uppercase(),
                count as i64,
                etag,
                last_modified,
                Some(bytes.len() as i64),
            )
            .await?;
        self.catalog
            .put_country_mappings(code.to_uppercase(), ids)
            .await?;
        Ok(count)
    }

    /// True when the country has never been fetched or its data is more
    /// than thirty days old.
    pub async fn needs_update(&self, code: &str) -> Result<bool> {
        match self
            .catalog
            .country_metadata(code.to_uppercase())
            .await?
        {
            Some(meta) => {
                Ok(crate::geometry_store::now_ms() - meta.fetch_time > STALE_AFTER_MS)
            }
            None => Ok(true),
        }
    }
}

/// Decode a GeoJSON `FeatureCollection` into ready-to-store records.
///
/// Individual feature failures are logged and skipped; only a malformed
/// collection fails the whole dataset.
pub fn decode_feature_collection(code: &str, bytes: &[u8]) -> Result<Vec<AirspaceRecord>> {
    let root: Value = serde_json::from_slice(bytes).context("parse dataset JSON")?;
    if root.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err(AirspaceError::Protocol(format!(
            "expected FeatureCollection, got {:?}",
            root.get("type")
        ))
        .into());
    }
    let features = root
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| AirspaceError::Protocol("FeatureCollection without features".into()))?;

    let mut records = Vec::with_capacity(features.len());
    for feature in features {
        match decode_feature(code, feature) {
            Ok(record) => records.push(record),
            Err(err) => {
                warn!(country = %code, error = %err, "skipping feature");
            }
        }
    }
    Ok(records)
}

fn decode_feature(code: &str, feature: &Value) -> Result<AirspaceRecord> {
    // Nested GeoJSON Feature or the legacy top-level property shape.
    let props_value = if feature.get("type").and_then(Value::as_str) == Some("Feature")
        && feature.get("properties").is_some_and(Value::is_object)
    {
        feature["properties"].clone()
    } else {
        feature.clone()
    };

    let id = feature
        .get("id")
        .or_else(|| props_value.get("_id"))
        .or_else(|| props_value.get("id"))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| AirspaceError::Protocol("feature has no id".into()))?;

    let props: FeatureProperties = serde_json::from_value(props_value)
        .map_err(|err| AirspaceError::Protocol(format!("feature {id}: {err}")))?;

    let geometry = feature
        .get("geometry")
        .filter(|g| !g.is_null())
        .ok_or_else(|| AirspaceError::Protocol(format!("feature {id} has no geometry")))?;
    let rings = polygon_rings(geometry)
        .map_err(|err| err.context(format!("feature {id}")))?;

    let encoded = geometry_codec::encode_polygons(&rings)
        .map_err(|err| err.context(format!("feature {id}")))?;

    let lower = props.lower_limit.unwrap_or_default();
    let upper = props.upper_limit.unwrap_or_default();
    let lower_altitude_ft = AltitudeLimit::resolve(&lower).feet();
    let upper_altitude_ft = AltitudeLimit::resolve(&upper).feet();

    // Legacy-shaped features flatten their structural keys into the
    // leftover bag; those are already lifted or stored as blobs.
    let mut extra = props.extra;
    for key in ["geometry", "id", "_id"] {
        extra.remove(key);
    }
    let extra_properties = if extra.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&extra)?)
    };

    Ok(AirspaceRecord {
        geometry_hash: geometry_codec::geometry_hash(&encoded.coords),
        name: props.name.unwrap_or_else(|| id.clone()),
        id,
        type_code: props.type_code.unwrap_or(0),
        icao_class: props.icao_class,
        country: props
            .country
            .or_else(|| Some(code.to_uppercase()))
            .filter(|c| !c.is_empty()),
        activity: props.activity,
        lower_limit: lower,
        upper_limit: upper,
        lower_altitude_ft,
        upper_altitude_ft,
        bounds: encoded.bounds,
        coords: encoded.coords,
        offsets: encoded.offsets,
        extra_properties,
    })
}

/// Extract the outer rings of a `Polygon` or `MultiPolygon`. Inner rings
/// (holes) are not stored; overlapping lower airspaces reproduce them at
/// render time through clipping.
fn polygon_rings(geometry: &Value) -> Result<Vec<Vec<(f64, f64)>>> {
    let kind = geometry.get("type").and_then(Value::as_str).unwrap_or("");
    let coordinates = geometry
        .get("coordinates")
        .ok_or_else(|| AirspaceError::Protocol("geometry without coordinates".into()))?;

    let outer_rings: Vec<Vec<[f64; 2]>> = match kind {
        "Polygon" => {
            let rings: Vec<Vec<[f64; 2]>> = serde_json::from_value(coordinates.clone())
                .map_err(|err| AirspaceError::Protocol(format!("bad Polygon: {err}")))?;
            rings.into_iter().take(1).collect()
        }
        "MultiPolygon" => {
            let polygons: Vec<Vec<Vec<[f64; 2]>>> = serde_json::from_value(coordinates.clone())
                .map_err(|err| AirspaceError::Protocol(format!("bad MultiPolygon: {err}")))?;
            polygons
                .into_iter()
                .filter_map(|rings| rings.into_iter().next())
                .collect()
        }
        other => {
            return Err(
                AirspaceError::Protocol(format!("unsupported geometry type {other:?}")).into(),
            );
        }
    };

    if outer_rings.is_empty() {
        return Err(AirspaceError::Protocol("geometry has no rings".into()).into());
    }

    Ok(outer_rings
        .into_iter()
        .map(|mut ring| {
            // GeoJSON closes rings by repeating the first point; stored
            // rings are implicitly closed.
            if ring.len() > 1 && ring.first() == ring.last() {
                ring.pop();
            }
            ring.into_iter().map(|[lng, lat]| (lng, lat)).collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(id: &str, lower_ft: f64, ring: Value) -> Value {
        json!({
            "type": "Feature",
            "id": id,
            "properties": {
                "name": format!("Test {id}"),
                "type": 4,
                "icaoClass": 3,
                "lowerLimit": { "value": lower_ft, "unit": 1, "reference": 1 },
                "upperLimit": { "value": 19500, "unit": 1, "reference": 1 },
                "remarks": "seasonal"
            },
            "geometry": { "type": "Polygon", "coordinates": [ring] }
        })
    }

    #[test]
    fn rejects_non_feature_collections() {
        let err = decode_feature_collection("ch", br#"{"type":"Feature"}"#).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AirspaceError>(),
            Some(AirspaceError::Protocol(_))
        ));
    }

    #[test]
    fn decodes_nested_feature_shape() {
        let collection = json!({
            "type": "FeatureCollection",
            "features": [feature("asp-1", 2000.0, json!([[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.0, 0.0]]))]
        });
        let records =
            decode_feature_collection("ch", collection.to_string().as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, "asp-1");
        assert_eq!(record.type_code, 4);
        assert_eq!(record.icao_class, Some(3));
        assert_eq!(record.lower_altitude_ft, 2000);
        assert_eq!(record.country.as_deref(), Some("CH"));
        // Closing duplicate dropped: 3 points stored.
        assert_eq!(record.coords.len(), 3 * 8);
        // Unlifted keys survive in the extra blob.
        assert!(record.extra_properties.as_deref().unwrap().contains("seasonal"));
    }

    #[test]
    fn decodes_legacy_top_level_shape() {
        let collection = json!({
            "type": "FeatureCollection",
            "features": [{
                "id": "legacy-1",
                "name": "Legacy",
                "type": 1,
                "lowerLimit": { "value": "GND", "unit": 1, "reference": 0 },
                "geometry": { "type": "Polygon",
                              "coordinates": [[[7.0, 46.0], [7.1, 46.0], [7.1, 46.1], [7.0, 46.0]]] }
            }]
        });
        let records =
            decode_feature_collection("ch", collection.to_string().as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Legacy");
        assert_eq!(records[0].lower_altitude_ft, 0);
    }

    #[test]
    fn multi_polygon_outer_rings_become_separate_rings() {
        let geometry = json!({
            "type": "MultiPolygon",
            "coordinates": [
                [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]],
                 [[0.2, 0.2], [0.8, 0.2], [0.8, 0.8], [0.2, 0.2]]],
                [[[5.0, 5.0], [6.0, 5.0], [6.0, 6.0], [5.0, 5.0]]]
            ]
        });
        let rings = polygon_rings(&geometry).unwrap();
        // Two outer rings; the hole in the first polygon is dropped.
        assert_eq!(rings.len(), 2);
        assert_eq!(rings[0].len(), 3);
        assert_eq!(rings[1][0], (5.0, 5.0));
    }

    #[test]
    fn features_without_ids_are_skipped_not_fatal() {
        let collection = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": { "name": "nameless" },
                  "geometry": { "type": "Polygon",
                                "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]] } },
                feature("kept", 1000.0, json!([[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.0, 0.0]]))
            ]
        });
        let records =
            decode_feature_collection("at", collection.to_string().as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "kept");
    }

    #[test]
    fn icao_class_accepts_letters_and_numbers() {
        let mut by_letter = feature(
            "letter",
            1000.0,
            json!([[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.0, 0.0]]),
        );
        by_letter["properties"]["icaoClass"] = json!("C");
        let collection = json!({ "type": "FeatureCollection", "features": [by_letter] });
        let records =
            decode_feature_collection("ch", collection.to_string().as_bytes()).unwrap();
        assert_eq!(records[0].icao_class, Some(2));
    }

    #[test]
    fn non_polygonal_geometry_is_rejected() {
        let geometry = json!({ "type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]] });
        assert!(polygon_rings(&geometry).is_err());
    }
}
