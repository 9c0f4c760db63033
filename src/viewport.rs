use anyhow::Result;
use rusqlite::types::Value;
use serde_json::json;
use tracing::warn;

use crate::airspace::AirspaceRow;
use crate::altitude::{AltitudeLimit, RawLimit};
use crate::geometry_codec::{self, Bounds, COORD_SCALE};

/// Filters for one viewport query. Combined into a single SQL statement by
/// [`build_query`].
#[derive(Debug, Clone, Default)]
pub struct ViewportParams {
    pub bounds: Option<Bounds>,
    /// Restrict to airspaces mapped to these countries. Empty means the
    /// caller has nothing loaded; the facade short-circuits before SQL.
    pub countries: Vec<String>,
    pub excluded_types: Vec<i32>,
    pub excluded_classes: Vec<i32>,
    pub max_altitude_ft: Option<i32>,
    /// Order results by lower altitude; required when clipping is enabled.
    pub sort_by_altitude: bool,
}

pub(crate) const SELECT_COLUMNS: &str = "SELECT a.id, a.name, a.type_code, a.icao_class, a.country, \
     a.activity, a.lower_raw_value, a.lower_raw_unit, a.lower_raw_reference, \
     a.upper_raw_value, a.upper_raw_unit, a.upper_raw_reference, \
     a.lower_altitude_ft, a.upper_altitude_ft, \
     a.bounds_west, a.bounds_south, a.bounds_east, a.bounds_north, \
     a.coords, a.offsets, a.geometry_hash, a.extra_properties, \
     a.fetch_time, a.last_accessed \
     FROM airspaces a";

fn placeholders(n: usize) -> String {
    let mut s = String::with_capacity(n * 2);
    for i in 0..n {
        if i > 0 {
            s.push(',');
        }
        s.push('?');
    }
    s
}

/// Build the single SQL statement for a viewport query: bounding-box
/// intersection, country-set restriction, type/class exclusion, altitude
/// ceiling, and the altitude ordering the clipper depends on.
pub fn build_query(params: &ViewportParams) -> (String, Vec<Value>) {
    let mut sql = String::from(SELECT_COLUMNS);
    let mut values: Vec<Value> = Vec::new();
    let mut clauses: Vec<String> = Vec::new();

    if let Some(b) = &params.bounds {
        clauses.push(
            "a.bounds_west <= ? AND a.bounds_east >= ? AND a.bounds_south <= ? AND a.bounds_north >= ?"
                .to_string(),
        );
        values.push(Value::Real(b.east));
        values.push(Value::Real(b.west));
        values.push(Value::Real(b.north));
        values.push(Value::Real(b.south));
    }

    if !params.countries.is_empty() {
        clauses.push(format!(
            "a.id IN (SELECT airspace_id FROM country_airspaces WHERE country_code IN ({}))",
            placeholders(params.countries.len())
        ));
        values.extend(params.countries.iter().map(|c| Value::Text(c.clone())));
    }

    if !params.excluded_types.is_empty() {
        clauses.push(format!(
            "a.type_code NOT IN ({})",
            placeholders(params.excluded_types.len())
        ));
        values.extend(params.excluded_types.iter().map(|&t| Value::Integer(t as i64)));
    }

    if !params.excluded_classes.is_empty() {
        clauses.push(format!(
            "(a.icao_class IS NULL OR a.icao_class NOT IN ({}))",
            placeholders(params.excluded_classes.len())
        ));
        values.extend(
            params
                .excluded_classes
                .iter()
                .map(|&c| Value::Integer(c as i64)),
        );
    }

    if let Some(max_alt) = params.max_altitude_ft {
        clauses.push("a.lower_altitude_ft <= ?".to_string());
        values.push(Value::Integer(max_alt as i64));
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if params.sort_by_altitude {
        sql.push_str(" ORDER BY a.lower_altitude_ft ASC NULLS LAST");
    }

    (sql, values)
}

/// A decoded airspace geometry, owned by one render request.
///
/// The coordinate buffers stay in the scaled-integer domain so the clipper
/// can feed them to the boolean engine without conversion; float rings are
/// produced on demand for rendering.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub id: String,
    pub name: String,
    pub type_code: i32,
    pub icao_class: Option<i32>,
    /// Interleaved `(lng, lat)` scaled by 10⁷, one pair per point.
    pub coords: Vec<i32>,
    /// Point index of each ring start.
    pub offsets: Vec<i32>,
    pub bounds: Bounds,
    pub lower_altitude_ft: i32,
    pub upper_altitude_ft: i32,
    pub properties: serde_json::Value,
}

impl Geometry {
    /// Per-ring point ranges into `coords` (pair indices).
    pub fn ring_ranges(&self) -> Result<Vec<std::ops::Range<usize>>> {
        geometry_codec::ring_ranges(self.coords.len() / 2, &self.offsets)
    }

    /// Rings as `(lng, lat)` floating degrees, converted lazily.
    pub fn rings(&self) -> Result<Vec<Vec<(f64, f64)>>> {
        Ok(self
            .ring_ranges()?
            .into_iter()
            .map(|range| {
                range
                    .map(|p| {
                        (
                            self.coords[p * 2] as f64 / COORD_SCALE,
                            self.coords[p * 2 + 1] as f64 / COORD_SCALE,
                        )
                    })
                    .collect()
            })
            .collect())
    }
}

/// Human-readable altitude label rebuilt from the stored raw triple, e.g.
/// "GND", "4500ft AMSL", "FL115".
fn limit_label(value: &Option<String>, unit: Option<i32>, reference: Option<i32>) -> String {
    AltitudeLimit::resolve(&RawLimit::from_stored(value.as_deref(), unit, reference)).to_string()
}

fn raw_limit_json(
    value: &Option<String>,
    unit: Option<i32>,
    reference: Option<i32>,
) -> serde_json::Value {
    let value_json = match value {
        Some(token) => token
            .parse::<f64>()
            .map(|n| json!(n))
            .unwrap_or_else(|_| json!(token)),
        None => serde_json::Value::Null,
    };
    json!({ "value": value_json, "unit": unit, "reference": reference })
}

/// Decode one stored row into an in-memory [`Geometry`].
///
/// Properties are reconstructed from the lifted columns and merged with the
/// opaque `extra_properties` blob; nothing else is JSON-parsed per row.
pub fn decode_row(row: &AirspaceRow) -> Result<Geometry> {
    let coords = geometry_codec::decode_coords(&row.coords)?;
    let offsets = geometry_codec::decode_offsets(&row.offsets)?;
    geometry_codec::ring_ranges(coords.len() / 2, &offsets)?;

    let mut props: serde_json::Map<String, serde_json::Value> = row
        .extra_properties
        .as_deref()
        .and_then(|blob| serde_json::from_str::<serde_json::Value>(blob).ok())
        .and_then(|value| value.as_object().cloned())
        .unwrap_or_default();
    props.insert("name".into(), json!(row.name));
    props.insert("type".into(), json!(row.type_code));
    props.insert("icaoClass".into(), json!(row.icao_class));
    props.insert(
        "lowerLimit".into(),
        raw_limit_json(&row.lower_raw_value, row.lower_raw_unit, row.lower_raw_reference),
    );
    props.insert(
        "upperLimit".into(),
        raw_limit_json(&row.upper_raw_value, row.upper_raw_unit, row.upper_raw_reference),
    );
    props.insert(
        "lowerLimitText".into(),
        json!(limit_label(&row.lower_raw_value, row.lower_raw_unit, row.lower_raw_reference)),
    );
    props.insert(
        "upperLimitText".into(),
        json!(limit_label(&row.upper_raw_value, row.upper_raw_unit, row.upper_raw_reference)),
    );
    if let Some(country) = &row.country {
        props.insert("country".into(), json!(country));
    }
    if let Some(activity) = row.activity {
        props.insert("activity".into(), json!(activity));
    }

    Ok(Geometry {
        id: row.id.clone(),
        name: row.name.clone(),
        type_code: row.type_code,
        icao_class: row.icao_class,
        coords,
        offsets,
        bounds: row.bounds,
        lower_altitude_ft: row.lower_altitude_ft,
        upper_altitude_ft: row.upper_altitude_ft,
        properties: serde_json::Value::Object(props),
    })
}

/// Decode a result set, quarantining corrupt rows by id instead of failing
/// the whole query.
pub fn decode_rows(rows: Vec<AirspaceRow>) -> Vec<Geometry> {
    let mut geometries = Vec::with_capacity(rows.len());
    for row in &rows {
        match decode_row(row) {
            Ok(geometry) => geometries.push(geometry),
            Err(err) => warn!(id = %row.id, error = %err, "skipping corrupt airspace row"),
        }
    }
    geometries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_params_produce_bare_select() {
        let (sql, values) = build_query(&ViewportParams::default());
        assert!(!sql.contains("WHERE"));
        assert!(!sql.contains("ORDER BY"));
        assert!(values.is_empty());
    }

    #[test]
    fn all_filters_land_in_one_statement() {
        let params = ViewportParams {
            bounds: Some(Bounds::new(5.0, 45.0, 11.0, 48.0)),
            countries: vec!["CH".into(), "AT".into()],
            excluded_types: vec![7],
            excluded_classes: vec![4, 5],
            max_altitude_ft: Some(15_000),
            sort_by_altitude: true,
        };
        let (sql, values) = build_query(&params);
        assert!(sql.contains("bounds_west <= ?"));
        assert!(sql.contains("country_code IN (?,?)"));
        assert!(sql.contains("type_code NOT IN (?)"));
        assert!(sql.contains("icao_class IS NULL OR a.icao_class NOT IN (?,?)"));
        assert!(sql.contains("lower_altitude_ft <= ?"));
        assert!(sql.ends_with("ORDER BY a.lower_altitude_ft ASC NULLS LAST"));
        assert_eq!(values.len(), 4 + 2 + 1 + 2 + 1);
    }

    #[test]
    fn decode_row_rebuilds_properties_from_columns() {
        let encoded =
            geometry_codec::encode_polygons(&[vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)]]).unwrap();
        let row = AirspaceRow {
            id: "r1".into(),
            name: "Row".into(),
            type_code: 4,
            icao_class: Some(3),
            country: Some("CH".into()),
            activity: Some(2),
            lower_raw_value: Some("GND".into()),
            lower_raw_unit: Some(1),
            lower_raw_reference: Some(0),
            upper_raw_value: Some("115".into()),
            upper_raw_unit: Some(6),
            upper_raw_reference: Some(2),
            lower_altitude_ft: 0,
            upper_altitude_ft: 11_500,
            bounds: encoded.bounds,
            coords: encoded.coords.clone(),
            offsets: encoded.offsets.clone(),
            geometry_hash: geometry_codec::geometry_hash(&encoded.coords),
            extra_properties: Some(r#"{"remarks":"winter"}"#.into()),
            fetch_time: 1,
            last_accessed: 1,
        };

        let geometry = decode_row(&row).unwrap();
        assert_eq!(geometry.rings().unwrap()[0].len(), 3);
        assert_eq!(geometry.properties["lowerLimitText"], "GND");
        assert_eq!(geometry.properties["upperLimitText"], "FL115");
        assert_eq!(geometry.properties["remarks"], "winter");
        assert_eq!(geometry.properties["country"], "CH");
        assert_eq!(geometry.properties["icaoClass"], 3);
    }

    #[test]
    fn bounds_params_follow_the_intersection_rule() {
        let params = ViewportParams {
            bounds: Some(Bounds::new(1.0, 2.0, 3.0, 4.0)),
            ..Default::default()
        };
        let (_, values) = build_query(&params);
        // west <= ve, east >= vw, south <= vn, north >= vs
        assert_eq!(
            values,
            vec![
                Value::Real(3.0),
                Value::Real(1.0),
                Value::Real(4.0),
                Value::Real(2.0)
            ]
        );
    }
}
