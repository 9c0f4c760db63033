use std::time::Instant;

use anyhow::Result;
use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay::ShapeType;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::f64::overlay::F64Overlay;
use i_overlay::i_float::f64_point::F64Point;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AirspaceError;
use crate::geometry_codec::{Bounds, COORD_SCALE};
use crate::style::{self, AirspaceStyle};
use crate::viewport::Geometry;

/// Cancellation is polled once per this many subject polygons.
const CANCEL_CHECK_INTERVAL: usize = 64;

/// One render-ready polygon: float rings plus its resolved style.
#[derive(Debug, Clone)]
pub struct ClippedPolygon {
    pub id: String,
    pub name: String,
    /// `(lng, lat)` in floating degrees.
    pub outer_ring: Vec<(f64, f64)>,
    pub holes: Vec<Vec<(f64, f64)>>,
    pub style: AirspaceStyle,
}

/// Subtract every strictly lower airspace from each polygon so the rendered
/// region shows the lowest airspace covering it.
///
/// Input must be sorted lowest altitude first (the viewport query orders it
/// that way); a stable re-sort runs as a safety net. Output preserves input
/// order. The boolean engine consumes the stored scaled-integer coordinates
/// directly; float degrees are produced only for emitted rings.
pub fn clip_viewport(
    geometries: Vec<Geometry>,
    viewport: &Bounds,
    opacity: f32,
    clipping_enabled: bool,
    cancel: &CancellationToken,
) -> Result<Vec<ClippedPolygon>> {
    let started = Instant::now();
    let input_count = geometries.len();
    debug!(
        event = "CLIPPING_STAGE",
        polygons = input_count,
        clipping_enabled,
        "starting clip pass"
    );

    // The query already filtered on bounds; keep this as a safety net for
    // callers that assemble their own geometry list.
    let mut subjects: Vec<Geometry> = geometries
        .into_iter()
        .filter(|g| g.bounds.intersects(viewport))
        .collect();
    subjects.sort_by_key(|g| g.lower_altitude_ft);

    let altitudes: Vec<i32> = subjects.iter().map(|g| g.lower_altitude_ft).collect();

    let mut output = Vec::with_capacity(subjects.len());
    let mut clipped_subjects = 0usize;
    let mut completely_clipped = 0usize;

    for i in 0..subjects.len() {
        if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(AirspaceError::Cancelled.into());
        }
        let subject = &subjects[i];
        let subject_style = style::resolve(subject.type_code, subject.icao_class, opacity);

        let mut masks: Vec<&Geometry> = Vec::new();
        if clipping_enabled {
            for j in 0..i {
                // Sorted ascending: the first non-lower entry ends the
                // strictly-lower prefix.
                if altitudes[j] >= altitudes[i] {
                    break;
                }
                if subjects[j].bounds.intersects(&subject.bounds) {
                    masks.push(&subjects[j]);
                }
            }
        }

        if masks.is_empty() {
            emit_verbatim(subject, subject_style, &mut output)?;
            continue;
        }

        clipped_subjects += 1;
        let subject_paths = scaled_paths(subject)?;
        let mut clip_paths = Vec::new();
        for mask in &masks {
            clip_paths.extend(scaled_paths(mask)?);
        }

        match subtract(subject_paths, clip_paths) {
            Some(shapes) => {
                let mut emitted_any = false;
                for shape in shapes {
                    if let Some(polygon) = shape_to_polygon(subject, subject_style, shape) {
                        output.push(polygon);
                        emitted_any = true;
                    }
                }
                if !emitted_any {
                    completely_clipped += 1;
                }
            }
            None => {
                // Never abort the batch over one bad polygon; paint it
                // unclipped instead.
                warn!(id = %subject.id, "clipping failed, emitting polygon verbatim");
                emit_verbatim(subject, subject_style, &mut output)?;
            }
        }
    }

    debug!(
        event = "CLIPPING_DETAILED_PERFORMANCE",
        input = input_count,
        output = output.len(),
        clipped_subjects,
        completely_clipped,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "clip pass finished"
    );
    Ok(output)
}

/// The subject's rings as boolean-engine paths, values taken straight from
/// the stored Int32 buffers (exact in f64).
fn scaled_paths(geometry: &Geometry) -> Result<Vec<Vec<F64Point>>> {
    Ok(geometry
        .ring_ranges()?
        .into_iter()
        .map(|range| {
            range
                .map(|p| {
                    F64Point::new(
                        geometry.coords[p * 2] as f64,
                        geometry.coords[p * 2 + 1] as f64,
                    )
                })
                .collect()
        })
        .collect())
}

/// One integer boolean difference: subject minus the union of all masks.
/// Non-zero fill makes overlapping masks behave as their union. Returns
/// `None` if the engine fails on degenerate input.
fn subtract(
    subject: Vec<Vec<F64Point>>,
    clips: Vec<Vec<F64Point>>,
) -> Option<Vec<Vec<Vec<F64Point>>>> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        let mut overlay = F64Overlay::new();
        for path in subject {
            overlay.add_path(path, ShapeType::Subject);
        }
        for path in clips {
            overlay.add_path(path, ShapeType::Clip);
        }
        let graph = overlay.into_graph(FillRule::NonZero);
        graph.extract_shapes(OverlayRule::Difference)
    }))
    .ok()
}

fn to_degrees(path: &[F64Point]) -> Vec<(f64, f64)> {
    path.iter()
        .map(|point| (point.x / COORD_SCALE, point.y / COORD_SCALE))
        .collect()
}

/// Convert one extracted shape (outer ring plus holes) back to degrees.
/// Degenerate rings with fewer than three points are discarded.
fn shape_to_polygon(
    subject: &Geometry,
    style: AirspaceStyle,
    shape: Vec<Vec<F64Point>>,
) -> Option<ClippedPolygon> {
    let mut rings = shape.into_iter();
    let outer = rings.next()?;
    if outer.len() < 3 {
        return None;
    }
    let holes = rings
        .filter(|ring| ring.len() >= 3)
        .map(|ring| to_degrees(&ring))
        .collect();
    Some(ClippedPolygon {
        id: subject.id.clone(),
        name: subject.name.clone(),
        outer_ring: to_degrees(&outer),
        holes,
        style,
    })
}

fn emit_verbatim(
    subject: &Geometry,
    style: AirspaceStyle,
    output: &mut Vec<ClippedPolygon>,
) -> Result<()> {
    for ring in subject.rings()? {
        if ring.len() < 3 {
            continue;
        }
        output.push(ClippedPolygon {
            id: subject.id.clone(),
            name: subject.name.clone(),
            outer_ring: ring,
            holes: Vec::new(),
            style,
        });
    }
    Ok(())
}
