//! Clipping invariants: disjoint pass-through, nested-hole subtraction,
//! determinism, order preservation, and cooperative cancellation.

mod common;

use airspace_cache::clipper::clip_viewport;
use airspace_cache::geometry_codec::COORD_SCALE;
use common::{bounds, rect_ring, ring_area, ring_geometry};
use tokio_util::sync::CancellationToken;

const AREA_TOLERANCE: f64 = 1e-6;
/// One fixed-point quantum in degrees.
const QUANTUM: f64 = 1.0 / COORD_SCALE;

/// Polygons with disjoint bounds come out exactly as they went in.
#[test]
fn disjoint_polygons_pass_through_unchanged() {
    let inputs = vec![
        ring_geometry("low", rect_ring(0.0, 0.0, 1.0, 1.0), 1000),
        ring_geometry("high", rect_ring(5.0, 5.0, 6.0, 6.0), 8000),
    ];
    let expected: Vec<Vec<(f64, f64)>> = inputs
        .iter()
        .map(|g| g.rings().unwrap().remove(0))
        .collect();

    let output = clip_viewport(
        inputs,
        &bounds(-10.0, -10.0, 10.0, 10.0),
        1.0,
        true,
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(output.len(), 2);
    assert_eq!(output[0].id, "low");
    assert_eq!(output[1].id, "high");
    for (polygon, expected_ring) in output.iter().zip(&expected) {
        assert!(polygon.holes.is_empty());
        assert_eq!(&polygon.outer_ring, expected_ring);
    }
}

/// A lower airspace nested inside a higher one punches a hole: the outer
/// output area equals area(outer) − area(inner).
#[test]
fn nested_lower_airspace_becomes_a_hole() {
    let inputs = vec![
        ring_geometry("outer", rect_ring(0.0, 0.0, 10.0, 10.0), 5000),
        ring_geometry("inner", rect_ring(2.0, 2.0, 8.0, 8.0), 1000),
    ];

    let output = clip_viewport(
        inputs,
        &bounds(-1.0, -1.0, 11.0, 11.0),
        1.0,
        true,
        &CancellationToken::new(),
    )
    .unwrap();

    // Lowest altitude first: the inner square comes out verbatim.
    assert_eq!(output.len(), 2);
    assert_eq!(output[0].id, "inner");
    assert!(output[0].holes.is_empty());
    assert!((ring_area(&output[0].outer_ring) - 36.0).abs() < AREA_TOLERANCE);

    let outer = &output[1];
    assert_eq!(outer.id, "outer");
    assert_eq!(outer.holes.len(), 1);
    assert!((ring_area(&outer.outer_ring) - 100.0).abs() < AREA_TOLERANCE);
    let net = ring_area(&outer.outer_ring) - ring_area(&outer.holes[0]);
    assert!((net - 64.0).abs() < AREA_TOLERANCE, "net area {net}");

    // The hole tracks the inner square to within one quantum.
    let (mut min_lng, mut min_lat) = (f64::MAX, f64::MAX);
    let (mut max_lng, mut max_lat) = (f64::MIN, f64::MIN);
    for &(lng, lat) in &outer.holes[0] {
        min_lng = min_lng.min(lng);
        max_lng = max_lng.max(lng);
        min_lat = min_lat.min(lat);
        max_lat = max_lat.max(lat);
    }
    for (got, expected) in [
        (min_lng, 2.0),
        (min_lat, 2.0),
        (max_lng, 8.0),
        (max_lat, 8.0),
    ] {
        assert!((got - expected).abs() <= QUANTUM, "{got} vs {expected}");
    }
}

/// Polygons at the same altitude never clip each other, even overlapping.
#[test]
fn equal_altitudes_do_not_clip() {
    let inputs = vec![
        ring_geometry("a", rect_ring(0.0, 0.0, 2.0, 2.0), 3000),
        ring_geometry("b", rect_ring(1.0, 1.0, 3.0, 3.0), 3000),
    ];
    let output = clip_viewport(
        inputs,
        &bounds(-1.0, -1.0, 4.0, 4.0),
        1.0,
        true,
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(output.len(), 2);
    for polygon in &output {
        assert!(polygon.holes.is_empty());
        assert!((ring_area(&polygon.outer_ring) - 4.0).abs() < AREA_TOLERANCE);
    }
}

/// A lower polygon fully covering a higher one consumes it entirely.
#[test]
fn fully_covered_polygon_is_completely_clipped() {
    let inputs = vec![
        ring_geometry("blanket", rect_ring(0.0, 0.0, 10.0, 10.0), 1000),
        ring_geometry("swallowed", rect_ring(3.0, 3.0, 4.0, 4.0), 9000),
    ];
    let output = clip_viewport(
        inputs,
        &bounds(-1.0, -1.0, 11.0, 11.0),
        1.0,
        true,
        &CancellationToken::new(),
    )
    .unwrap();

    let ids: Vec<&str> = output.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["blanket"]);
}

/// With clipping disabled every polygon is emitted verbatim.
#[test]
fn clipping_disabled_emits_everything() {
    let inputs = vec![
        ring_geometry("under", rect_ring(0.0, 0.0, 10.0, 10.0), 1000),
        ring_geometry("over", rect_ring(3.0, 3.0, 4.0, 4.0), 9000),
    ];
    let output = clip_viewport(
        inputs,
        &bounds(-1.0, -1.0, 11.0, 11.0),
        1.0,
        false,
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(output.len(), 2);
    assert!(output.iter().all(|p| p.holes.is_empty()));
}

/// Identical inputs produce identical outputs, bytewise on rings rounded
/// to 1e-6 degrees.
#[test]
fn clipping_is_deterministic() {
    let build = || {
        vec![
            ring_geometry("a", rect_ring(0.0, 0.0, 6.0, 6.0), 2000),
            ring_geometry("b", rect_ring(1.0, 1.0, 7.0, 7.0), 4000),
            ring_geometry("c", rect_ring(2.0, 2.0, 8.0, 8.0), 6000),
        ]
    };
    let viewport = bounds(-1.0, -1.0, 9.0, 9.0);
    let round = |polygons: Vec<airspace_cache::ClippedPolygon>| -> Vec<Vec<(i64, i64)>> {
        polygons
            .iter()
            .flat_map(|p| std::iter::once(&p.outer_ring).chain(p.holes.iter()))
            .map(|ring| {
                ring.iter()
                    .map(|&(lng, lat)| {
                        ((lng * 1e6).round() as i64, (lat * 1e6).round() as i64)
                    })
                    .collect()
            })
            .collect()
    };

    let first = round(
        clip_viewport(build(), &viewport, 1.0, true, &CancellationToken::new()).unwrap(),
    );
    let second = round(
        clip_viewport(build(), &viewport, 1.0, true, &CancellationToken::new()).unwrap(),
    );
    assert_eq!(first, second);
}

/// Output preserves ascending-altitude input order even when subjects are
/// handed over shuffled.
#[test]
fn output_order_is_altitude_ascending() {
    let inputs = vec![
        ring_geometry("high", rect_ring(20.0, 20.0, 21.0, 21.0), 9000),
        ring_geometry("ground", rect_ring(0.0, 0.0, 1.0, 1.0), 0),
        ring_geometry("mid", rect_ring(10.0, 10.0, 11.0, 11.0), 4000),
    ];
    let output = clip_viewport(
        inputs,
        &bounds(-1.0, -1.0, 30.0, 30.0),
        1.0,
        true,
        &CancellationToken::new(),
    )
    .unwrap();
    let ids: Vec<&str> = output.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["ground", "mid", "high"]);
}

/// The viewport filter is a safety net: out-of-view polygons are dropped.
#[test]
fn out_of_viewport_polygons_are_dropped() {
    let inputs = vec![
        ring_geometry("visible", rect_ring(0.0, 0.0, 1.0, 1.0), 1000),
        ring_geometry("far-away", rect_ring(100.0, 50.0, 101.0, 51.0), 1000),
    ];
    let output = clip_viewport(
        inputs,
        &bounds(-5.0, -5.0, 5.0, 5.0),
        1.0,
        true,
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].id, "visible");
}

/// A pre-cancelled token aborts before any polygon is emitted and no
/// partial result escapes.
#[test]
fn cancellation_returns_no_partial_results() {
    let inputs = vec![
        ring_geometry("a", rect_ring(0.0, 0.0, 1.0, 1.0), 1000),
        ring_geometry("b", rect_ring(2.0, 2.0, 3.0, 3.0), 2000),
    ];
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = clip_viewport(inputs, &bounds(-5.0, -5.0, 5.0, 5.0), 1.0, true, &cancel);
    let err = result.unwrap_err();
    assert!(airspace_cache::AirspaceError::is_cancellation(&err));
}

/// Styles ride along: opacity scales fills, and lower-altitude subjects
/// keep their own style after clipping.
#[test]
fn styles_are_resolved_per_subject() {
    let inputs = vec![
        ring_geometry("outer", rect_ring(0.0, 0.0, 10.0, 10.0), 5000),
        ring_geometry("inner", rect_ring(2.0, 2.0, 8.0, 8.0), 1000),
    ];
    let full = clip_viewport(
        inputs.clone(),
        &bounds(-1.0, -1.0, 11.0, 11.0),
        1.0,
        true,
        &CancellationToken::new(),
    )
    .unwrap();
    let half = clip_viewport(
        inputs,
        &bounds(-1.0, -1.0, 11.0, 11.0),
        0.5,
        true,
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(full[0].style.border, half[0].style.border);
    assert!(half[0].style.fill.a < full[0].style.fill.a);
}
