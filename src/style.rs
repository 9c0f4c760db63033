use crate::airspace::{AirspaceClass, AirspaceType};

/// 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Scale the alpha channel by `opacity` in `[0, 1]`.
    pub fn with_opacity(self, opacity: f32) -> Self {
        let a = (self.a as f32 * opacity.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..self }
    }
}

/// Render style of one airspace polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AirspaceStyle {
    pub fill: Rgba,
    pub border: Rgba,
    pub border_width: f32,
}

const fn style(fill: Rgba, border: Rgba, border_width: f32) -> AirspaceStyle {
    AirspaceStyle {
        fill,
        border,
        border_width,
    }
}

/// Neutral gray used when neither style table matches.
const DEFAULT_STYLE: AirspaceStyle = style(
    Rgba::new(128, 128, 128, 40),
    Rgba::new(128, 128, 128, 160),
    1.0,
);

/// Primary table: ICAO class to chart-convention colors.
fn class_style(class: AirspaceClass) -> AirspaceStyle {
    match class {
        AirspaceClass::A => style(Rgba::new(255, 255, 255, 26), Rgba::new(90, 90, 90, 200), 1.5),
        AirspaceClass::B => style(Rgba::new(0, 102, 255, 77), Rgba::new(0, 102, 255, 220), 2.0),
        AirspaceClass::C => style(Rgba::new(128, 0, 128, 77), Rgba::new(128, 0, 128, 220), 2.0),
        AirspaceClass::D => style(Rgba::new(0, 0, 255, 64), Rgba::new(0, 0, 255, 200), 1.5),
        AirspaceClass::E => style(Rgba::new(128, 0, 128, 38), Rgba::new(128, 0, 128, 160), 1.0),
        AirspaceClass::F => style(Rgba::new(64, 64, 160, 38), Rgba::new(64, 64, 160, 160), 1.0),
        AirspaceClass::G => style(Rgba::new(128, 128, 128, 26), Rgba::new(128, 128, 128, 120), 1.0),
    }
}

/// Fallback table: type abbreviation when the ICAO class is absent.
fn type_style(kind: AirspaceType) -> AirspaceStyle {
    match kind.abbreviation() {
        "CTR" => style(Rgba::new(255, 0, 0, 51), Rgba::new(200, 0, 0, 220), 2.0),
        "TMA" => style(Rgba::new(0, 64, 255, 51), Rgba::new(0, 64, 255, 200), 1.5),
        "CTA" => style(Rgba::new(0, 64, 255, 38), Rgba::new(0, 64, 255, 180), 1.5),
        "D" => style(Rgba::new(255, 80, 0, 64), Rgba::new(255, 80, 0, 220), 2.0),
        "R" => style(Rgba::new(255, 0, 0, 64), Rgba::new(255, 0, 0, 220), 2.0),
        "P" => style(Rgba::new(204, 0, 0, 90), Rgba::new(204, 0, 0, 240), 2.5),
        "FIR" => style(Rgba::new(0, 128, 128, 20), Rgba::new(0, 128, 128, 120), 1.0),
        _ => DEFAULT_STYLE,
    }
}

/// Resolve the render style for an airspace.
///
/// The ICAO class table is primary; the type table is the fallback when the
/// class is absent or out of range. `opacity` scales the fill alpha only,
/// borders stay fully weighted so thin airspaces remain visible.
pub fn resolve(type_code: i32, icao_class: Option<i32>, opacity: f32) -> AirspaceStyle {
    let base = icao_class
        .and_then(AirspaceClass::from_code)
        .map(class_style)
        .unwrap_or_else(|| type_style(AirspaceType::from_code(type_code)));

    AirspaceStyle {
        fill: base.fill.with_opacity(opacity),
        ..base
    }
}
