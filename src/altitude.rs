use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel for unknown or unbounded altitudes. Sorts above every real
/// altitude so unbounded airspaces clip nothing below them.
pub const UNKNOWN_ALTITUDE_FT: i32 = 999_999;

pub const FEET_PER_METER: f64 = 3.28084;

/// OpenAIP altitude unit codes.
pub const UNIT_FT: i32 = 1;
pub const UNIT_M: i32 = 2;
pub const UNIT_FL: i32 = 6;

/// OpenAIP altitude reference datum codes.
pub const REF_GND: i32 = 0;
pub const REF_AMSL: i32 = 1;
pub const REF_STD: i32 = 2;

/// The `value` member of an altitude limit as it appears on the wire.
/// Datasets mix numbers (`4500`, `115`) and strings (`"GND"`, `"unlimited"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LimitValue {
    Number(f64),
    Text(String),
}

/// An altitude limit exactly as received: preserved for display and stored
/// alongside the derived feet value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLimit {
    pub value: Option<LimitValue>,
    pub unit: Option<i32>,
    #[serde(alias = "referenceDatum")]
    pub reference: Option<i32>,
}

impl RawLimit {
    pub fn ground() -> Self {
        Self {
            value: Some(LimitValue::Number(0.0)),
            unit: Some(UNIT_FT),
            reference: Some(REF_GND),
        }
    }

    /// Rebuild a limit from its stored columns, the inverse of
    /// [`RawLimit::value_token`].
    pub fn from_stored(token: Option<&str>, unit: Option<i32>, reference: Option<i32>) -> Self {
        let value = token.map(|t| match t.parse::<f64>() {
            Ok(n) => LimitValue::Number(n),
            Err(_) => LimitValue::Text(t.to_string()),
        });
        Self {
            value,
            unit,
            reference,
        }
    }

    /// The raw `value` as a storable token, e.g. `"4500"` or `"GND"`.
    pub fn value_token(&self) -> Option<String> {
        match &self.value {
            Some(LimitValue::Number(n)) => {
                if n.fract() == 0.0 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(format!("{n}"))
                }
            }
            Some(LimitValue::Text(s)) => Some(s.clone()),
            None => None,
        }
    }
}

/// A resolved altitude limit.
///
/// Resolution applies the first matching rule, in order: ground reference or
/// "GND"/"SFC" text, flight level, feet, meters, "unlimited"/"unl" text,
/// and finally unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltitudeLimit {
    Gnd,
    Feet(i32),
    Meters(i32),
    FlightLevel(i32),
    Unlimited,
    Unknown,
}

impl AltitudeLimit {
    pub fn resolve(raw: &RawLimit) -> Self {
        if raw.reference == Some(REF_GND) {
            return AltitudeLimit::Gnd;
        }
        match &raw.value {
            Some(LimitValue::Text(s)) => {
                let token = s.trim();
                if token.eq_ignore_ascii_case("GND") || token.eq_ignore_ascii_case("SFC") {
                    AltitudeLimit::Gnd
                } else if token.eq_ignore_ascii_case("unlimited")
                    || token.eq_ignore_ascii_case("unl")
                {
                    AltitudeLimit::Unlimited
                } else {
                    AltitudeLimit::Unknown
                }
            }
            Some(LimitValue::Number(v)) if v.is_finite() => match raw.unit {
                Some(UNIT_FL) => AltitudeLimit::FlightLevel(v.round() as i32),
                Some(UNIT_FT) => AltitudeLimit::Feet(v.round() as i32),
                Some(UNIT_M) => AltitudeLimit::Meters(v.round() as i32),
                _ => AltitudeLimit::Unknown,
            },
            _ => AltitudeLimit::Unknown,
        }
    }

    /// Altitude in feet AMSL. This is the value the spatial query filters on
    /// and the clipping pass sorts by.
    pub fn feet(&self) -> i32 {
        match self {
            AltitudeLimit::Gnd => 0,
            AltitudeLimit::Feet(ft) => *ft,
            AltitudeLimit::Meters(m) => (*m as f64 * FEET_PER_METER).round() as i32,
            AltitudeLimit::FlightLevel(fl) => fl * 100,
            AltitudeLimit::Unlimited | AltitudeLimit::Unknown => UNKNOWN_ALTITUDE_FT,
        }
    }
}

impl fmt::Display for AltitudeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AltitudeLimit::Gnd => write!(f, "GND"),
            AltitudeLimit::Feet(ft) => write!(f, "{ft}ft AMSL"),
            AltitudeLimit::Meters(m) => write!(f, "{m}m AMSL"),
            AltitudeLimit::FlightLevel(fl) => write!(f, "FL{fl}"),
            AltitudeLimit::Unlimited => write!(f, "UNL"),
            AltitudeLimit::Unknown => write!(f, "?"),
        }
    }
}
