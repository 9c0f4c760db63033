use serde::{Deserialize, Serialize};

use crate::altitude::RawLimit;
use crate::geometry_codec::Bounds;

/// ICAO airspace classification, stored as an integer 0..=6 (A..G).
/// Code 7 and anything else map to "none"; absent and "none" are treated
/// identically by filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AirspaceClass {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl AirspaceClass {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(AirspaceClass::A),
            1 => Some(AirspaceClass::B),
            2 => Some(AirspaceClass::C),
            3 => Some(AirspaceClass::D),
            4 => Some(AirspaceClass::E),
            5 => Some(AirspaceClass::F),
            6 => Some(AirspaceClass::G),
            _ => None,
        }
    }

    pub fn letter(&self) -> &'static str {
        match self {
            AirspaceClass::A => "A",
            AirspaceClass::B => "B",
            AirspaceClass::C => "C",
            AirspaceClass::D => "D",
            AirspaceClass::E => "E",
            AirspaceClass::F => "F",
            AirspaceClass::G => "G",
        }
    }
}

/// Airspace kind. The integer codes are the dataset's own enumeration;
/// unknown codes are preserved verbatim in storage and rendered as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AirspaceType {
    Other,
    Ctr,
    Tma,
    Cta,
    Danger,
    Restricted,
    Prohibited,
    Fir,
    Atz,
    Tmz,
    Rmz,
    Matz,
    Airway,
    GliderSector,
    WaveWindow,
}

impl AirspaceType {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => AirspaceType::Ctr,
            2 => AirspaceType::Tma,
            3 => AirspaceType::Cta,
            4 => AirspaceType::Danger,
            5 => AirspaceType::Restricted,
            6 => AirspaceType::Prohibited,
            7 => AirspaceType::Fir,
            8 => AirspaceType::Atz,
            9 => AirspaceType::Tmz,
            10 => AirspaceType::Rmz,
            11 => AirspaceType::Matz,
            12 => AirspaceType::Airway,
            13 => AirspaceType::GliderSector,
            14 => AirspaceType::WaveWindow,
            _ => AirspaceType::Other,
        }
    }

    /// Chart abbreviation, also the key of the fallback style table.
    pub fn abbreviation(&self) -> &'static str {
        match self {
            AirspaceType::Ctr => "CTR",
            AirspaceType::Tma => "TMA",
            AirspaceType::Cta => "CTA",
            AirspaceType::Danger => "D",
            AirspaceType::Restricted => "R",
            AirspaceType::Prohibited => "P",
            AirspaceType::Fir => "FIR",
            AirspaceType::Atz => "ATZ",
            AirspaceType::Tmz => "TMZ",
            AirspaceType::Rmz => "RMZ",
            AirspaceType::Matz => "MATZ",
            AirspaceType::Airway => "AWY",
            AirspaceType::GliderSector => "GLIDING",
            AirspaceType::WaveWindow => "WAVE",
            AirspaceType::Other => "OTHER",
        }
    }
}

/// A fully derived airspace ready for insertion: native columns plus the
/// encoded geometry blobs. Fetch and access timestamps are stamped by the
/// store at write time.
#[derive(Debug, Clone)]
pub struct AirspaceRecord {
    pub id: String,
    pub name: String,
    pub type_code: i32,
    pub icao_class: Option<i32>,
    pub country: Option<String>,
    pub activity: Option<i64>,
    pub lower_limit: RawLimit,
    pub upper_limit: RawLimit,
    pub lower_altitude_ft: i32,
    pub upper_altitude_ft: i32,
    pub bounds: Bounds,
    pub coords: Vec<u8>,
    pub offsets: Vec<u8>,
    pub geometry_hash: String,
    /// Properties not lifted into columns, kept as opaque JSON.
    pub extra_properties: Option<String>,
}

/// One airspace row as read back from the store, blobs still encoded.
#[derive(Debug, Clone)]
pub struct AirspaceRow {
    pub id: String,
    pub name: String,
    pub type_code: i32,
    pub icao_class: Option<i32>,
    pub country: Option<String>,
    pub activity: Option<i64>,
    pub lower_raw_value: Option<String>,
    pub lower_raw_unit: Option<i32>,
    pub lower_raw_reference: Option<i32>,
    pub upper_raw_value: Option<String>,
    pub upper_raw_unit: Option<i32>,
    pub upper_raw_reference: Option<i32>,
    pub lower_altitude_ft: i32,
    pub upper_altitude_ft: i32,
    pub bounds: Bounds,
    pub coords: Vec<u8>,
    pub offsets: Vec<u8>,
    pub geometry_hash: String,
    pub extra_properties: Option<String>,
    pub fetch_time: i64,
    pub last_accessed: i64,
}
