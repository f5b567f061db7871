//! Core types shared across the pulldown pipeline

use serde::Serialize;
use std::fmt;

/// Literal written wherever a raw survey value is missing
pub const UNSPECIFIED: &str = "Unspecified";

// ============================================================================
// Failure reasons
// ============================================================================

/// Why a requested barcode has no pulled-down metadata
///
/// Variants are declared in elimination precedence order: a barcode is
/// reported with the first reason that applies to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FailureReason {
    #[serde(rename = "Not an AG barcode")]
    NotAgBarcode,
    #[serde(rename = "Unassigned handout kit barcode")]
    UnassignedHandout,
    #[serde(rename = "Withdrawn sample")]
    Withdrawn,
    #[serde(rename = "Sample not logged")]
    NotLogged,
    #[serde(rename = "Environmental sample")]
    Environmental,
    #[serde(rename = "Sample logged without consent")]
    NoConsent,
    #[serde(rename = "Unknown reason")]
    Unknown,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NotAgBarcode => "Not an AG barcode",
            FailureReason::UnassignedHandout => "Unassigned handout kit barcode",
            FailureReason::Withdrawn => "Withdrawn sample",
            FailureReason::NotLogged => "Sample not logged",
            FailureReason::Environmental => "Environmental sample",
            FailureReason::NoConsent => "Sample logged without consent",
            FailureReason::Unknown => "Unknown reason",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Survey types
// ============================================================================

/// Formatting family of a survey type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyKind {
    Human,
    Animal,
    /// Any other survey type; formatted with the basic invariant fields only
    Other,
}

impl SurveyKind {
    pub fn from_name(survey_type: &str) -> Self {
        match survey_type {
            "Human" => SurveyKind::Human,
            "Animal" => SurveyKind::Animal,
            _ => SurveyKind::Other,
        }
    }
}

// ============================================================================
// Table cells
// ============================================================================

/// A present table value
///
/// Absent cells (e.g. left join misses) are modelled as `None` at the
/// table level; `Unspecified` is a present value meaning "no answer".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Value(String),
    Unspecified,
}

impl Cell {
    /// Raw answer text; empty answers become `Unspecified`
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == UNSPECIFIED {
            Cell::Unspecified
        } else {
            Cell::Value(trimmed.to_string())
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Cell::Value(value.into())
    }

    /// Optional text; `None` becomes `Unspecified`
    pub fn from_option(value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => Cell::Value(v.into()),
            None => Cell::Unspecified,
        }
    }

    pub fn from_bool(value: bool) -> Self {
        Cell::Value(if value { "True" } else { "False" }.to_string())
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Cell::Value(v) => Some(v.as_str()),
            Cell::Unspecified => None,
        }
    }

    /// Numeric view of the value, `None` for `Unspecified` or non-numeric text
    pub fn as_f64(&self) -> Option<f64> {
        self.value().and_then(|v| v.parse::<f64>().ok())
    }

    pub fn is_unspecified(&self) -> bool {
        matches!(self, Cell::Unspecified)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Cell::Value(v) => v.as_str(),
            Cell::Unspecified => UNSPECIFIED,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Geolocation
// ============================================================================

/// Coordinate precision applied to geocoded values on export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// Rounded to one decimal place
    Default,
    /// Unredacted
    Full,
}

impl Precision {
    pub fn from_full(full: bool) -> Self {
        if full {
            Precision::Full
        } else {
            Precision::Default
        }
    }
}

/// Resolved (or unresolvable) location of a zipcode/country pair
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub zipcode: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// False for negative results and for pairs that were never looked up
    pub geocodable: bool,
}

impl Location {
    /// Location carrying only the requested key, with every geographic field empty
    pub fn unresolved(zipcode: Option<&str>, country: Option<&str>) -> Self {
        Self {
            zipcode: zipcode.map(str::to_string),
            country: country.map(str::to_string),
            latitude: None,
            longitude: None,
            elevation: None,
            city: None,
            state: None,
            geocodable: false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.geocodable && self.latitude.is_some() && self.longitude.is_some()
    }

    /// Copy with coordinates reduced to the requested precision
    pub fn with_precision(&self, precision: Precision) -> Self {
        match precision {
            Precision::Full => self.clone(),
            Precision::Default => Self {
                latitude: self.latitude.map(round_one_decimal),
                longitude: self.longitude.map(round_one_decimal),
                elevation: self.elevation.map(round_one_decimal),
                ..self.clone()
            },
        }
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
