use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::{Match, Regex};
use serde::{Deserialize, Serialize};

use super::model::CellValue;

/// Separates the display name from the kind in a spec header, and the tokens
/// inside a `lov` cell.
pub const SPEC_SEPARATOR: char = ';';

// ---------------------------------------------------------------------------
// Spec kinds and column descriptors
// ---------------------------------------------------------------------------

/// How the cells of a spec column are parsed and filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecKind {
    /// List of values: `;`-separated tags, matched by set intersection.
    Lov,
    /// A single number with an optional unit suffix.
    Number,
    /// `true` / `false`.
    Logical,
    /// `low-high` with an optional unit suffix, matched by overlap.
    Range,
}

impl SpecKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecKind::Lov => "lov",
            SpecKind::Number => "number",
            SpecKind::Logical => "logical",
            SpecKind::Range => "range",
        }
    }
}

impl fmt::Display for SpecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized spec kind '{0}'")]
pub struct UnknownKind(pub String);

impl FromStr for SpecKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lov" => Ok(SpecKind::Lov),
            "number" => Ok(SpecKind::Number),
            "logical" => Ok(SpecKind::Logical),
            "range" => Ok(SpecKind::Range),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// Whether a header is structurally a spec column (`"<name>;<kind>"`).
pub fn is_spec_header(header: &str) -> bool {
    header.contains(SPEC_SEPARATOR)
}

/// Split a header on the first `;` into `(name, kind)`.
///
/// The name keeps its case; the kind token is lower-cased. Both are trimmed.
pub fn parse_header(header: &str) -> Option<(String, String)> {
    let (name, kind) = header.split_once(SPEC_SEPARATOR)?;
    Some((name.trim().to_string(), kind.trim().to_lowercase()))
}

/// A typed view of a spec column header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SpecColumn {
    /// Raw header text, used to look cells up.
    pub header: String,
    /// Display name.
    pub name: String,
    pub kind: SpecKind,
}

impl SpecColumn {
    /// `None` when the header has no separator or declares an unknown kind.
    pub fn from_header(header: &str) -> Option<Self> {
        let (name, kind) = parse_header(header)?;
        let kind = kind.parse().ok()?;
        Some(SpecColumn {
            header: header.to_string(),
            name,
            kind,
        })
    }

    /// Parse this column's cell of a product.
    pub fn parse(&self, cell: Option<&CellValue>) -> CellParse {
        parse_value(cell, self.kind)
    }
}

// ---------------------------------------------------------------------------
// Cell parsing
// ---------------------------------------------------------------------------

/// A cell successfully parsed according to its column kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParsedValue {
    Lov { tokens: BTreeSet<String> },
    Number { value: f64, unit: Option<String> },
    Logical { value: bool },
    Range { low: f64, high: f64, unit: Option<String> },
}

impl ParsedValue {
    pub fn kind(&self) -> SpecKind {
        match self {
            ParsedValue::Lov { .. } => SpecKind::Lov,
            ParsedValue::Number { .. } => SpecKind::Number,
            ParsedValue::Logical { .. } => SpecKind::Logical,
            ParsedValue::Range { .. } => SpecKind::Range,
        }
    }

    pub fn unit(&self) -> Option<&str> {
        match self {
            ParsedValue::Number { unit, .. } | ParsedValue::Range { unit, .. } => unit.as_deref(),
            _ => None,
        }
    }
}

/// Outcome of parsing one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellParse {
    /// Null or blank cell.
    Absent,
    /// Non-blank text that does not fit the column kind.
    Unparseable,
    Parsed(ParsedValue),
}

impl CellParse {
    pub fn value(&self) -> Option<&ParsedValue> {
        match self {
            CellParse::Parsed(v) => Some(v),
            _ => None,
        }
    }
}

/// Parse a table cell for the given kind.
pub fn parse_value(cell: Option<&CellValue>, kind: SpecKind) -> CellParse {
    match cell.and_then(CellValue::as_text) {
        Some(text) => parse_cell(&text, kind),
        None => CellParse::Absent,
    }
}

/// Parse raw cell text for the given kind.
pub fn parse_cell(raw: &str, kind: SpecKind) -> CellParse {
    if raw.trim().is_empty() {
        return CellParse::Absent;
    }
    let parsed = match kind {
        SpecKind::Lov => parse_lov(raw),
        SpecKind::Number => parse_number(raw),
        SpecKind::Logical => parse_logical(raw),
        SpecKind::Range => parse_range(raw),
    };
    parsed.map_or(CellParse::Unparseable, CellParse::Parsed)
}

fn number_pattern() -> &'static Regex {
    static NUMBER_RE: OnceLock<Regex> = OnceLock::new();
    NUMBER_RE.get_or_init(|| Regex::new(r"^\s*(-?\d+(?:\.\d+)?)(.*)$").expect("valid regex"))
}

fn range_pattern() -> &'static Regex {
    static RANGE_RE: OnceLock<Regex> = OnceLock::new();
    RANGE_RE.get_or_init(|| {
        Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*-\s*(-?\d+(?:\.\d+)?)(.*)$").expect("valid regex")
    })
}

fn unit_of(m: Option<Match<'_>>) -> Option<String> {
    m.map(|m| m.as_str().trim())
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

fn parse_float(m: Option<Match<'_>>) -> Option<f64> {
    m?.as_str().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_lov(raw: &str) -> Option<ParsedValue> {
    let tokens: BTreeSet<String> = raw
        .split(SPEC_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    (!tokens.is_empty()).then_some(ParsedValue::Lov { tokens })
}

fn parse_number(raw: &str) -> Option<ParsedValue> {
    let caps = number_pattern().captures(raw)?;
    Some(ParsedValue::Number {
        value: parse_float(caps.get(1))?,
        unit: unit_of(caps.get(2)),
    })
}

fn parse_logical(raw: &str) -> Option<ParsedValue> {
    let text = raw.trim();
    if text.eq_ignore_ascii_case("true") {
        Some(ParsedValue::Logical { value: true })
    } else if text.eq_ignore_ascii_case("false") {
        Some(ParsedValue::Logical { value: false })
    } else {
        None
    }
}

fn parse_range(raw: &str) -> Option<ParsedValue> {
    let caps = range_pattern().captures(raw)?;
    let mut low = parse_float(caps.get(1))?;
    let mut high = parse_float(caps.get(2))?;
    if low > high {
        std::mem::swap(&mut low, &mut high);
    }
    Some(ParsedValue::Range {
        low,
        high,
        unit: unit_of(caps.get(3)),
    })
}
