use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::model::RowSet;
use super::spec::{CellParse, ParsedValue, SpecColumn, SpecKind};

// ---------------------------------------------------------------------------
// Domain – what a filter widget may offer for the current rows
// ---------------------------------------------------------------------------

/// Selectable values or bounds of a spec column over a row set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Domain {
    /// Sorted distinct tokens.
    Lov { options: BTreeSet<String> },
    Number { min: f64, max: f64, unit: Option<String> },
    /// Always the three choices of [`LogicalChoice`].
    Logical,
    /// Smallest low and largest high.
    Range { min: f64, max: f64, unit: Option<String> },
}

impl Domain {
    pub fn kind(&self) -> SpecKind {
        match self {
            Domain::Lov { .. } => SpecKind::Lov,
            Domain::Number { .. } => SpecKind::Number,
            Domain::Logical => SpecKind::Logical,
            Domain::Range { .. } => SpecKind::Range,
        }
    }

    /// A number column whose rows all share one value: shown as a fixed
    /// value instead of an interactive range.
    pub fn is_fixed(&self) -> bool {
        matches!(self, Domain::Number { min, max, .. } if min == max)
    }

    pub fn unit(&self) -> Option<&str> {
        match self {
            Domain::Number { unit, .. } | Domain::Range { unit, .. } => unit.as_deref(),
            _ => None,
        }
    }

    /// Widget label such as `Weight (number, kg)`.
    pub fn label(&self, name: &str) -> String {
        match self.unit() {
            Some(unit) => format!("{name} ({}, {unit})", self.kind()),
            None => format!("{name} ({})", self.kind()),
        }
    }
}

/// The three-way choice offered for logical columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalChoice {
    #[default]
    Any,
    True,
    False,
}

impl LogicalChoice {
    pub const ALL: [LogicalChoice; 3] = [LogicalChoice::Any, LogicalChoice::True, LogicalChoice::False];

    /// `None` for [`LogicalChoice::Any`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LogicalChoice::Any => None,
            LogicalChoice::True => Some(true),
            LogicalChoice::False => Some(false),
        }
    }
}

impl fmt::Display for LogicalChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogicalChoice::Any => "Any",
            LogicalChoice::True => "True",
            LogicalChoice::False => "False",
        })
    }
}

impl FromStr for LogicalChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(LogicalChoice::Any),
            "true" => Ok(LogicalChoice::True),
            "false" => Ok(LogicalChoice::False),
            other => Err(format!("expected Any, True or False, got '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// ColumnDomain – a domain plus parse statistics
// ---------------------------------------------------------------------------

/// The domain of one spec column over a row set, with cell counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDomain {
    pub column: SpecColumn,
    /// `None` when no cell parsed: the column offers no filter.
    pub domain: Option<Domain>,
    pub parsed: usize,
    pub unparseable: usize,
    pub absent: usize,
}

impl ColumnDomain {
    pub fn is_offered(&self) -> bool {
        self.domain.is_some()
    }
}

/// Running min/max for number and range columns.
#[derive(Default)]
struct Bounds {
    min: Option<f64>,
    max: Option<f64>,
    unit: Option<String>,
}

impl Bounds {
    fn push(&mut self, low: f64, high: f64, unit: Option<&str>) {
        self.min = Some(self.min.map_or(low, |m| m.min(low)));
        self.max = Some(self.max.map_or(high, |m| m.max(high)));
        // First unit wins.
        if self.unit.is_none() {
            self.unit = unit.map(str::to_string);
        }
    }
}

/// Compute the domain of `column` over `rows`.
pub fn compute_domain(rows: &RowSet<'_>, column: &SpecColumn) -> ColumnDomain {
    let mut tokens: BTreeSet<String> = BTreeSet::new();
    let mut bounds = Bounds::default();
    let (mut parsed, mut unparseable, mut absent) = (0, 0, 0);

    for (index, product) in rows.enumerate() {
        match column.parse(product.get(&column.header)) {
            CellParse::Absent => absent += 1,
            CellParse::Unparseable => {
                unparseable += 1;
                log::debug!(
                    "Row {index}: {:?} is not a valid {} for {:?}",
                    product.text(&column.header).unwrap_or_default(),
                    column.kind,
                    column.header
                );
            }
            CellParse::Parsed(value) => {
                parsed += 1;
                match value {
                    ParsedValue::Lov { tokens: t } => tokens.extend(t),
                    ParsedValue::Number { value, unit } => bounds.push(value, value, unit.as_deref()),
                    ParsedValue::Range { low, high, unit } => bounds.push(low, high, unit.as_deref()),
                    ParsedValue::Logical { .. } => {}
                }
            }
        }
    }

    let domain = if parsed == 0 {
        None
    } else {
        match column.kind {
            SpecKind::Lov => Some(Domain::Lov { options: tokens }),
            SpecKind::Logical => Some(Domain::Logical),
            SpecKind::Number => bounds_domain(bounds, |min, max, unit| Domain::Number { min, max, unit }),
            SpecKind::Range => bounds_domain(bounds, |min, max, unit| Domain::Range { min, max, unit }),
        }
    };

    if unparseable > 0 {
        log::debug!(
            "{:?}: {parsed} parsed, {unparseable} unparseable, {absent} empty",
            column.header
        );
    }

    ColumnDomain {
        column: column.clone(),
        domain,
        parsed,
        unparseable,
        absent,
    }
}

fn bounds_domain(
    bounds: Bounds,
    build: impl FnOnce(f64, f64, Option<String>) -> Domain,
) -> Option<Domain> {
    Some(build(bounds.min?, bounds.max?, bounds.unit))
}

/// Sorted distinct non-blank values of a plain column.
pub fn distinct_values(rows: &RowSet<'_>, column: &str) -> BTreeSet<String> {
    rows.iter()
        .filter_map(|p| p.text(column))
        .map(|t| t.into_owned())
        .collect()
}
