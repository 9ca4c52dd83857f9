use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::model::CellValue;
use super::spec::{parse_value, CellParse, ParsedValue, SpecKind};

/// A user-chosen constraint on one spec column.
///
/// Serialized as `{"kind": "number", "value": {"low": 2, "high": 3}}`,
/// `{"kind": "lov", "value": ["red", "blue"]}` or `{"kind": "logical", "value": true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Constraint {
    /// Allowed tokens; a row matches if it has at least one of them.
    Lov(BTreeSet<String>),
    /// Inclusive window.
    Number { low: f64, high: f64 },
    Logical(bool),
    /// Window that a row's range must overlap.
    Range { low: f64, high: f64 },
}

impl Constraint {
    pub fn kind(&self) -> SpecKind {
        match self {
            Constraint::Lov(_) => SpecKind::Lov,
            Constraint::Number { .. } => SpecKind::Number,
            Constraint::Logical(_) => SpecKind::Logical,
            Constraint::Range { .. } => SpecKind::Range,
        }
    }

    pub fn lov<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Constraint::Lov(tokens.into_iter().map(Into::into).collect())
    }

    /// An empty token set selects nothing and is treated as no constraint.
    pub fn is_active(&self) -> bool {
        match self {
            Constraint::Lov(tokens) => !tokens.is_empty(),
            _ => true,
        }
    }

    /// Bounds of a number or range window, if any.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            Constraint::Number { low, high } | Constraint::Range { low, high } => Some((*low, *high)),
            _ => None,
        }
    }

    /// Same constraint with `low <= high`.
    pub fn normalized(self) -> Self {
        match self {
            Constraint::Number { low, high } if low > high => Constraint::Number { low: high, high: low },
            Constraint::Range { low, high } if low > high => Constraint::Range { low: high, high: low },
            other => other,
        }
    }
}

/// Does a cell of a `kind` column satisfy `constraint`?
///
/// Absent and unparseable cells never match, and neither does a constraint
/// of a different kind than the column.
pub fn matches(cell: Option<&CellValue>, kind: SpecKind, constraint: &Constraint) -> bool {
    if constraint.kind() != kind {
        log::debug!("{} constraint applied to a {kind} column", constraint.kind());
        return false;
    }
    match parse_value(cell, kind) {
        CellParse::Parsed(value) => satisfies(&value, constraint),
        CellParse::Absent | CellParse::Unparseable => false,
    }
}

/// Does an already parsed value satisfy `constraint`?
pub fn satisfies(value: &ParsedValue, constraint: &Constraint) -> bool {
    match (value, constraint) {
        (ParsedValue::Lov { tokens }, Constraint::Lov(allowed)) => !tokens.is_disjoint(allowed),
        (ParsedValue::Number { value, .. }, Constraint::Number { low, high }) => {
            *low <= *value && *value <= *high
        }
        (ParsedValue::Logical { value }, Constraint::Logical(wanted)) => value == wanted,
        // Overlap, not containment.
        (ParsedValue::Range { low, high, .. }, Constraint::Range { low: sel_low, high: sel_high }) => {
            *high >= *sel_low && *low <= *sel_high
        }
        _ => false,
    }
}
