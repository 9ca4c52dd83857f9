use thiserror::Error;

use crate::data::spec::SpecKind;

/// Structural problems with a source table. These are fatal for the pipeline
/// and are reported before any filtering happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("missing required columns: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },
}

/// Rejected filter mutations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("'{0}' is not a spec column of this catalog")]
    UnknownColumn(String),

    #[error("column '{column}' is {expected} but the constraint is {actual}")]
    KindMismatch {
        column: String,
        expected: SpecKind,
        actual: SpecKind,
    },

    #[error("constraint bounds for '{0}' must be finite numbers")]
    NonFiniteBounds(String),
}

/// Problems applying a confirmed catalog update.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("product '{key}' no longer matches row {row} of the output table")]
    StaleUpdate { key: String, row: usize },
}

/// Invalid spec view configurations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("a view configuration needs at least one series")]
    NoSeries,

    #[error("unknown series: {}", .0.join(", "))]
    UnknownSeries(Vec<String>),

    #[error("'{0}' is not a populated spec column for this product group")]
    UnknownColumn(String),

    #[error("a pivot view needs a pivot column")]
    MissingPivotColumn,

    #[error("product group '{0}' has no view configurations")]
    UnknownGroup(String),

    #[error("product group '{group}' has no view configuration #{index}")]
    IndexOutOfRange { group: String, index: usize },
}
