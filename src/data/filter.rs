use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::domain::{compute_domain, distinct_values, ColumnDomain};
use super::model::{columns, ProductTable, RowSet};
use super::predicate::{matches, Constraint};
use super::spec::SpecColumn;

// ---------------------------------------------------------------------------
// Filter state: everything the user has chosen
// ---------------------------------------------------------------------------

/// User selections for every stage of the pipeline.
///
/// Empty sets, `None` and blank search mean "no filter" for that stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    pub lifecycle: BTreeSet<String>,
    pub search: String,
    pub product_group: Option<String>,
    /// `None` is "All categories".
    pub category: Option<String>,
    pub series: BTreeSet<String>,
    /// Spec constraints keyed by column header.
    pub spec: BTreeMap<String, Constraint>,
}

impl FilterState {
    pub fn is_default(&self) -> bool {
        self == &FilterState::default()
    }
}

/// Pipeline switches that come from configuration rather than the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Offer spec filters only once at least one series is selected.
    pub require_series_for_specs: bool,
}

/// Choices for the fixed-field stages, each computed from that stage's input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageOptions {
    pub lifecycle: BTreeSet<String>,
    pub product_groups: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub series: BTreeSet<String>,
}

/// A selected category that no longer fits the selected series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryReset {
    pub from: String,
    /// The single compatible category, or `None` for "All".
    pub to: Option<String>,
}

/// Result of one full pipeline run. Owns everything so it can outlive the
/// borrow of the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOutcome {
    /// The input state after cross-field corrections.
    pub state: FilterState,
    /// Surviving table row indices, in table order.
    pub indices: Vec<usize>,
    pub options: StageOptions,
    /// Offered spec filters, in header order.
    pub domains: Vec<ColumnDomain>,
    /// Spec constraints that took part in filtering.
    pub applied_count: usize,
    pub displayed_count: usize,
    /// Headers of constraints that were set but could not apply.
    pub dormant: Vec<String>,
    pub category_reset: Option<CategoryReset>,
}

impl FilterOutcome {
    pub fn rows<'a>(&self, table: &'a ProductTable) -> RowSet<'a> {
        RowSet::from_indices(table, self.indices.clone())
    }

    /// The offered domain of a spec column.
    pub fn domain(&self, header: &str) -> Option<&ColumnDomain> {
        self.domains.iter().find(|d| d.column.header == header)
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Keep rows whose `column` text is one of `selected`. An empty selection
/// keeps everything.
pub fn select_values<'a>(rows: &RowSet<'a>, column: &str, selected: &BTreeSet<String>) -> RowSet<'a> {
    if selected.is_empty() {
        return rows.clone();
    }
    rows.filter(|p| p.text(column).is_some_and(|t| selected.contains(&*t)))
}

/// Keep rows whose `column` text equals `selected`. `None` keeps everything.
pub fn select_one<'a>(rows: &RowSet<'a>, column: &str, selected: Option<&str>) -> RowSet<'a> {
    match selected {
        Some(wanted) => rows.filter(|p| p.text(column).is_some_and(|t| t == wanted)),
        None => rows.clone(),
    }
}

/// Case-insensitive substring search on the product name.
pub fn search_names<'a>(rows: &RowSet<'a>, needle: &str) -> RowSet<'a> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return rows.clone();
    }
    rows.filter(|p| {
        p.text(columns::NAME)
            .is_some_and(|name| name.to_lowercase().contains(&needle))
    })
}

/// Categories holding at least one product of the selected series.
pub fn compatible_categories(rows: &RowSet<'_>, series: &BTreeSet<String>) -> BTreeSet<String> {
    distinct_values(&select_values(rows, columns::SERIES, series), columns::CATEGORY)
}

/// Keep rows whose spec cell satisfies `constraint`.
pub fn apply_constraint<'a>(rows: &RowSet<'a>, column: &SpecColumn, constraint: &Constraint) -> RowSet<'a> {
    rows.filter(|p| matches(p.get(&column.header), column.kind, constraint))
}

fn trace_stage(stage: &str, before: &RowSet<'_>, after: &RowSet<'_>) {
    if before.len() != after.len() {
        log::debug!("{stage}: {} -> {} rows", before.len(), after.len());
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run every stage over the unfiltered table.
///
/// Stage order: lifecycle, name search, product group, category, series,
/// then spec constraints. Each fixed stage's options are taken from its input
/// rows, so a selector never narrows its own choices. Every spec domain is
/// computed from the series stage output, and the spec constraints on offered
/// columns are then combined as a conjunction, so their order is irrelevant.
pub fn apply_pipeline(table: &ProductTable, state: FilterState, options: PipelineOptions) -> FilterOutcome {
    let mut state = state;
    let mut stage_options = StageOptions::default();
    let all = RowSet::all(table);

    stage_options.lifecycle = distinct_values(&all, columns::LIFECYCLE);
    let rows = select_values(&all, columns::LIFECYCLE, &state.lifecycle);
    trace_stage("lifecycle", &all, &rows);

    let searched = search_names(&rows, &state.search);
    trace_stage("search", &rows, &searched);

    stage_options.product_groups = distinct_values(&searched, columns::PRODUCT_GROUP);
    let rows = select_one(&searched, columns::PRODUCT_GROUP, state.product_group.as_deref());
    trace_stage("product group", &searched, &rows);

    // Series narrow the category choices; an incompatible category resets.
    let mut category_reset = None;
    stage_options.categories = if state.series.is_empty() {
        distinct_values(&rows, columns::CATEGORY)
    } else {
        let compatible = compatible_categories(&rows, &state.series);
        if let Some(current) = state.category.take() {
            if compatible.contains(&current) {
                state.category = Some(current);
            } else {
                let to = match compatible.len() {
                    1 => compatible.iter().next().cloned(),
                    _ => None,
                };
                log::info!("Category {current:?} has none of the selected series, resetting to {to:?}");
                state.category = to.clone();
                category_reset = Some(CategoryReset { from: current, to });
            }
        }
        compatible
    };
    let by_category = select_one(&rows, columns::CATEGORY, state.category.as_deref());
    trace_stage("category", &rows, &by_category);

    stage_options.series = distinct_values(&by_category, columns::SERIES);
    let mut rows = select_values(&by_category, columns::SERIES, &state.series);
    trace_stage("series", &by_category, &rows);

    let mut domains = Vec::new();
    let mut dormant = Vec::new();
    let mut applied_count = 0;

    if options.require_series_for_specs && state.series.is_empty() {
        dormant.extend(
            state
                .spec
                .iter()
                .filter(|(_, c)| c.is_active())
                .map(|(header, _)| header.clone()),
        );
    } else {
        let mut active = Vec::new();
        for column in &table.spec_columns {
            let domain = compute_domain(&rows, column);
            let constraint = state.spec.get(&column.header).filter(|c| c.is_active());
            if !domain.is_offered() {
                if constraint.is_some() {
                    dormant.push(column.header.clone());
                }
                continue;
            }
            domains.push(domain);
            if let Some(constraint) = constraint {
                active.push((column, constraint));
            }
        }
        for (column, constraint) in active {
            let narrowed = apply_constraint(&rows, column, constraint);
            trace_stage(&column.header, &rows, &narrowed);
            rows = narrowed;
            applied_count += 1;
        }
        dormant.extend(
            state
                .spec
                .iter()
                .filter(|(header, c)| c.is_active() && table.spec_column(header).is_none())
                .map(|(header, _)| header.clone()),
        );
    }

    if !dormant.is_empty() {
        log::warn!("Constraints not applied (no filterable values): {dormant:?}");
    }

    let displayed_count = rows.len();
    FilterOutcome {
        state,
        indices: rows.into_indices(),
        options: stage_options,
        domains,
        applied_count,
        displayed_count,
        dormant,
        category_reset,
    }
}
