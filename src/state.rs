use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::data::domain::{ColumnDomain, LogicalChoice};
use crate::data::filter::{apply_pipeline, FilterOutcome, FilterState, PipelineOptions, StageOptions};
use crate::data::model::{Product, ProductTable};
use crate::data::predicate::Constraint;
use crate::error::FilterError;

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// One user's filter state over a shared, immutable catalog.
///
/// Every mutation re-runs the whole pipeline from the unfiltered table.
#[derive(Debug, Clone)]
pub struct Session {
    table: Arc<ProductTable>,
    options: PipelineOptions,
    state: FilterState,
    outcome: FilterOutcome,
}

impl Session {
    pub fn new(table: Arc<ProductTable>, options: PipelineOptions) -> Self {
        Self::with_state(table, options, FilterState::default())
    }

    /// Resume a session from a previously saved state.
    pub fn with_state(table: Arc<ProductTable>, options: PipelineOptions, state: FilterState) -> Self {
        let outcome = apply_pipeline(&table, state, options);
        Self {
            table,
            options,
            state: outcome.state.clone(),
            outcome,
        }
    }

    /// Recompute the outcome after a state change.
    pub fn refilter(&mut self) {
        let outcome = apply_pipeline(&self.table, self.state.clone(), self.options);
        if let Some(reset) = &outcome.category_reset {
            log::debug!("Category reset {:?} -> {:?}", reset.from, reset.to);
        }
        self.state = outcome.state.clone();
        self.outcome = outcome;
    }

    // -- Spec constraints --

    /// Set the constraint of a spec column.
    pub fn set_constraint(&mut self, column: &str, constraint: Constraint) -> Result<(), FilterError> {
        let spec = self
            .table
            .spec_column(column)
            .ok_or_else(|| FilterError::UnknownColumn(column.to_string()))?;
        if spec.kind != constraint.kind() {
            return Err(FilterError::KindMismatch {
                column: column.to_string(),
                expected: spec.kind,
                actual: constraint.kind(),
            });
        }
        if let Some((low, high)) = constraint.bounds() {
            if !low.is_finite() || !high.is_finite() {
                return Err(FilterError::NonFiniteBounds(column.to_string()));
            }
        }
        self.state.spec.insert(column.to_string(), constraint.normalized());
        self.refilter();
        Ok(())
    }

    /// Set a logical column; [`LogicalChoice::Any`] removes its constraint.
    pub fn set_logical(&mut self, column: &str, choice: LogicalChoice) -> Result<(), FilterError> {
        match choice.as_bool() {
            Some(value) => self.set_constraint(column, Constraint::Logical(value)),
            None => {
                self.clear_constraint(column);
                Ok(())
            }
        }
    }

    pub fn clear_constraint(&mut self, column: &str) {
        if self.state.spec.remove(column).is_some() {
            self.refilter();
        }
    }

    /// Reset every stage, not just the spec constraints.
    pub fn clear_all(&mut self) {
        self.state = FilterState::default();
        self.refilter();
    }

    // -- Fixed stages --

    pub fn set_lifecycle(&mut self, values: BTreeSet<String>) {
        self.state.lifecycle = values;
        self.refilter();
    }

    pub fn set_search(&mut self, text: &str) {
        self.state.search = text.to_string();
        self.refilter();
    }

    pub fn set_product_group(&mut self, group: Option<String>) {
        self.state.product_group = group;
        self.refilter();
    }

    pub fn set_category(&mut self, category: Option<String>) {
        self.state.category = category;
        self.refilter();
    }

    pub fn set_series(&mut self, series: BTreeSet<String>) {
        self.state.series = series;
        self.refilter();
    }

    // -- Queries --

    /// Offered domain of a spec column, `None` if the column has no filter.
    pub fn get_domain(&self, column: &str) -> Option<&ColumnDomain> {
        self.outcome.domain(column)
    }

    pub fn domains(&self) -> &[ColumnDomain] {
        &self.outcome.domains
    }

    pub fn get_filtered_rows(&self) -> Vec<&Product> {
        self.outcome
            .indices
            .iter()
            .map(|&i| &self.table.rows[i])
            .collect()
    }

    pub fn get_applied_count(&self) -> usize {
        self.outcome.applied_count
    }

    pub fn displayed_count(&self) -> usize {
        self.outcome.displayed_count
    }

    pub fn options(&self) -> &StageOptions {
        &self.outcome.options
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn outcome(&self) -> &FilterOutcome {
        &self.outcome
    }

    pub fn table(&self) -> &Arc<ProductTable> {
        &self.table
    }
}

// ---------------------------------------------------------------------------
// Independent sessions over one catalog
// ---------------------------------------------------------------------------

pub type SessionId = String;

/// Sessions keyed by a stable identity. Only the table is shared.
#[derive(Debug)]
pub struct SessionStore {
    table: Arc<ProductTable>,
    options: PipelineOptions,
    sessions: HashMap<SessionId, Session>,
}

impl SessionStore {
    pub fn new(table: Arc<ProductTable>, options: PipelineOptions) -> Self {
        Self {
            table,
            options,
            sessions: HashMap::new(),
        }
    }

    /// The session for `id`, created on first use.
    pub fn session(&mut self, id: &str) -> &mut Session {
        let table = &self.table;
        let options = self.options;
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(Arc::clone(table), options))
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Swap in a reloaded catalog, re-running every session's state over it.
    pub fn replace_table(&mut self, table: Arc<ProductTable>) {
        log::info!(
            "Catalog replaced ({} products), refreshing {} sessions",
            table.len(),
            self.sessions.len()
        );
        for session in self.sessions.values_mut() {
            *session = Session::with_state(Arc::clone(&table), self.options, session.state.clone());
        }
        self.table = table;
    }
}
