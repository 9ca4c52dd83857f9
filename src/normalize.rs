//! Maps source (PIM export) rows onto the catalog schema and merges them into
//! an existing catalog by natural key.
//!
//! ```text
//!  source workbook ──► CascadeSelection ──► normalize() ──► reconcile()
//!                       (level filters)      (renames)       │
//!                                                            ├─ Inserted
//!                                                            ├─ NoChange
//!                                                            └─ ConflictsFound ──► apply_update()
//!                                                                                  (after confirmation)
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::domain::distinct_values;
use crate::data::filter::select_values;
use crate::data::model::{columns, CellValue, Product, ProductTable, RowSet};
use crate::error::{MergeError, SchemaError};

pub const LEVEL_02: &str = "<Publication Link.|Node|.Description Level 02>";
pub const LEVEL_03: &str = "<Publication Link.|Node|.Description Level 03>";
pub const LEVEL_04: &str = "<Publication Link.|Node|.Description Level 04>";
pub const CATALOG_DESCRIPTION: &str = "Catalog Description";
pub const LONG_DESCRIPTION: &str = "Item Long Description";
pub const PRIMARY_IMAGE: &str = "Primary Image link";

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRename {
    pub source: String,
    pub target: String,
}

/// Ordered source → catalog column renames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping(pub Vec<ColumnRename>);

impl Default for ColumnMapping {
    fn default() -> Self {
        ColumnMapping::from_pairs([
            (LEVEL_02, columns::PRODUCT_GROUP),
            (LEVEL_03, columns::CATEGORY),
            (LEVEL_04, columns::SERIES),
            (CATALOG_DESCRIPTION, columns::NAME),
            (LONG_DESCRIPTION, columns::DESCRIPTION),
            (PRIMARY_IMAGE, columns::FEATURED_IMAGE),
        ])
    }
}

impl ColumnMapping {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        ColumnMapping(
            pairs
                .into_iter()
                .map(|(source, target)| ColumnRename {
                    source: source.to_string(),
                    target: target.to_string(),
                })
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnRename> {
        self.0.iter()
    }

    /// Every mapped source column must exist in the source table.
    pub fn check_source(&self, source: &ProductTable) -> Result<(), SchemaError> {
        let required: Vec<&str> = self.iter().map(|r| r.source.as_str()).collect();
        source.require_columns(&required)
    }
}

/// Rename the mapped columns of a source row; unmapped columns pass through
/// and the source-named fields are dropped.
pub fn normalize(source: &Product, mapping: &ColumnMapping) -> Product {
    let mut row = source.clone();
    let renamed: Vec<(&str, CellValue)> = mapping
        .iter()
        .filter_map(|r| Some((r.target.as_str(), source.get(&r.source)?.clone())))
        .collect();
    for rename in mapping.iter() {
        row.remove(&rename.source);
    }
    for (target, value) in renamed {
        row.set(target, value);
    }
    row
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// One field that differs between the catalog and an incoming row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDelta {
    pub field: String,
    pub existing: CellValue,
    pub new: CellValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Outcome {
    Inserted,
    NoChange,
    /// Never applied automatically; see [`apply_update`].
    ConflictsFound(Vec<FieldDelta>),
}

/// Schema changes made while merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SchemaEvent {
    ColumnAdded(String),
}

impl fmt::Display for SchemaEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaEvent::ColumnAdded(col) => write!(f, "Added new column: {col}"),
        }
    }
}

fn as_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Two cells hold the same value: both absent, both numbers that are equal,
/// or the same text.
fn same_value(existing: Option<&str>, new: Option<&str>) -> bool {
    match (existing, new) {
        (None, None) => true,
        (Some(a), Some(b)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => false,
    }
}

/// Fields that differ between two rows, over the union of their columns.
/// Two absent cells are equal and numeric cells compare by value, so `2.0`
/// read from a CSV matches a workbook's `2`. Anything else compares by text.
pub fn compare_rows(existing: &Product, new: &Product) -> Vec<FieldDelta> {
    let fields: BTreeSet<&str> = existing.columns().chain(new.columns()).collect();
    fields
        .into_iter()
        .filter(|field| !same_value(existing.text(field).as_deref(), new.text(field).as_deref()))
        .map(|field| FieldDelta {
            field: field.to_string(),
            existing: existing.get(field).cloned().unwrap_or(CellValue::Null),
            new: new.get(field).cloned().unwrap_or(CellValue::Null),
        })
        .collect()
}

fn find_by_key(table: &ProductTable, key_col: &str, key: &str) -> Option<usize> {
    table
        .rows
        .iter()
        .position(|row| row.text(key_col).is_some_and(|k| k == key))
}

/// Insert `new_row` if its key is not in `existing`, otherwise report how it
/// differs. Only inserts mutate the table.
pub fn reconcile(existing: &mut ProductTable, new_row: Product, key_col: &str) -> Outcome {
    let position = new_row
        .text(key_col)
        .and_then(|key| find_by_key(existing, key_col, &key));
    match position {
        None => {
            let added = existing.push_row(new_row);
            if !added.is_empty() {
                log::info!("Schema extended with {added:?}");
            }
            Outcome::Inserted
        }
        Some(index) => {
            let deltas = compare_rows(&existing.rows[index], &new_row);
            if deltas.is_empty() {
                Outcome::NoChange
            } else {
                Outcome::ConflictsFound(deltas)
            }
        }
    }
}

/// Add every column of `row` missing from the schema.
pub fn extend_schema(existing: &mut ProductTable, row: &Product) -> Vec<SchemaEvent> {
    row.columns()
        .filter(|col| existing.add_column(col))
        .map(|col| {
            log::info!("Added new column: {col}");
            SchemaEvent::ColumnAdded(col.to_string())
        })
        .collect()
}

/// A conflicting row waiting for the user's decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingUpdate {
    pub key: String,
    /// Index of the matching row in the output table.
    pub row: usize,
    pub new_row: Product,
    pub deltas: Vec<FieldDelta>,
}

/// Apply a confirmed update: the whole row when `fields` is `None`, or only
/// the listed fields. Columns the schema lacks are added first.
pub fn apply_update(
    existing: &mut ProductTable,
    pending: &PendingUpdate,
    key_col: &str,
    fields: Option<&[String]>,
) -> Result<Vec<SchemaEvent>, MergeError> {
    let still_matches = existing
        .rows
        .get(pending.row)
        .and_then(|row| row.text(key_col))
        .is_some_and(|k| k == pending.key.as_str());
    if !still_matches {
        return Err(MergeError::StaleUpdate {
            key: pending.key.clone(),
            row: pending.row,
        });
    }

    let update: Product = match fields {
        None => pending.new_row.clone(),
        Some(fields) => pending
            .new_row
            .cells
            .iter()
            .filter(|(col, _)| fields.contains(*col))
            .map(|(col, value)| (col.clone(), value.clone()))
            .collect(),
    };

    let events = extend_schema(existing, &update);
    let row = &mut existing.rows[pending.row];
    for (col, value) in update.cells {
        row.set(col, value);
    }
    log::info!("Updated product '{}' with new values", pending.key);
    Ok(events)
}

// ---------------------------------------------------------------------------
// Batch merge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    pub inserted: usize,
    pub unchanged: usize,
    pub pending: Vec<PendingUpdate>,
    pub events: Vec<SchemaEvent>,
}

/// Normalizes source rows and reconciles them into a catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Merger {
    pub mapping: ColumnMapping,
    pub key_column: String,
    /// Extend the schema with a row's columns even when the row itself is
    /// not inserted.
    pub auto_add_columns: bool,
}

impl Default for Merger {
    fn default() -> Self {
        Self {
            mapping: ColumnMapping::default(),
            key_column: columns::NAME.to_string(),
            auto_add_columns: true,
        }
    }
}

impl Merger {
    pub fn from_config(config: &crate::config::CatalogConfig) -> Self {
        Self {
            mapping: config.mapping.clone(),
            key_column: config.key_column.clone(),
            auto_add_columns: config.auto_add_columns,
        }
    }

    pub fn process(&self, existing: &mut ProductTable, selected: &RowSet<'_>) -> MergeReport {
        let mut report = MergeReport::default();
        for source in selected.iter() {
            let new_row = normalize(source, &self.mapping);
            if self.auto_add_columns {
                report.events.extend(extend_schema(existing, &new_row));
            }
            let key = new_row.text(&self.key_column).map(|k| k.into_owned());
            let before = existing.column_names.len();
            match reconcile(existing, new_row.clone(), &self.key_column) {
                Outcome::Inserted => {
                    report.inserted += 1;
                    report.events.extend(
                        existing.column_names[before..]
                            .iter()
                            .map(|c| SchemaEvent::ColumnAdded(c.clone())),
                    );
                }
                Outcome::NoChange => report.unchanged += 1,
                Outcome::ConflictsFound(deltas) => {
                    // Conflicts only happen on a key match.
                    if let Some(key) = key {
                        if let Some(row) = find_by_key(existing, &self.key_column, &key) {
                            report.pending.push(PendingUpdate {
                                key,
                                row,
                                new_row,
                                deltas,
                            });
                        }
                    }
                }
            }
        }
        if report.inserted > 0 {
            log::info!("Appended {} new row(s) to output", report.inserted);
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Cascading source selection
// ---------------------------------------------------------------------------

/// Multi-select filters applied level by level; each level's options come
/// from the rows left by the levels before it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeSelection {
    pub levels: Vec<(String, BTreeSet<String>)>,
}

impl CascadeSelection {
    /// The PIM hierarchy: Level 02 → Level 03 → Level 04 → Catalog Description.
    pub fn pim(
        level02: BTreeSet<String>,
        level03: BTreeSet<String>,
        level04: BTreeSet<String>,
        names: BTreeSet<String>,
    ) -> Self {
        CascadeSelection {
            levels: vec![
                (LEVEL_02.to_string(), level02),
                (LEVEL_03.to_string(), level03),
                (LEVEL_04.to_string(), level04),
                (CATALOG_DESCRIPTION.to_string(), names),
            ],
        }
    }

    /// Returns the selected rows and, per level, the options it offered.
    pub fn apply<'a>(&self, table: &'a ProductTable) -> (RowSet<'a>, Vec<BTreeSet<String>>) {
        let mut rows = table.all_rows();
        let mut options = Vec::with_capacity(self.levels.len());
        for (column, selected) in &self.levels {
            options.push(distinct_values(&rows, column));
            rows = select_values(&rows, column, selected);
        }
        (rows, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn source_row(l2: &str, l3: &str, l4: &str, name: &str, desc: &str) -> Product {
        [
            (LEVEL_02, l2),
            (LEVEL_03, l3),
            (LEVEL_04, l4),
            (CATALOG_DESCRIPTION, name),
            (LONG_DESCRIPTION, desc),
            (PRIMARY_IMAGE, "img.png"),
            ("Weight;number", "2 kg"),
        ]
        .into_iter()
        .collect()
    }

    fn output_table() -> ProductTable {
        let row: Product = [
            ("Product Group", "Automation"),
            ("Category", "Sensors"),
            ("Series", "X100"),
            ("Name", "Prox A"),
            ("Description", "Old text"),
        ]
        .into_iter()
        .collect();
        ProductTable::from_rows(vec![row])
    }

    #[test]
    fn normalize_renames_and_keeps_unmapped() {
        let row = normalize(
            &source_row("Automation", "Sensors", "X100", "Prox A", "Long"),
            &ColumnMapping::default(),
        );
        let cols: Vec<&str> = row.columns().collect();
        assert_eq!(
            cols,
            vec![
                "Category",
                "Description",
                "Featured image",
                "Name",
                "Product Group",
                "Series",
                "Weight;number"
            ]
        );
        assert_eq!(row.text("Name").as_deref(), Some("Prox A"));
    }

    #[test]
    fn missing_source_columns_are_reported() {
        let source = ProductTable::new(vec![CATALOG_DESCRIPTION.into()], Vec::new());
        let err = ColumnMapping::default().check_source(&source).unwrap_err();
        let SchemaError::MissingColumns { missing } = err;
        assert_eq!(missing.len(), 5);
    }

    #[test]
    fn reconcile_inserts_new_keys() {
        let mut table = output_table();
        let mut row = Product::new();
        row.set("Name", "Prox B");
        row.set("Colour;lov", "red");
        assert_eq!(reconcile(&mut table, row, "Name"), Outcome::Inserted);
        assert_eq!(table.len(), 2);
        assert!(table.has_column("Colour;lov"));
    }

    #[test]
    fn reconcile_reports_conflicts_without_applying() {
        let mut table = output_table();
        let mut row = table.rows[0].clone();
        row.set("Description", "New text");
        let outcome = reconcile(&mut table, row, "Name");
        assert_eq!(
            outcome,
            Outcome::ConflictsFound(vec![FieldDelta {
                field: "Description".into(),
                existing: "Old text".into(),
                new: "New text".into(),
            }])
        );
        assert_eq!(table.rows[0].text("Description").as_deref(), Some("Old text"));

        let same = table.rows[0].clone();
        assert_eq!(reconcile(&mut table, same, "Name"), Outcome::NoChange);
    }

    #[test]
    fn text_rendering_hides_type_differences() {
        let mut a = Product::new();
        a.set("Price", "3");
        let mut b = Product::new();
        b.set("Price", CellValue::Float(3.0));
        b.set("Note", CellValue::Null);
        assert!(compare_rows(&a, &b).is_empty());
    }

    #[test]
    fn numbers_compare_by_value() {
        let mut csv_row = Product::new();
        csv_row.set("Poles;number", "2.0");
        csv_row.set("SKU", "A-2");
        let mut workbook_row = Product::new();
        workbook_row.set("Poles;number", CellValue::Float(2.0));
        workbook_row.set("SKU", "A-2.0");
        let deltas = compare_rows(&csv_row, &workbook_row);
        assert_eq!(
            deltas,
            vec![FieldDelta {
                field: "SKU".into(),
                existing: "A-2".into(),
                new: "A-2.0".into(),
            }]
        );

        workbook_row.set("Poles;number", CellValue::Integer(3));
        workbook_row.set("SKU", "A-2");
        assert_eq!(compare_rows(&csv_row, &workbook_row).len(), 1);
    }

    #[test]
    fn merge_then_confirm_selected_fields() {
        let source = ProductTable::from_rows(vec![
            source_row("Automation", "Sensors", "X100", "Prox A", "New text"),
            source_row("Automation", "Sensors", "X200", "Prox B", "Fresh"),
        ]);
        let mut output = output_table();
        let merger = Merger::default();
        let report = merger.process(&mut output, &source.all_rows());

        assert_eq!(report.inserted, 1);
        assert_eq!(report.unchanged, 0);
        assert_eq!(report.pending.len(), 1);
        assert_eq!(
            report.events,
            vec![
                SchemaEvent::ColumnAdded("Featured image".into()),
                SchemaEvent::ColumnAdded("Weight;number".into()),
            ]
        );

        let pending = &report.pending[0];
        let fields: Vec<&str> = pending.deltas.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["Description", "Featured image", "Weight;number"]);

        let events = apply_update(&mut output, pending, "Name", Some(&["Description".to_string()])).unwrap();
        assert!(events.is_empty());
        assert_eq!(output.rows[0].text("Description").as_deref(), Some("New text"));
        assert_eq!(output.rows[0].get("Weight;number"), None);
    }

    #[test]
    fn update_without_auto_add_extends_schema_first() {
        let mut output = output_table();
        let merger = Merger {
            auto_add_columns: false,
            ..Merger::default()
        };
        let source = ProductTable::from_rows(vec![source_row("Automation", "Sensors", "X100", "Prox A", "Old text")]);
        let report = merger.process(&mut output, &source.all_rows());
        assert!(report.events.is_empty());
        assert!(!output.has_column("Weight;number"));

        let events = apply_update(&mut output, &report.pending[0], "Name", None).unwrap();
        assert_eq!(
            events,
            vec![
                SchemaEvent::ColumnAdded("Featured image".into()),
                SchemaEvent::ColumnAdded("Weight;number".into()),
            ]
        );
        assert_eq!(output.rows[0].text("Weight;number").as_deref(), Some("2 kg"));
    }

    #[test]
    fn stale_updates_are_refused() {
        let mut output = output_table();
        let pending = PendingUpdate {
            key: "Someone else".into(),
            row: 0,
            new_row: Product::new(),
            deltas: Vec::new(),
        };
        assert_eq!(
            apply_update(&mut output, &pending, "Name", None),
            Err(MergeError::StaleUpdate {
                key: "Someone else".into(),
                row: 0
            })
        );
    }

    #[test]
    fn cascade_narrows_each_level_from_the_previous() {
        let source = ProductTable::from_rows(vec![
            source_row("Automation", "Sensors", "X100", "Prox A", ""),
            source_row("Automation", "Relays", "R1", "Relay", ""),
            source_row("Healthcare", "Monitors", "M1", "BP", ""),
        ]);
        let selection = CascadeSelection::pim(
            ["Automation".to_string()].into(),
            BTreeSet::new(),
            ["R1".to_string()].into(),
            BTreeSet::new(),
        );
        let (rows, options) = selection.apply(&source);
        assert_eq!(rows.indices(), &[1]);
        assert_eq!(options[1], ["Relays".to_string(), "Sensors".to_string()].into());
        assert_eq!(options[3], ["Relay".to_string()].into());
    }
}
