use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::spec::{is_spec_header, SpecColumn};
use crate::error::SchemaError;

/// Canonical catalog column names.
pub mod columns {
    pub const CATEGORY: &str = "Category";
    pub const SERIES: &str = "Series";
    pub const PRODUCT_GROUP: &str = "Product Group";
    pub const NAME: &str = "Name";
    pub const DESCRIPTION: &str = "Description";
    pub const PRICE: &str = "Sale price in Australia";
    pub const SKU: &str = "SKU";
    pub const FEATURED_IMAGE: &str = "Featured image";
    pub const LIFECYCLE: &str = "Product life cycle";
}

// ---------------------------------------------------------------------------
// CellValue – a single cell of the product table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell as read from CSV, JSON, Parquet or a workbook.
/// Using `BTreeMap` / `BTreeSet` downstream so `CellValue` must be `Ord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

// -- Manual Eq/Ord so we can put CellValue in BTreeSet --

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                Text(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Text(s) => s.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::Null => {}
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("<null>"),
        }
    }
}

impl CellValue {
    /// Canonical text rendering used by spec parsing and key comparison.
    ///
    /// Returns `None` for nulls and for blank text, which both count as an
    /// absent cell.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            CellValue::Null => None,
            CellValue::Text(s) if s.trim().is_empty() => None,
            CellValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            CellValue::Integer(i) => Some(Cow::Owned(i.to_string())),
            CellValue::Float(v) => Some(Cow::Owned(format!("{v}"))),
            CellValue::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
        }
    }

    pub fn is_absent(&self) -> bool {
        self.as_text().is_none()
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Integer(i)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

// ---------------------------------------------------------------------------
// Product – one row of the catalog
// ---------------------------------------------------------------------------

/// A single product row: column_name → value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Product {
    pub cells: BTreeMap<String, CellValue>,
}

impl Product {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }

    /// Text of a column, `None` when the column is missing or the cell is blank.
    pub fn text(&self, column: &str) -> Option<Cow<'_, str>> {
        self.cells.get(column).and_then(CellValue::as_text)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        self.cells.insert(column.into(), value.into());
    }

    pub fn remove(&mut self, column: &str) -> Option<CellValue> {
        self.cells.remove(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for Product {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Product {
            cells: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProductTable – the complete loaded catalog
// ---------------------------------------------------------------------------

/// The full parsed catalog with its classified spec columns.
#[derive(Debug, Clone, Default)]
pub struct ProductTable {
    /// All products (rows).
    pub rows: Vec<Product>,
    /// Column names in source order.
    pub column_names: Vec<String>,
    /// Columns whose header declares a recognized spec kind, in source order.
    pub spec_columns: Vec<SpecColumn>,
    /// Headers that look like spec columns but declare an unknown kind.
    pub skipped_headers: Vec<String>,
}

impl ProductTable {
    /// Build a table with an explicit column order.
    pub fn new(column_names: Vec<String>, rows: Vec<Product>) -> Self {
        let mut table = ProductTable {
            rows,
            column_names: Vec::new(),
            spec_columns: Vec::new(),
            skipped_headers: Vec::new(),
        };
        for name in column_names {
            table.add_column(&name);
        }
        table
    }

    /// Build a table whose columns are collected from the rows themselves,
    /// in order of first appearance.
    pub fn from_rows(rows: Vec<Product>) -> Self {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut column_names = Vec::new();
        for row in &rows {
            for col in row.columns() {
                if seen.insert(col) {
                    column_names.push(col.to_string());
                }
            }
        }
        ProductTable::new(column_names, rows)
    }

    /// Number of products.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    pub fn spec_column(&self, header: &str) -> Option<&SpecColumn> {
        self.spec_columns.iter().find(|c| c.header == header)
    }

    /// Append a column to the schema. Returns `false` if it already existed.
    pub fn add_column(&mut self, name: &str) -> bool {
        if self.has_column(name) {
            return false;
        }
        self.column_names.push(name.to_string());
        if is_spec_header(name) {
            match SpecColumn::from_header(name) {
                Some(column) => self.spec_columns.push(column),
                None => {
                    log::debug!("Skipping spec column with unrecognized kind: {name:?}");
                    self.skipped_headers.push(name.to_string());
                }
            }
        }
        true
    }

    /// Append a row, extending the schema with any columns it introduces.
    /// Returns the names of the columns that were added.
    pub fn push_row(&mut self, row: Product) -> Vec<String> {
        let added: Vec<String> = row
            .columns()
            .filter(|c| !self.has_column(c))
            .map(str::to_string)
            .collect();
        for col in &added {
            self.add_column(col);
        }
        self.rows.push(row);
        added
    }

    /// Fail with [`SchemaError::MissingColumns`] if any required column is absent.
    pub fn require_columns<S: AsRef<str>>(&self, required: &[S]) -> Result<(), SchemaError> {
        let missing: Vec<String> = required
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| !self.has_column(c))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::MissingColumns { missing })
        }
    }

    /// Drop rows where any of `columns` is blank. Columns missing from the
    /// schema are not checked. Returns the number dropped.
    pub fn drop_incomplete(&mut self, columns: &[&str]) -> usize {
        let present: Vec<&str> = columns
            .iter()
            .copied()
            .filter(|col| self.has_column(col))
            .collect();
        let before = self.rows.len();
        self.rows
            .retain(|row| present.iter().all(|col| row.text(col).is_some()));
        before - self.rows.len()
    }

    /// A row set covering every product.
    pub fn all_rows(&self) -> RowSet<'_> {
        RowSet::all(self)
    }
}

// ---------------------------------------------------------------------------
// RowSet – an immutable view over a subset of the table
// ---------------------------------------------------------------------------

/// Indices into a [`ProductTable`]. Filtering produces a new set and never
/// touches the table or the input set.
#[derive(Debug, Clone)]
pub struct RowSet<'a> {
    table: &'a ProductTable,
    indices: Vec<usize>,
}

impl<'a> RowSet<'a> {
    pub fn all(table: &'a ProductTable) -> Self {
        RowSet {
            table,
            indices: (0..table.len()).collect(),
        }
    }

    /// Out-of-range indices are discarded.
    pub fn from_indices(table: &'a ProductTable, indices: Vec<usize>) -> Self {
        let indices = indices.into_iter().filter(|&i| i < table.len()).collect();
        RowSet { table, indices }
    }

    pub fn table(&self) -> &'a ProductTable {
        self.table
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn into_indices(self) -> Vec<usize> {
        self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Product> + '_ {
        let table = self.table;
        self.indices.iter().map(move |&i| &table.rows[i])
    }

    /// Pairs of (table row index, product).
    pub fn enumerate(&self) -> impl Iterator<Item = (usize, &'a Product)> + '_ {
        let table = self.table;
        self.indices.iter().map(move |&i| (i, &table.rows[i]))
    }

    pub fn filter(&self, mut keep: impl FnMut(&'a Product) -> bool) -> RowSet<'a> {
        let table = self.table;
        RowSet {
            table,
            indices: self
                .indices
                .iter()
                .copied()
                .filter(|&i| keep(&table.rows[i]))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::spec::SpecKind;

    #[test]
    fn text_rendering_treats_blank_as_absent() {
        assert_eq!(CellValue::from("  ").as_text(), None);
        assert_eq!(CellValue::Null.as_text(), None);
        assert_eq!(CellValue::Float(3.0).as_text().as_deref(), Some("3"));
        assert_eq!(CellValue::Float(1.5).as_text().as_deref(), Some("1.5"));
        assert_eq!(CellValue::Bool(true).as_text().as_deref(), Some("true"));
    }

    #[test]
    fn table_classifies_spec_headers() {
        let table = ProductTable::new(
            vec![
                "Name".into(),
                "Weight;number".into(),
                "Colour; LOV ".into(),
                "Odd;widget".into(),
            ],
            Vec::new(),
        );
        let kinds: Vec<SpecKind> = table.spec_columns.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![SpecKind::Number, SpecKind::Lov]);
        assert_eq!(table.skipped_headers, vec!["Odd;widget".to_string()]);
    }

    #[test]
    fn require_columns_lists_every_missing_column() {
        let table = ProductTable::new(vec!["Name".into()], Vec::new());
        let err = table.require_columns(&["Category", "Name", "Series"]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingColumns {
                missing: vec!["Category".into(), "Series".into()]
            }
        );
    }

    #[test]
    fn drop_incomplete_skips_columns_outside_the_schema() {
        let rows: Vec<Product> = vec![
            [("Name", "A"), ("Series", "X1")].into_iter().collect(),
            [("Name", "B"), ("Series", " ")].into_iter().collect(),
        ];
        let mut table = ProductTable::from_rows(rows);
        assert_eq!(table.drop_incomplete(&["Category", "Series"]), 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.drop_incomplete(&["Category"]), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn push_row_extends_schema() {
        let mut table = ProductTable::new(vec!["Name".into()], Vec::new());
        let row: Product = [("Name", "A"), ("Size;range", "1-2 mm")].into_iter().collect();
        let added = table.push_row(row);
        assert_eq!(added, vec!["Size;range".to_string()]);
        assert_eq!(table.spec_columns.len(), 1);
    }

    #[test]
    fn row_set_filter_does_not_touch_input() {
        let rows: Vec<Product> = (0..4i64)
            .map(|i| [("n", CellValue::Integer(i))].into_iter().collect())
            .collect();
        let table = ProductTable::from_rows(rows);
        let all = table.all_rows();
        let even = all.filter(|p| matches!(p.get("n"), Some(CellValue::Integer(i)) if i % 2 == 0));
        assert_eq!(even.indices(), &[0, 2]);
        assert_eq!(all.len(), 4);
    }
}
