//! Per product group layouts for the spec tables, stored as one JSON file:
//!
//! ```json
//! {
//!   "Automation": {
//!     "series_configs": [
//!       { "series": ["X100"], "group_by_cols": ["Poles;number"], "display_col": null,
//!         "pivot_required": false, "pivot_col": null, "pivot_value_col": null }
//!     ]
//!   }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::domain::distinct_values;
use crate::data::model::{columns, RowSet};
use crate::data::spec::is_spec_header;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesViewConfig {
    pub series: Vec<String>,
    pub group_by_cols: Vec<String>,
    pub display_col: Option<String>,
    pub pivot_required: bool,
    pub pivot_col: Option<String>,
    pub pivot_value_col: Option<String>,
}

impl SeriesViewConfig {
    /// Pivot fields only mean something when pivoting; the pivot values are
    /// always product names.
    pub fn finalize(mut self) -> Self {
        if self.pivot_required {
            self.pivot_value_col = Some(columns::NAME.to_string());
        } else {
            self.pivot_col = None;
            self.pivot_value_col = None;
        }
        self
    }

    /// Check against the rows of the product group this config belongs to.
    pub fn validate(&self, rows: &RowSet<'_>) -> Result<(), ConfigError> {
        if self.series.is_empty() {
            return Err(ConfigError::NoSeries);
        }
        let known = distinct_values(rows, columns::SERIES);
        let unknown: Vec<String> = self
            .series
            .iter()
            .filter(|s| !known.contains(*s))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ConfigError::UnknownSeries(unknown));
        }

        let spec_columns: BTreeSet<String> = available_spec_columns(rows).into_iter().collect();
        let check = |col: &String| {
            if spec_columns.contains(col) {
                Ok(())
            } else {
                Err(ConfigError::UnknownColumn(col.clone()))
            }
        };
        self.group_by_cols.iter().try_for_each(check)?;
        if let Some(col) = &self.display_col {
            check(col)?;
        }
        if self.pivot_required {
            match &self.pivot_col {
                Some(col) => check(col)?,
                None => return Err(ConfigError::MissingPivotColumn),
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductGroupViews {
    pub series_configs: Vec<SeriesViewConfig>,
}

/// Product group → its view configurations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecViewConfigs(pub BTreeMap<String, ProductGroupViews>);

impl SpecViewConfigs {
    /// A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No view config at {}, starting empty", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading view config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing view config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("serializing view config")?;
        std::fs::write(path, text)
            .with_context(|| format!("writing view config {}", path.display()))?;
        log::info!("Saved view config to {}", path.display());
        Ok(())
    }

    pub fn group(&self, group: &str) -> &[SeriesViewConfig] {
        self.0
            .get(group)
            .map(|g| g.series_configs.as_slice())
            .unwrap_or_default()
    }

    pub fn add(&mut self, group: &str, config: SeriesViewConfig) {
        self.0
            .entry(group.to_string())
            .or_default()
            .series_configs
            .push(config.finalize());
    }

    pub fn replace(
        &mut self,
        group: &str,
        index: usize,
        config: SeriesViewConfig,
    ) -> Result<(), ConfigError> {
        let slot = self.slot(group, index)?;
        *slot = config.finalize();
        Ok(())
    }

    pub fn remove(&mut self, group: &str, index: usize) -> Result<SeriesViewConfig, ConfigError> {
        self.slot(group, index)?;
        let configs = &mut self
            .0
            .get_mut(group)
            .ok_or_else(|| ConfigError::UnknownGroup(group.to_string()))?
            .series_configs;
        Ok(configs.remove(index))
    }

    fn slot(&mut self, group: &str, index: usize) -> Result<&mut SeriesViewConfig, ConfigError> {
        let views = self
            .0
            .get_mut(group)
            .ok_or_else(|| ConfigError::UnknownGroup(group.to_string()))?;
        views
            .series_configs
            .get_mut(index)
            .ok_or_else(|| ConfigError::IndexOutOfRange {
                group: group.to_string(),
                index,
            })
    }
}

/// Sorted spec headers holding at least one value in `rows`.
pub fn available_spec_columns(rows: &RowSet<'_>) -> Vec<String> {
    let mut cols: Vec<String> = rows
        .table()
        .column_names
        .iter()
        .filter(|c| is_spec_header(c))
        .filter(|c| rows.iter().any(|p| p.text(c).is_some()))
        .cloned()
        .collect();
    cols.sort();
    cols
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Product, ProductTable};
    use pretty_assertions::assert_eq;

    fn table() -> ProductTable {
        let rows = vec![
            [("Series", "X100"), ("Poles;number", "2"), ("Colour;lov", ""), ("Name", "A")],
            [("Series", "X200"), ("Poles;number", "4"), ("Colour;lov", ""), ("Name", "B")],
        ]
        .into_iter()
        .map(|r| r.into_iter().collect::<Product>())
        .collect();
        ProductTable::from_rows(rows)
    }

    fn config() -> SeriesViewConfig {
        SeriesViewConfig {
            series: vec!["X100".into()],
            group_by_cols: vec!["Poles;number".into()],
            ..Default::default()
        }
    }

    #[test]
    fn only_populated_spec_columns_are_available() {
        let table = table();
        assert_eq!(available_spec_columns(&table.all_rows()), vec!["Poles;number".to_string()]);
    }

    #[test]
    fn validation_rules() {
        let table = table();
        let rows = table.all_rows();
        assert_eq!(config().validate(&rows), Ok(()));

        let no_series = SeriesViewConfig { series: Vec::new(), ..config() };
        assert_eq!(no_series.validate(&rows), Err(ConfigError::NoSeries));

        let bad_series = SeriesViewConfig { series: vec!["Z9".into()], ..config() };
        assert_eq!(bad_series.validate(&rows), Err(ConfigError::UnknownSeries(vec!["Z9".into()])));

        let empty_col = SeriesViewConfig { display_col: Some("Colour;lov".into()), ..config() };
        assert_eq!(empty_col.validate(&rows), Err(ConfigError::UnknownColumn("Colour;lov".into())));

        let pivot = SeriesViewConfig { pivot_required: true, ..config() };
        assert_eq!(pivot.validate(&rows), Err(ConfigError::MissingPivotColumn));
    }

    #[test]
    fn edits_and_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("views.json");
        let mut store = SpecViewConfigs::load(&path).unwrap();
        assert!(store.0.is_empty());

        store.add("Automation", SeriesViewConfig { pivot_col: Some("Poles;number".into()), ..config() });
        assert_eq!(store.group("Automation")[0].pivot_col, None);

        let pivot = SeriesViewConfig {
            pivot_required: true,
            pivot_col: Some("Poles;number".into()),
            ..config()
        };
        store.replace("Automation", 0, pivot).unwrap();
        assert_eq!(store.group("Automation")[0].pivot_value_col.as_deref(), Some("Name"));
        assert_eq!(
            store.replace("Automation", 3, config()),
            Err(ConfigError::IndexOutOfRange { group: "Automation".into(), index: 3 })
        );

        store.save(&path).unwrap();
        let reloaded = SpecViewConfigs::load(&path).unwrap();
        assert_eq!(reloaded, store);

        store.remove("Automation", 0).unwrap();
        assert!(store.group("Automation").is_empty());
        assert_eq!(store.remove("Healthcare", 0), Err(ConfigError::UnknownGroup("Healthcare".into())));
    }
}
