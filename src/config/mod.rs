//! Catalog configuration, read from a JSON file.
//!
//! Every field has a default, so a config file only needs the keys it changes:
//!
//! ```json
//! { "require_series_for_specs": true, "key_column": "SKU" }
//! ```

pub mod views;

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::filter::PipelineOptions;
use crate::data::loader::LoadOptions;
use crate::data::model::columns;
use crate::normalize::ColumnMapping;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Columns a catalog must have before any filtering is attempted.
    pub required_columns: Vec<String>,
    /// Drop products without a category or series at load time.
    pub drop_incomplete_rows: bool,
    /// Offer spec filters only after a series is selected.
    pub require_series_for_specs: bool,
    /// Natural key used to match incoming products against the output table.
    pub key_column: String,
    /// Source → catalog column renames for the normalizer.
    pub mapping: ColumnMapping,
    /// Add unknown columns to the output table as rows are merged.
    pub auto_add_columns: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            required_columns: vec![
                columns::CATEGORY.to_string(),
                columns::SERIES.to_string(),
                columns::NAME.to_string(),
            ],
            drop_incomplete_rows: true,
            require_series_for_specs: false,
            key_column: columns::NAME.to_string(),
            mapping: ColumnMapping::default(),
            auto_add_columns: true,
        }
    }
}

impl CatalogConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            require_series_for_specs: self.require_series_for_specs,
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            required_columns: self.required_columns.clone(),
            drop_incomplete_rows: self.drop_incomplete_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "require_series_for_specs": true, "key_column": "SKU" }}"#).unwrap();
        let config = CatalogConfig::load(file.path()).unwrap();
        assert!(config.require_series_for_specs);
        assert_eq!(config.key_column, "SKU");
        assert!(config.drop_incomplete_rows);
        assert_eq!(config.mapping, ColumnMapping::default());
        assert!(config.pipeline_options().require_series_for_specs);
    }

    #[test]
    fn bad_json_is_reported_with_the_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = CatalogConfig::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("parsing config"));
    }

    #[test]
    fn no_path_means_defaults() {
        assert_eq!(CatalogConfig::load_or_default(None).unwrap(), CatalogConfig::default());
    }
}
