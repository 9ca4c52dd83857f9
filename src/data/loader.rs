use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use arrow::util::display::array_value_to_string;
use calamine::{open_workbook_auto, Data, Reader};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{columns, CellValue, Product, ProductTable};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a product table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, one product per record
/// * `.json`    – `[{ "Name": "...", "Weight;number": "3 kg", ... }, ...]`
/// * `.parquet` – flat scalar columns
/// * `.xlsx` / `.xlsm` / `.xlsb` / `.xls` / `.ods` – first worksheet, first row as headers
pub fn load_file(path: &Path) -> Result<ProductTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => load_csv(path),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => load_workbook(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

/// How a catalog is checked and cleaned after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub required_columns: Vec<String>,
    /// Drop products without a category or series.
    pub drop_incomplete_rows: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            required_columns: vec![
                columns::CATEGORY.to_string(),
                columns::SERIES.to_string(),
                columns::NAME.to_string(),
            ],
            drop_incomplete_rows: true,
        }
    }
}

/// Load a catalog and validate its schema.
///
/// Missing required columns fail with a [`crate::error::SchemaError`]
/// (reachable through `downcast_ref`) before any row is filtered.
pub fn load_catalog(path: &Path, options: &LoadOptions) -> Result<ProductTable> {
    let mut table = load_file(path)?;
    table
        .require_columns(&options.required_columns)
        .with_context(|| format!("validating {}", path.display()))?;

    if options.drop_incomplete_rows {
        for col in [columns::CATEGORY, columns::SERIES] {
            if !table.has_column(col) {
                log::debug!("No {col:?} column, rows are not checked for it");
            }
        }
        let dropped = table.drop_incomplete(&[columns::CATEGORY, columns::SERIES]);
        if dropped > 0 {
            log::warn!("Dropped {dropped} products without a category or series");
        }
    }

    log::info!(
        "Loaded {} products with {} spec columns from {}",
        table.len(),
        table.spec_columns.len(),
        path.display()
    );
    if !table.skipped_headers.is_empty() {
        log::debug!("Ignored spec headers: {:?}", table.skipped_headers);
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Every field is kept as text so SKUs and codes keep their leading zeros;
/// empty fields become nulls. Short records simply lack the trailing columns.
fn load_csv(path: &Path) -> Result<ProductTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let product: Product = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), text_cell(v)))
            .collect();
        rows.push(product);
    }

    Ok(ProductTable::new(headers, rows))
}

fn text_cell(s: &str) -> CellValue {
    if s.trim().is_empty() {
        CellValue::Null
    } else {
        CellValue::Text(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON layout, one object per product:
///
/// ```json
/// [
///   { "Category": "Sensors", "Series": "X100", "Weight;number": "1.5 kg" },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<ProductTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut rows = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let product: Product = obj
            .iter()
            .map(|(key, val)| (key.clone(), json_to_cell(val)))
            .collect();
        rows.push(product);
    }

    Ok(ProductTable::from_rows(rows))
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => text_cell(s),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::Text(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one scalar column per catalog field. Column types
/// without a direct mapping are read through their display form.
fn load_parquet(path: &Path) -> Result<ProductTable> {
    let file = File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let column_names: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for row in 0..batch.num_rows() {
            let product = column_names
                .iter()
                .zip(batch.columns())
                .map(|(name, col)| extract_cell(col, row).map(|cell| (name.clone(), cell)))
                .collect::<Result<Product>>()
                .with_context(|| format!("Row {row}"))?;
            rows.push(product);
        }
    }

    Ok(ProductTable::new(column_names, rows))
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &ArrayRef, row: usize) -> Result<CellValue> {
    if col.is_null(row) {
        return Ok(CellValue::Null);
    }
    let value = match col.data_type() {
        DataType::Utf8 => text_cell(col.as_string::<i32>().value(row)),
        DataType::LargeUtf8 => text_cell(col.as_string::<i64>().value(row)),
        DataType::Int32 => CellValue::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => CellValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::Float32 => CellValue::Float(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => CellValue::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => CellValue::Bool(col.as_boolean().value(row)),
        other => CellValue::Text(
            array_value_to_string(col.as_ref(), row)
                .with_context(|| format!("formatting {other:?} value"))?,
        ),
    };
    Ok(value)
}

// ---------------------------------------------------------------------------
// Workbook loader
// ---------------------------------------------------------------------------

/// First worksheet only. Columns with a blank header and fully blank rows are
/// ignored.
fn load_workbook(path: &Path) -> Result<ProductTable> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("opening workbook {}", path.display()))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .context("workbook has no worksheets")?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("reading worksheet {sheet_name}"))?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = match sheet_rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|c| {
                data_to_cell(c)
                    .as_text()
                    .map(|t| t.trim().to_string())
                    .unwrap_or_default()
            })
            .collect(),
        None => Vec::new(),
    };

    let mut rows = Vec::new();
    for row in sheet_rows {
        let product: Product = headers
            .iter()
            .zip(row)
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, c)| (h.clone(), data_to_cell(c)))
            .collect();
        if product.cells.values().all(CellValue::is_absent) {
            continue;
        }
        rows.push(product);
    }

    let headers = headers.into_iter().filter(|h| !h.is_empty()).collect();
    Ok(ProductTable::new(headers, rows))
}

fn data_to_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Null,
        Data::String(s) => text_cell(s),
        Data::Float(f) => CellValue::Float(*f),
        Data::Int(i) => CellValue::Integer(*i),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Error(e) => {
            log::debug!("Workbook cell error {e:?} read as empty");
            CellValue::Null
        }
        other => CellValue::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Table cache
// ---------------------------------------------------------------------------

/// File identity used to decide whether a cached table is still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("reading metadata of {}", path.display()))?;
        Ok(FileStamp {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

/// Loaded catalogs keyed by canonical path. A table is reloaded when the
/// file's modification time or size changes.
#[derive(Debug, Default)]
pub struct TableCache {
    options: LoadOptions,
    entries: HashMap<PathBuf, (FileStamp, Arc<ProductTable>)>,
}

impl TableCache {
    pub fn new(options: LoadOptions) -> Self {
        Self {
            options,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, path: &Path) -> Result<Arc<ProductTable>> {
        let key = path
            .canonicalize()
            .with_context(|| format!("resolving {}", path.display()))?;
        let stamp = FileStamp::of(&key)?;

        if let Some((cached, table)) = self.entries.get(&key) {
            if *cached == stamp {
                log::debug!("Using cached catalog for {}", key.display());
                return Ok(Arc::clone(table));
            }
            log::info!("{} changed on disk, reloading", key.display());
        }

        let table = Arc::new(load_catalog(&key, &self.options)?);
        self.entries.insert(key, (stamp, Arc::clone(&table)));
        Ok(table)
    }

    /// Forget a cached table. Returns whether one was cached.
    pub fn invalidate(&mut self, path: &Path) -> bool {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.entries.remove(&key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    use crate::error::SchemaError;

    fn write_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const CSV: &str = "Category,Series,Name,SKU,Weight;number,Odd;thing\n\
                       Sensors,X100,Prox A,00123,1.5 kg,x\n\
                       Sensors,,Orphan,00124,2 kg,\n\
                       Relays,R1,Relay,00200,,\n";

    #[test]
    fn csv_keeps_text_and_classifies_headers() {
        let file = write_file(".csv", CSV);
        let table = load_file(file.path()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[0].text("SKU").as_deref(), Some("00123"));
        assert_eq!(table.rows[2].get("Weight;number"), Some(&CellValue::Null));
        assert_eq!(table.spec_columns.len(), 1);
        assert_eq!(table.skipped_headers, vec!["Odd;thing".to_string()]);
    }

    #[test]
    fn catalog_load_drops_rows_without_series() {
        let file = write_file(".csv", CSV);
        let table = load_catalog(file.path(), &LoadOptions::default()).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn trimmed_required_columns_keep_rows_of_a_flat_table() {
        let file = write_file(".csv", "Name,Weight;number\nA,1 kg\nB,2 kg\n");
        let options = LoadOptions {
            required_columns: vec!["Name".into()],
            ..LoadOptions::default()
        };
        let table = load_catalog(file.path(), &options).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn missing_required_columns_are_fatal() {
        let file = write_file(".csv", "Name,Weight;number\nA,1\n");
        let err = load_catalog(file.path(), &LoadOptions::default()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SchemaError>(),
            Some(&SchemaError::MissingColumns {
                missing: vec!["Category".into(), "Series".into()]
            })
        );
    }

    #[test]
    fn json_records_keep_native_types() {
        let file = write_file(
            ".json",
            r#"[{"Name": "A", "Poles;number": 4, "Rated;number": 2.5, "Sealed;logical": true, "Note": null}]"#,
        );
        let table = load_file(file.path()).unwrap();
        let row = &table.rows[0];
        assert_eq!(row.get("Poles;number"), Some(&CellValue::Integer(4)));
        assert_eq!(row.get("Rated;number"), Some(&CellValue::Float(2.5)));
        assert_eq!(row.get("Sealed;logical"), Some(&CellValue::Bool(true)));
        assert_eq!(row.get("Note"), Some(&CellValue::Null));
        assert_eq!(table.spec_columns.len(), 3);
    }

    #[test]
    fn parquet_scalar_columns_load() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Name", DataType::Utf8, true),
            Field::new("Weight;number", DataType::Float64, true),
            Field::new("Stock", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![Some("A"), None])),
                Arc::new(Float64Array::from(vec![Some(1.5), None])),
                Arc::new(Int64Array::from(vec![3, 7])),
            ],
        )
        .unwrap();
        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut writer = ArrowWriter::try_new(file.reopen().unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_file(file.path()).unwrap();
        assert_eq!(table.column_names, vec!["Name", "Weight;number", "Stock"]);
        assert_eq!(table.rows[0].get("Weight;number"), Some(&CellValue::Float(1.5)));
        assert_eq!(table.rows[1].get("Name"), Some(&CellValue::Null));
        assert_eq!(table.rows[1].get("Stock"), Some(&CellValue::Integer(7)));
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let file = write_file(".txt", "hello");
        let err = load_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported file extension"));
    }

    #[test]
    fn cache_reuses_until_the_file_changes() {
        let mut file = write_file(".csv", CSV);
        let mut cache = TableCache::new(LoadOptions::default());
        let first = cache.get(file.path()).unwrap();
        let again = cache.get(file.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        file.write_all(b"Relays,R2,Relay 2,00300,,\n").unwrap();
        file.flush().unwrap();
        let reloaded = cache.get(file.path()).unwrap();
        assert!(!Arc::ptr_eq(&first, &reloaded));
        assert_eq!(reloaded.len(), 3);

        assert!(cache.invalidate(file.path()));
        assert!(cache.is_empty());
    }
}
