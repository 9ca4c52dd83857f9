use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use super::model::ProductTable;

/// Write a table as CSV, columns in schema order. Nulls become empty fields.
pub fn write_csv<W: Write>(table: &ProductTable, writer: W) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(&table.column_names)
        .context("writing CSV header")?;
    for (row_no, product) in table.rows.iter().enumerate() {
        let record = table
            .column_names
            .iter()
            .map(|col| product.text(col).map(|t| t.into_owned()).unwrap_or_default());
        out.write_record(record)
            .with_context(|| format!("writing CSV row {row_no}"))?;
    }
    out.flush().context("flushing CSV output")?;
    Ok(())
}

pub fn save_csv(table: &ProductTable, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_csv(table, std::io::BufWriter::new(file))?;
    log::info!("Wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{CellValue, Product};

    #[test]
    fn columns_follow_schema_and_nulls_are_empty() {
        let mut row = Product::new();
        row.set("Name", "A, the first");
        row.set("Weight;number", CellValue::Float(2.0));
        row.set("Note", CellValue::Null);
        let table = ProductTable::new(
            vec!["Name".into(), "Note".into(), "Weight;number".into()],
            vec![row],
        );
        let mut buf = Vec::new();
        write_csv(&table, &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Name,Note,Weight;number\n\"A, the first\",,2\n"
        );
    }
}
