//! Reading and writing datasets as CSV or JSON files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use super::{Cell, Dataset};
use crate::store::Record;

/// Load a dataset from a `.csv` or `.json` file, chosen by extension.
pub fn read_path(path: &Path) -> Result<Dataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "json" => read_json(path),
        _ => read_csv(path),
    }
}

/// Load a CSV file with a header row.
///
/// Every field is read as text (empty fields as missing); numeric columns are
/// parsed later by the coercion layer. Rows with too few fields are padded.
pub fn read_csv(path: &Path) -> Result<Dataset> {
    let file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    parse_csv(file).with_context(|| format!("failed to read CSV {}", path.display()))
}

fn parse_csv<R: std::io::Read>(reader: R) -> Result<Dataset> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let columns: Vec<String> = csv_reader
        .headers()
        .context("missing CSV header row")?
        .iter()
        .map(str::to_string)
        .collect();

    let mut dataset = Dataset::new(columns);
    for record in csv_reader.records() {
        let record = record?;
        let row = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    Cell::Missing
                } else {
                    Cell::Text(field.to_string())
                }
            })
            .collect();
        dataset.push_row(row);
    }

    Ok(dataset)
}

/// Load a JSON file holding either an array of records or an object of the
/// form `{"columns": [...], "data": [...]}`.
pub fn read_json(path: &Path) -> Result<Dataset> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse JSON {}", path.display()))?;
    dataset_from_json(&value).with_context(|| format!("unsupported JSON layout in {}", path.display()))
}

fn dataset_from_json(value: &Value) -> Result<Dataset> {
    let (columns, data) = match value {
        Value::Array(items) => (Vec::new(), items.as_slice()),
        Value::Object(obj) => {
            let columns = obj
                .get("columns")
                .and_then(Value::as_array)
                .map(|cols| {
                    cols.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let data = obj
                .get("data")
                .and_then(Value::as_array)
                .context("expected a \"data\" array")?;
            (columns, data.as_slice())
        }
        _ => anyhow::bail!("expected an array of records or an object"),
    };

    let records: Vec<Record> = data.iter().filter_map(|v| v.as_object().cloned()).collect();
    Ok(Dataset::from_records(&columns, &records))
}

/// Render stored records as CSV text with the given column order.
///
/// Keys not listed in `columns` are appended in first-seen order.
pub fn records_to_csv(columns: &[String], records: &[Record]) -> Result<String> {
    let dataset = Dataset::from_records(columns, records);
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(dataset.columns())?;
    for row in dataset.rows() {
        writer.write_record(row.iter().map(csv_field))?;
    }
    let bytes = writer.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output was not UTF-8")
}

fn csv_field(cell: &Cell) -> String {
    match cell {
        Cell::Missing => String::new(),
        Cell::Int(i) => i.to_string(),
        Cell::Float(f) => f.to_string(),
        Cell::Text(s) => s.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_csv_reads_text_and_blanks() {
        let csv = "CompanyName,Year,Revenue\nA,2020,100.5\nB,2021,\n";
        let ds = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(ds.columns(), &["CompanyName", "Year", "Revenue"]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.rows()[0][1], Cell::Text("2020".into()));
        assert_eq!(ds.rows()[1][2], Cell::Missing);
    }

    #[test]
    fn parse_csv_pads_short_rows() {
        let csv = "a,b,c\n1\n";
        let ds = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(ds.rows()[0].len(), 3);
    }

    #[test]
    fn json_accepts_both_layouts() {
        let array = json!([{"CompanyName": "A"}]);
        assert_eq!(dataset_from_json(&array).unwrap().len(), 1);

        let object = json!({"columns": ["CompanyName", "Year"], "data": [{"CompanyName": "A"}]});
        let ds = dataset_from_json(&object).unwrap();
        assert_eq!(ds.columns(), &["CompanyName", "Year"]);

        assert!(dataset_from_json(&json!("nope")).is_err());
    }

    #[test]
    fn records_to_csv_orders_columns() {
        let records = vec![
            json!({"Year": 2020, "CompanyName": "A, Inc", "Revenue": null})
                .as_object()
                .unwrap()
                .clone(),
        ];
        let columns = vec!["CompanyName".to_string(), "Year".to_string(), "Revenue".to_string()];
        let csv = records_to_csv(&columns, &records).unwrap();
        assert_eq!(csv, "CompanyName,Year,Revenue\n\"A, Inc\",2020,\n");
    }
}
