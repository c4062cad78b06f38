//! Row sources for data-driven programs (`@data: "rows.csv" using csv`).

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ExecError;
use crate::value::Value;

/// One row of test data, keyed by column header.
pub type DataRow = BTreeMap<String, Value>;

/// Load every row of `path`. Cells are bound as strings; arithmetic and
/// comparison coerce numeric-looking text on use.
pub fn load_rows(path: &Path, format: &str) -> Result<Vec<DataRow>, ExecError> {
    let fail = |message: String| ExecError::Data {
        path: path.display().to_string(),
        message,
    };

    if !path.exists() {
        return Err(fail("data file does not exist".to_owned()));
    }
    match format.to_ascii_lowercase().as_str() {
        "csv" => load_csv(path).map_err(|e| fail(e.to_string())),
        other => Err(fail(format!("unsupported data format '{}'", other))),
    }
}

fn load_csv(path: &Path) -> Result<Vec<DataRow>, csv::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(h, cell)| (h.trim().to_owned(), Value::from(cell)))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_are_keyed_by_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "user, expected\nalice,1\nbob,2\n").unwrap();

        let rows = load_rows(&path, "CSV").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["user"], Value::from("alice"));
        assert_eq!(rows[1]["expected"], Value::from("2"));
    }

    #[test]
    fn missing_file_and_unknown_format_are_errors() {
        let err = load_rows(Path::new("/nonexistent/rows.csv"), "csv").unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.xlsx");
        std::fs::write(&path, "").unwrap();
        let err = load_rows(&path, "excel").unwrap_err();
        assert!(err.to_string().contains("unsupported data format 'excel'"));
    }
}
