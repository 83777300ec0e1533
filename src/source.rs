//! CSV source reader: one [`SourceRecord`] per data row of the export.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

/// Cell spellings that mean "no value", matching what spreadsheet exports and
/// pandas-produced CSVs write for missing data.
const NA_TOKENS: [&str; 10] = [
    "NaN", "nan", "NA", "N/A", "n/a", "NULL", "null", "None", "<NA>", "#N/A",
];

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || NA_TOKENS.contains(&cell)
}

/// A raw input row keyed by column name.
///
/// Missing cells are not stored, so [`SourceRecord::get`] returning `None` is
/// the missing marker; a present cell is never the empty string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRecord {
    cells: HashMap<String, String>,
}

impl SourceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter; missing spellings are dropped.
    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: &str) {
        if is_missing(value) {
            self.cells.remove(column);
        } else {
            self.cells.insert(column.to_string(), value.to_string());
        }
    }

    /// Missing-aware accessor.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn is_present(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    fn from_row(headers: &StringRecord, row: &StringRecord) -> Self {
        let mut record = Self::new();
        for (column, cell) in headers.iter().zip(row.iter()) {
            record.set(column, cell);
        }
        record
    }
}

/// Read every row of a CSV file with a header line.
pub fn read_records(path: &Path) -> Result<Vec<SourceRecord>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let records = read_records_from_reader(BufReader::with_capacity(8 << 20, file))
        .with_context(|| format!("read {}", path.display()))?;
    info!(path = %path.display(), rows = records.len(), "loaded source rows");
    Ok(records)
}

/// Read CSV rows from any reader. Rows the csv parser rejects are logged and
/// skipped; a missing header line is an error.
pub fn read_records_from_reader<R: Read>(reader: R) -> Result<Vec<SourceRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(reader);
    let headers = rdr.headers().context("read csv header")?.clone();

    let mut records = Vec::new();
    for (idx, row) in rdr.records().enumerate() {
        match row {
            Ok(row) => records.push(SourceRecord::from_row(&headers, &row)),
            Err(err) => warn!(row = idx + 1, error = %err, "skipping malformed csv row"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_na_cells_are_missing() {
        let csv = "AppID,Name,Notes,Price\n10,Counter-Strike,,NaN\n";
        let records = read_records_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.get("AppID"), Some("10"));
        assert_eq!(r.get("Name"), Some("Counter-Strike"));
        assert_eq!(r.get("Notes"), None);
        assert_eq!(r.get("Price"), None);
        assert_eq!(r.get("NoSuchColumn"), None);
    }

    #[test]
    fn quoted_cells_keep_embedded_delimiters() {
        let csv = "AppID,Genres\n20,\"Action,Indie\"\n";
        let records = read_records_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(records[0].get("Genres"), Some("Action,Indie"));
    }

    #[test]
    fn short_rows_leave_trailing_columns_missing() {
        let csv = "AppID,Name,Price\n30,Short\n";
        let records = read_records_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(records[0].get("Name"), Some("Short"));
        assert!(!records[0].is_present("Price"));
    }

    #[test]
    fn builder_drops_missing_spellings() {
        let r = SourceRecord::new().with("Name", "x").with("Notes", "").with("Tags", "null");
        assert!(r.is_present("Name"));
        assert!(!r.is_present("Notes"));
        assert!(!r.is_present("Tags"));
    }
}
