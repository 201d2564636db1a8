//! CSV export of acquired records.

use crate::core::types::Record;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const COLUMNS: [&str; 12] = [
    "name",
    "address",
    "website",
    "phone_number",
    "reviews_count",
    "reviews_average",
    "store_shopping",
    "in_store_pickup",
    "store_delivery",
    "place_type",
    "opens_at",
    "introduction",
];
pub const LABEL_COLUMN: &str = "city";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),
}

fn yes_no(flag: bool) -> String {
    if flag { "Yes" } else { "No" }.to_string()
}

fn record_row(record: &Record, with_label: bool) -> Vec<String> {
    let mut row = vec![
        record.name.clone(),
        record.address.clone(),
        record.website.clone(),
        record.phone_number.clone(),
        record.reviews_count.map(|n| n.to_string()).unwrap_or_default(),
        record.reviews_average.map(|v| format!("{:.1}", v)).unwrap_or_default(),
        yes_no(record.store_shopping),
        yes_no(record.in_store_pickup),
        yes_no(record.store_delivery),
        record.place_type.clone(),
        record.opens_at.clone(),
        record.introduction.clone(),
    ];
    if with_label {
        row.push(record.target_label.clone().unwrap_or_default());
    }
    row
}

/// Header and rendered rows for every column, before any collapsing.
fn full_table(records: &[Record]) -> (Vec<String>, Vec<Vec<String>>) {
    let with_label = records.iter().any(|r| r.target_label.is_some());
    let mut header: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
    if with_label {
        header.push(LABEL_COLUMN.to_string());
    }
    let rows = records.iter().map(|r| record_row(r, with_label)).collect();
    (header, rows)
}

/// Header and rendered rows, with constant columns dropped.
///
/// With two or more rows, a column whose rendered value is identical on every
/// row carries no information and is removed. `name` always stays. The label
/// column only appears when some record has a label.
pub fn render_table(records: &[Record]) -> (Vec<String>, Vec<Vec<String>>) {
    let (header, rows) = full_table(records);
    if rows.len() < 2 {
        return (header, rows);
    }

    let keep: Vec<bool> = (0..header.len())
        .map(|col| header[col] == "name" || rows.iter().any(|row| row[col] != rows[0][col]))
        .collect();

    let select = |cells: Vec<String>| -> Vec<String> {
        cells
            .into_iter()
            .zip(&keep)
            .filter_map(|(cell, keep)| keep.then_some(cell))
            .collect()
    };
    (select(header), rows.into_iter().map(select).collect())
}

/// Rows laid out under an existing header. Columns the header lacks are
/// dropped; columns it has but the batch does not render are left empty.
fn project_onto(existing: &[String], records: &[Record]) -> Vec<Vec<String>> {
    let (header, rows) = full_table(records);
    let dropped: Vec<&str> = header
        .iter()
        .filter(|col| !existing.contains(*col))
        .map(String::as_str)
        .collect();
    if !dropped.is_empty() {
        warn!("Existing header has no {:?} column(s); values not written", dropped);
    }
    let positions: Vec<Option<usize>> = existing
        .iter()
        .map(|col| header.iter().position(|h| h == col))
        .collect();
    rows.into_iter()
        .map(|row| {
            positions
                .iter()
                .map(|pos| pos.map(|i| row[i].clone()).unwrap_or_default())
                .collect()
        })
        .collect()
}

/// Header row of an existing CSV file, `None` when missing or empty.
fn existing_header(path: &Path) -> Result<Option<Vec<String>>, ExportError> {
    if std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true) {
        return Ok(None);
    }
    let mut reader = csv::ReaderBuilder::new().has_headers(false).from_path(path)?;
    let mut first = csv::StringRecord::new();
    if !reader.read_record(&mut first)? {
        return Ok(None);
    }
    Ok(Some(first.iter().map(str::to_string).collect()))
}

/// Write `records` to `path`. Returns the number of rows written.
///
/// Overwrite mode (and append to a missing or empty file) writes a header and
/// collapsed rows. Appending to a file that already has a header keeps that
/// header and lays the new rows out under it. An empty input leaves the file
/// untouched.
pub fn save_records_csv(records: &[Record], path: &Path, append: bool) -> Result<usize, ExportError> {
    if records.is_empty() {
        warn!("No data to save; {} left untouched", path.display());
        return Ok(0);
    }

    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let existing = if append { existing_header(path)? } else { None };
    let (header, rows) = match &existing {
        Some(existing) => (None, project_onto(existing, records)),
        None => {
            let (header, rows) = render_table(records);
            (Some(header), rows)
        }
    };

    let file = if append {
        OpenOptions::new().create(true).append(true).open(path)
    } else {
        OpenOptions::new().create(true).write(true).truncate(true).open(path)
    }
    .map_err(io_err)?;

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if let Some(header) = &header {
        writer.write_record(header)?;
    }
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush().map_err(io_err)?;

    info!(
        "Saved {} records to {} (append={})",
        rows.len(),
        path.display(),
        append
    );
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, website: &str) -> Record {
        Record {
            name: name.into(),
            address: format!("{name} street"),
            website: website.into(),
            reviews_count: Some(10),
            ..Default::default()
        }
    }

    #[test]
    fn constant_columns_are_dropped() {
        let (header, rows) = render_table(&[record("A", "same.example"), record("B", "same.example")]);
        assert_eq!(header, vec!["name", "address"]);
        assert_eq!(rows[1], vec!["B", "B street"]);
    }

    #[test]
    fn varying_columns_are_kept() {
        let (header, _) = render_table(&[record("A", "a.example"), record("B", "b.example")]);
        assert!(header.contains(&"website".to_string()));
        assert!(!header.contains(&"reviews_count".to_string()));
    }

    #[test]
    fn name_survives_even_when_constant() {
        let (header, _) = render_table(&[record("A", "a.example"), record("A", "b.example")]);
        assert_eq!(header[0], "name");
    }

    #[test]
    fn single_row_keeps_every_column() {
        let mut r = record("A", "a.example");
        r.store_delivery = true;
        r.target_label = Some("Rome".into());
        let (header, rows) = render_table(&[r]);
        assert_eq!(header.len(), COLUMNS.len() + 1);
        assert_eq!(rows[0][8], "Yes");
        assert_eq!(rows[0][5], "");
        assert_eq!(rows[0][12], "Rome");
    }

    #[test]
    fn append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");
        let batch = [record("A", "a.example"), record("B", "b.example")];

        save_records_csv(&batch, &path, true).unwrap();
        save_records_csv(&batch, &path, true).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert_eq!(text.matches("name,address").count(), 1);
    }

    #[test]
    fn append_follows_existing_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");

        save_records_csv(&[record("A", "a.ex"), record("B", "b.ex")], &path, false).unwrap();
        // Website is constant in this batch and would collapse on its own.
        save_records_csv(&[record("C", "c.ex"), record("D", "c.ex")], &path, true).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "name,address,website");
        assert_eq!(lines[3], "C,C street,c.ex");
        assert_eq!(lines[4], "D,D street,c.ex");

        let mut reader = csv::Reader::from_path(&path).unwrap();
        for row in reader.records() {
            assert_eq!(row.unwrap().len(), 3);
        }
    }

    #[test]
    fn append_leaves_unknown_header_columns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");
        std::fs::write(&path, "name,phone_number,city\n").unwrap();

        let mut labelled = record("E", "e.ex");
        labelled.target_label = Some("Rome".into());
        save_records_csv(&[labelled, record("F", "f.ex")], &path, true).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["name,phone_number,city", "E,,Rome", "F,,"]);
    }

    #[test]
    fn average_keeps_one_decimal() {
        let mut r = record("A", "a.ex");
        r.reviews_average = Some(4.0);
        let (_, rows) = render_table(&[r]);
        assert_eq!(rows[0][5], "4.0");
    }

    #[test]
    fn overwrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");
        let batch = [record("A", "a.example"), record("B", "b.example")];

        save_records_csv(&batch, &path, false).unwrap();
        save_records_csv(&batch[..1], &path, false).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn empty_input_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");
        assert_eq!(save_records_csv(&[], &path, false).unwrap(), 0);
        assert!(!path.exists());
    }
}
