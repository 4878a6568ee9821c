//! Persisting result tables as CSV or JSON.
//!
//! The format follows the file extension. Writes go to a `.tmp` sibling and
//! are renamed into place so a crash mid-write never leaves a truncated table.

use super::table::{Cell, ResultTable};
use crate::error::SweepError;
use std::path::Path;

/// On-disk table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Json,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self, SweepError> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("csv") => Ok(Self::Csv),
            Some("json") => Ok(Self::Json),
            other => Err(SweepError::invalid_input(format!(
                "unsupported results extension {:?} for {} (expected .csv or .json)",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), SweepError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn to_csv(table: &ResultTable) -> Result<Vec<u8>, SweepError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(Cell::to_field))?;
    }
    writer
        .into_inner()
        .map_err(|e| SweepError::Io(e.into_error()))
}

fn from_csv(data: &[u8]) -> Result<ResultTable, SweepError> {
    let mut reader = csv::Reader::from_reader(data);
    let columns: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(Cell::parse).collect());
    }
    ResultTable::from_parts(columns, rows)
        .ok_or_else(|| SweepError::invalid_input("CSV rows do not match the header width"))
}

/// Write `table` to `path`, choosing the format from the extension.
pub fn save_table(table: &ResultTable, path: &Path) -> Result<(), SweepError> {
    let bytes = match TableFormat::from_path(path)? {
        TableFormat::Csv => to_csv(table)?,
        TableFormat::Json => serde_json::to_vec_pretty(table)?,
    };
    atomic_write(path, &bytes)
}

pub fn load_table(path: &Path) -> Result<ResultTable, SweepError> {
    let format = TableFormat::from_path(path)?;
    let data = std::fs::read(path)?;
    match format {
        TableFormat::Csv => from_csv(&data),
        TableFormat::Json => {
            let table: ResultTable = serde_json::from_slice(&data)?;
            ResultTable::from_parts(table.columns().to_vec(), table.rows().to_vec())
                .ok_or_else(|| SweepError::invalid_input("JSON rows do not match the column count"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample() -> ResultTable {
        let mut table = ResultTable::with_columns(["optimizer", "lr", "time", "seed"]);
        table.push_row([
            ("optimizer", Cell::from("SGD fast")),
            ("lr", Cell::Float(0.1)),
            ("time", Cell::Float(0.25)),
            ("seed", Cell::Int(1)),
            ("val_loss", Cell::Float(1.0)),
        ]);
        table.push_row([
            ("optimizer", Cell::from("Adam")),
            ("lr", Cell::Float(0.01)),
            ("time", Cell::Float(0.5)),
            ("seed", Cell::Null),
        ]);
        table
    }

    #[test]
    fn test_csv_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("results.csv");
        save_table(&sample(), &path).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("optimizer,lr,time,seed,val_loss\n"));

        assert_eq!(load_table(&path).unwrap(), sample());
    }

    #[test]
    fn test_json_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        save_table(&sample(), &path).unwrap();
        assert_eq!(load_table(&path).unwrap(), sample());
    }

    #[test]
    fn test_diverged_values_survive_both_formats() {
        let dir = TempDir::new().unwrap();
        let mut table = ResultTable::with_columns(["lr", "time", "seed", "val_loss"]);
        table.push_row([
            ("lr", Cell::Float(1e6)),
            ("time", Cell::Float(0.1)),
            ("seed", Cell::Int(1)),
            ("val_loss", Cell::Float(f64::INFINITY)),
        ]);
        table.push_row([
            ("lr", Cell::Float(1e6)),
            ("time", Cell::Float(0.1)),
            ("seed", Cell::Int(2)),
            ("val_loss", Cell::Float(f64::NAN)),
        ]);
        for name in ["results.json", "results.csv"] {
            let path = dir.path().join(name);
            save_table(&table, &path).unwrap();
            let loaded = load_table(&path).unwrap();
            let losses = loaded.column("val_loss").unwrap();
            assert_eq!(losses[0], &Cell::Float(f64::INFINITY), "{name}");
            assert!(matches!(losses[1], Cell::Float(v) if v.is_nan()), "{name}");
        }
    }

    #[test]
    fn test_text_hyperparameters_survive_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        let mut table = ResultTable::with_columns(["tag", "time"]);
        table.push_row([("tag", Cell::from("1")), ("time", Cell::Float(0.5))]);
        table.push_row([("tag", Cell::from("true")), ("time", Cell::Float(0.5))]);
        save_table(&table, &path).unwrap();
        assert_eq!(load_table(&path).unwrap(), table);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.pkl");
        assert!(matches!(
            save_table(&sample(), &path),
            Err(SweepError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_overwrite_replaces_previous() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        save_table(&sample(), &path).unwrap();
        save_table(&ResultTable::with_columns(["a"]), &path).unwrap();
        let loaded = load_table(&path).unwrap();
        assert_eq!(loaded.columns(), &["a"]);
        assert!(loaded.is_empty());
    }
}
