//! Row-oriented result table with an ordered, growing set of columns.

use crate::float_repr::{non_finite_name, parse_non_finite};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Column holding the wall-clock fit duration in seconds.
pub const TIME_COLUMN: &str = "time";
/// Column holding the seed a row was trained with.
pub const SEED_COLUMN: &str = "seed";

/// A single table value.
///
/// In JSON, non-finite floats are stored as `"NaN"`, `"inf"` and `"-inf"`,
/// so a text cell holding exactly one of those reads back as a float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "JsonCell", into = "JsonCell")]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum JsonCell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<Cell> for JsonCell {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell::Null => Self::Null,
            Cell::Bool(v) => Self::Bool(v),
            Cell::Int(v) => Self::Int(v),
            Cell::Float(v) => match non_finite_name(v) {
                Some(name) => Self::Text(name.to_string()),
                None => Self::Float(v),
            },
            Cell::Text(v) => Self::Text(v),
        }
    }
}

impl From<JsonCell> for Cell {
    fn from(cell: JsonCell) -> Self {
        match cell {
            JsonCell::Null => Self::Null,
            JsonCell::Bool(v) => Self::Bool(v),
            JsonCell::Int(v) => Self::Int(v),
            JsonCell::Float(v) => Self::Float(v),
            JsonCell::Text(v) => match parse_non_finite(&v) {
                Some(f) => Self::Float(f),
                None => Self::Text(v),
            },
        }
    }
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text form used in CSV files. Floats keep a decimal point so they
    /// read back as floats. Text that would parse as another type (`"1"`,
    /// `"true"`, an empty string) is wrapped in double quotes.
    pub fn to_field(&self) -> String {
        match self {
            Self::Float(v) => format!("{v:?}"),
            Self::Text(v) if v.starts_with('"') || !matches!(Self::parse(v), Self::Text(_)) => {
                format!("\"{v}\"")
            }
            other => other.to_string(),
        }
    }

    /// Parse a CSV field back into the narrowest matching cell. A field
    /// wrapped in double quotes is always text.
    pub fn parse(field: &str) -> Self {
        if field.is_empty() {
            return Self::Null;
        }
        if let Some(text) = field
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            return Self::Text(text.to_string());
        }
        match field {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(v) = field.parse::<i64>() {
            return Self::Int(v);
        }
        if let Ok(v) = field.parse::<f64>() {
            return Self::Float(v);
        }
        Self::Text(field.to_string())
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Tabular results: one row per trained `(combination, seed)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table whose first columns are fixed up front.
    pub fn with_columns<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        let mut table = Self::new();
        for c in columns {
            table.ensure_column(&c.into());
        }
        table
    }

    /// Build from raw parts; every row must match the column count.
    pub fn from_parts(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Option<Self> {
        rows.iter()
            .all(|r| r.len() == columns.len())
            .then_some(Self { columns, rows })
    }

    fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Cell::Null);
        }
        self.columns.len() - 1
    }

    /// Append a row given as `(column, value)` pairs. Unseen columns are added
    /// at the end and back-filled with nulls; missing ones are left null.
    pub fn push_row<S: AsRef<str>>(&mut self, values: impl IntoIterator<Item = (S, Cell)>) {
        let mut row = vec![Cell::Null; self.columns.len()];
        for (name, value) in values {
            let idx = self.ensure_column(name.as_ref());
            if idx >= row.len() {
                row.resize(idx + 1, Cell::Null);
            }
            row[idx] = value;
        }
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// The saved hyperparameter columns: everything before `time`.
    pub fn hyperparameter_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .take_while(|c| c.as_str() != TIME_COLUMN)
            .cloned()
            .collect()
    }

    /// Row `i` as a column-name lookup.
    pub fn row_map(&self, i: usize) -> Option<HashMap<&str, &Cell>> {
        let row = self.rows.get(i)?;
        Some(
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_row_grows_and_backfills() {
        let mut table = ResultTable::with_columns(["lr", "time", "seed"]);
        table.push_row([("lr", Cell::Float(0.1)), ("time", 1.5.into()), ("seed", Cell::Int(1))]);
        table.push_row([
            ("lr", Cell::Float(0.2)),
            ("mae_train", Cell::Float(0.3)),
            ("seed", Cell::Int(2)),
        ]);
        assert_eq!(table.columns(), &["lr", "time", "seed", "mae_train"]);
        assert_eq!(table.rows()[0][3], Cell::Null);
        assert_eq!(table.rows()[1][1], Cell::Null);
        assert_eq!(table.rows()[1][3], Cell::Float(0.3));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_column_lookup() {
        let mut table = ResultTable::new();
        table.push_row([("a", Cell::Int(1))]);
        table.push_row([("a", Cell::Int(2))]);
        let col = table.column("a").unwrap();
        assert_eq!(col, vec![&Cell::Int(1), &Cell::Int(2)]);
        assert!(table.column("b").is_none());
        assert_eq!(table.row_map(1).unwrap()["a"], &Cell::Int(2));
    }

    #[test]
    fn test_cell_parse() {
        assert_eq!(Cell::parse(""), Cell::Null);
        assert_eq!(Cell::parse("true"), Cell::Bool(true));
        assert_eq!(Cell::parse("42"), Cell::Int(42));
        assert_eq!(Cell::parse("0.25"), Cell::Float(0.25));
        assert_eq!(Cell::parse("Adam fast"), Cell::Text("Adam fast".into()));
    }

    #[test]
    fn test_float_field_keeps_type() {
        assert_eq!(Cell::Float(1.0).to_field(), "1.0");
        assert_eq!(Cell::parse(&Cell::Float(1.0).to_field()), Cell::Float(1.0));
        assert_eq!(Cell::Null.to_field(), "");
    }

    #[test]
    fn test_text_fields_keep_their_type() {
        for text in ["1", "true", "0.5", "", "NaN", "\"quoted\"", "\"", "plain"] {
            let cell = Cell::Text(text.to_string());
            assert_eq!(Cell::parse(&cell.to_field()), cell, "{text:?}");
        }
        assert_eq!(Cell::Text("plain".into()).to_field(), "plain");
        assert_eq!(Cell::Text("1".into()).to_field(), "\"1\"");
    }

    #[test]
    fn test_non_finite_cells_in_json() {
        let cells = vec![
            Cell::Float(f64::NAN),
            Cell::Float(f64::INFINITY),
            Cell::Float(f64::NEG_INFINITY),
        ];
        let json = serde_json::to_string(&cells).unwrap();
        assert_eq!(json, r#"["NaN","inf","-inf"]"#);
        let back: Vec<Cell> = serde_json::from_str(&json).unwrap();
        assert!(matches!(back[0], Cell::Float(v) if v.is_nan()));
        assert_eq!(back[1], Cell::Float(f64::INFINITY));
        assert_eq!(back[2], Cell::Float(f64::NEG_INFINITY));
    }

    #[test]
    fn test_hyperparameter_columns() {
        let table = ResultTable::with_columns(["lr", "hidden", "time", "seed", "val_loss"]);
        assert_eq!(table.hyperparameter_columns(), vec!["lr", "hidden"]);
    }

    #[test]
    fn test_from_parts_checks_width() {
        assert!(ResultTable::from_parts(vec!["a".into()], vec![vec![]]).is_none());
        assert!(ResultTable::from_parts(vec!["a".into()], vec![vec![Cell::Null]]).is_some());
    }

    #[test]
    fn test_json_cells_untagged() {
        let json = serde_json::to_string(&vec![
            Cell::Null,
            Cell::Int(3),
            Cell::Float(0.5),
            Cell::Text("x".into()),
        ])
        .unwrap();
        assert_eq!(json, r#"[null,3,0.5,"x"]"#);
        let back: Vec<Cell> = serde_json::from_str(&json).unwrap();
        assert_eq!(back[0], Cell::Null);
        assert_eq!(back[1], Cell::Int(3));
    }
}
