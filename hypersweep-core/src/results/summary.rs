//! Aggregating per-seed rows into per-combination statistics.

use super::table::{Cell, ResultTable, SEED_COLUMN};
use serde::Serialize;
use std::collections::BTreeMap;

/// Whether larger or smaller values of a column are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Minimize,
    Maximize,
}

/// Mean and sample standard deviation of one numeric column within a group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub count: usize,
    pub mean: f64,
    /// `None` with fewer than two values.
    pub std: Option<f64>,
}

impl ColumnStats {
    fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (values.len() > 1).then(|| {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        });
        Some(Self {
            count: values.len(),
            mean,
            std,
        })
    }
}

/// One group of rows sharing the same key-column values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: Vec<(String, Cell)>,
    pub rows: usize,
    pub stats: BTreeMap<String, ColumnStats>,
}

impl GroupSummary {
    pub fn mean(&self, column: &str) -> Option<f64> {
        self.stats.get(column).map(|s| s.mean)
    }

    /// `lr=0.1, hidden=8` style label.
    pub fn label(&self) -> String {
        self.key
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Group `table` by `by` (the saved hyperparameter columns when empty) and
/// aggregate every other numeric column except `seed`. Groups keep the order
/// in which they first appear.
pub fn summarize(table: &ResultTable, by: &[String]) -> Vec<GroupSummary> {
    let by: Vec<String> = if by.is_empty() {
        table.hyperparameter_columns()
    } else {
        by.to_vec()
    };
    let key_idx: Vec<(String, Option<usize>)> = by
        .iter()
        .map(|k| (k.clone(), table.column_index(k)))
        .collect();
    let value_cols: Vec<(usize, &String)> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.as_str() != SEED_COLUMN && !by.contains(*c))
        .filter(|(i, _)| table.rows().iter().any(|r| r[*i].as_f64().is_some()))
        .collect();

    let mut groups: Vec<(Vec<Cell>, Vec<&Vec<Cell>>)> = Vec::new();
    for row in table.rows() {
        let key: Vec<Cell> = key_idx
            .iter()
            .map(|(_, idx)| idx.map(|i| row[i].clone()).unwrap_or(Cell::Null))
            .collect();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(row),
            None => groups.push((key, vec![row])),
        }
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let stats = value_cols
                .iter()
                .filter_map(|(i, name)| {
                    let values: Vec<f64> = members.iter().filter_map(|r| r[*i].as_f64()).collect();
                    ColumnStats::from_values(&values).map(|s| ((*name).clone(), s))
                })
                .collect();
            GroupSummary {
                key: by.iter().cloned().zip(key).collect(),
                rows: members.len(),
                stats,
            }
        })
        .collect()
}

/// The group with the best mean `column`. Groups without that column and
/// NaN means are skipped.
pub fn best<'a>(
    groups: &'a [GroupSummary],
    column: &str,
    direction: Direction,
) -> Option<&'a GroupSummary> {
    groups
        .iter()
        .filter_map(|g| g.mean(column).filter(|m| !m.is_nan()).map(|m| (g, m)))
        .min_by(|(_, a), (_, b)| {
            let ord = a.total_cmp(b);
            match direction {
                Direction::Minimize => ord,
                Direction::Maximize => ord.reverse(),
            }
        })
        .map(|(g, _)| g)
}
