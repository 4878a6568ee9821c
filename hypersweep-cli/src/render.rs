//! Plain-text rendering for terminal output.

use hypersweep_core::Combination;
use hypersweep_core::results::{Cell, GroupSummary, ResultTable};
use std::collections::BTreeSet;

fn cell_text(cell: &Cell) -> String {
    match cell {
        Cell::Null => "-".to_string(),
        Cell::Float(v) => format!("{v:.6}"),
        other => other.to_string(),
    }
}

/// Left-aligned columns separated by two spaces.
fn aligned(header: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, value) in widths.iter_mut().zip(row) {
            *w = (*w).max(value.chars().count());
        }
    }
    let line = |values: &[String]| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, &w)| format!("{v:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let mut out = vec![line(header)];
    out.extend(rows.iter().map(|r| line(r)));
    out.join("\n")
}

pub fn table(table: &ResultTable) -> String {
    let rows: Vec<Vec<String>> = table
        .rows()
        .iter()
        .map(|r| r.iter().map(cell_text).collect())
        .collect();
    aligned(table.columns(), &rows)
}

pub fn summary(groups: &[GroupSummary]) -> String {
    let Some(first) = groups.first() else {
        return "(no results)".to_string();
    };
    let mut header: Vec<String> = first.key.iter().map(|(k, _)| k.clone()).collect();
    header.push("runs".to_string());
    let stat_columns: Vec<String> = groups
        .iter()
        .flat_map(|g| g.stats.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .cloned()
        .collect();
    header.extend(stat_columns.iter().cloned());

    let rows: Vec<Vec<String>> = groups
        .iter()
        .map(|g| {
            let mut row: Vec<String> = g.key.iter().map(|(_, v)| cell_text(v)).collect();
            row.push(g.rows.to_string());
            for column in &stat_columns {
                row.push(match g.stats.get(column) {
                    Some(s) => match s.std {
                        Some(std) => format!("{:.4} ± {:.4}", s.mean, std),
                        None => format!("{:.4}", s.mean),
                    },
                    None => "-".to_string(),
                });
            }
            row
        })
        .collect();
    aligned(&header, &rows)
}

pub fn combinations(combinations: &[Combination]) -> String {
    let mut out: Vec<String> = combinations.iter().map(|c| c.to_string()).collect();
    out.push(format!("{} combination(s)", combinations.len()));
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hypersweep_core::results::summarize;
    use pretty_assertions::assert_eq;

    fn sample() -> ResultTable {
        let mut t = ResultTable::with_columns(["lr", "time", "seed"]);
        t.push_row([
            ("lr", Cell::Float(0.1)),
            ("time", Cell::Float(1.0)),
            ("seed", Cell::Int(1)),
        ]);
        t.push_row([
            ("lr", Cell::Float(0.1)),
            ("time", Cell::Float(3.0)),
            ("seed", Cell::Null),
        ]);
        t
    }

    #[test]
    fn test_table_alignment() {
        let text = table(&sample());
        assert_eq!(
            text,
            "lr        time      seed\n\
             0.100000  1.000000  1\n\
             0.100000  3.000000  -"
        );
    }

    #[test]
    fn test_summary_shows_mean_and_std() {
        let groups = summarize(&sample(), &[]);
        let text = summary(&groups);
        assert!(text.starts_with("lr"));
        assert!(text.contains("2.0000 ± 1.4142"));
        assert_eq!(summary(&[]), "(no results)");
    }

    #[test]
    fn test_summary_columns_cover_every_group() {
        let mut t = ResultTable::with_columns(["lr", "time"]);
        t.push_row([("lr", Cell::Float(0.1)), ("time", Cell::Float(1.0))]);
        t.push_row([
            ("lr", Cell::Float(0.2)),
            ("time", Cell::Float(2.0)),
            ("rmse_val", Cell::Float(0.5)),
        ]);
        let text = summary(&summarize(&t, &[]));
        let header = text.lines().next().unwrap();
        assert!(header.contains("rmse_val"), "{header}");
        assert!(header.starts_with("lr"));
        let first_row: Vec<&str> = text.lines().nth(1).unwrap().split_whitespace().collect();
        assert_eq!(first_row, vec!["0.100000", "1", "-", "1.0000"]);
    }
}
