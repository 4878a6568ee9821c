//! Result tables, their on-disk formats and per-combination summaries.

pub mod store;
pub mod summary;
pub mod table;

pub use store::{TableFormat, load_table, save_table};
pub use summary::{ColumnStats, Direction, GroupSummary, best, summarize};
pub use table::{Cell, ResultTable, SEED_COLUMN, TIME_COLUMN};
