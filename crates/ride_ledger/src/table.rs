//! Column-ordered tables and the assembler that joins flat rows into one.

use std::collections::BTreeSet;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::cell::Cell;
use crate::config::LocalZone;
use crate::flatten::FlatRow;
use crate::validate::parse_timestamp;

pub const START_TIME: &str = "start_time";

/// A rectangular table: named columns, one `Vec<Cell>` per row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// The union of all flat rows.
pub type WideTable = Table;

/// A month or year rollup.
pub type RollupTable = Table;

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
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

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Append a row; short rows are padded with nulls, long rows truncated.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Null);
        self.rows.push(row);
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Cells of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Cell> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    /// Return a copy with `name` appended (or replaced) using `f` per row.
    pub fn with_column<F>(mut self, name: &str, mut f: F) -> Self
    where
        F: FnMut(&[String], &[Cell]) -> Cell,
    {
        let idx = match self.column_index(name) {
            Some(idx) => idx,
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(Cell::Null);
                }
                self.columns.len() - 1
            }
        };
        for row in &mut self.rows {
            row[idx] = f(&self.columns, row);
        }
        self
    }

    /// Stable sort on one column; rows whose value is null go last.
    pub fn sort_by_column(&mut self, name: &str, ascending: bool) {
        let Some(idx) = self.column_index(name) else {
            return;
        };
        self.rows.sort_by(|a, b| {
            let (x, y) = (&a[idx], &b[idx]);
            if ascending || x.is_null() || y.is_null() {
                x.sort_cmp(y)
            } else {
                y.sort_cmp(x)
            }
        });
    }
}

struct RecordView<'a> {
    columns: &'a [String],
    row: &'a [Cell],
}

impl Serialize for RecordView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (k, v) in self.columns.iter().zip(self.row) {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Serializes as an array of objects, keys in column order.
impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RecordView {
                columns: &self.columns,
                row,
            })?;
        }
        seq.end()
    }
}

/// Semantic type a known column is coerced to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Int,
    Float,
    Timestamp,
}

const DECLARED_TYPES: &[(&str, ColumnType)] = &[
    ("workout_id", ColumnType::Text),
    ("ride_id", ColumnType::Text),
    ("title", ColumnType::Text),
    ("description", ColumnType::Text),
    ("fitness_discipline", ColumnType::Text),
    ("instructor_id", ColumnType::Text),
    ("instructor_name", ColumnType::Text),
    ("image_url", ColumnType::Text),
    ("status", ColumnType::Text),
    ("start_time", ColumnType::Timestamp),
    ("end_time", ColumnType::Timestamp),
    ("length", ColumnType::Int),
    ("duration", ColumnType::Int),
    ("leaderboard_rank", ColumnType::Int),
    ("total_leaderboard_users", ColumnType::Int),
    ("difficulty_estimate", ColumnType::Float),
    ("total_work", ColumnType::Float),
    ("total_output", ColumnType::Float),
    ("distance", ColumnType::Float),
    ("calories", ColumnType::Float),
    ("elevation", ColumnType::Float),
    ("output_per_min", ColumnType::Float),
    ("duration_hrs", ColumnType::Float),
    ("total_effort_points", ColumnType::Float),
];

/// Declared type for a column, by exact name first and then by prefix.
pub fn declared_type(column: &str) -> Option<ColumnType> {
    if let Some((_, ty)) = DECLARED_TYPES.iter().find(|(name, _)| *name == column) {
        return Some(*ty);
    }
    if column.starts_with("avg_") || column.starts_with("max_") {
        return Some(ColumnType::Float);
    }
    if column.starts_with("hr_") || column.starts_with("heart_rate_z") {
        return Some(ColumnType::Int);
    }
    None
}

/// Coerce `cell` to `ty`, or `None` when it cannot be represented.
pub fn coerce(cell: &Cell, ty: ColumnType, tz: &LocalZone) -> Option<Cell> {
    match (ty, cell) {
        (_, Cell::Null) => Some(Cell::Null),
        (ColumnType::Text, Cell::Text(_)) => Some(cell.clone()),
        (ColumnType::Text, Cell::Int(i)) => Some(Cell::Text(i.to_string())),
        (ColumnType::Text, Cell::Float(f)) => Some(Cell::Text(f.to_string())),
        (ColumnType::Text, Cell::Bool(b)) => Some(Cell::Text(b.to_string())),
        (ColumnType::Text, Cell::Timestamp(_)) => cell.key().map(Cell::Text),
        (ColumnType::Int, Cell::Int(_)) => Some(cell.clone()),
        (ColumnType::Int, Cell::Float(f)) if f.is_finite() && f.fract() == 0.0 => {
            Some(Cell::Int(*f as i64))
        }
        (ColumnType::Int, Cell::Text(s)) => s.trim().parse::<i64>().ok().map(Cell::Int),
        (ColumnType::Float, Cell::Float(_)) => Some(cell.clone()),
        (ColumnType::Float, Cell::Int(i)) => Some(Cell::Float(*i as f64)),
        (ColumnType::Float, Cell::Text(s)) => s.trim().parse::<f64>().ok().map(Cell::Float),
        (ColumnType::Timestamp, Cell::Timestamp(ts)) => Some(Cell::Timestamp(tz.convert(ts))),
        (ColumnType::Timestamp, Cell::Int(i)) => {
            parse_timestamp(&serde_json::json!(i), tz).map(Cell::Timestamp)
        }
        (ColumnType::Timestamp, Cell::Text(s)) => {
            parse_timestamp(&serde_json::Value::String(s.clone()), tz).map(Cell::Timestamp)
        }
        _ => None,
    }
}

/// Joins flat rows into one wide table.
#[derive(Clone, Debug)]
pub struct TableAssembler {
    tz: LocalZone,
}

impl TableAssembler {
    pub fn new(tz: impl Into<LocalZone>) -> Self {
        Self { tz: tz.into() }
    }

    /// Union the keys of `rows`, pad the gaps with nulls, drop columns that are
    /// null everywhere, coerce declared columns (keeping values that do not
    /// fit), then sort by `start_time`.
    pub fn assemble(&self, rows: &[FlatRow]) -> WideTable {
        let keys: BTreeSet<&str> = rows
            .iter()
            .flat_map(|r| r.iter())
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.as_str())
            .collect();

        let mut table = Table::new(keys.iter().map(|k| k.to_string()).collect());
        for row in rows {
            table.push_row(
                keys.iter()
                    .map(|k| row.get(*k).cloned().unwrap_or(Cell::Null))
                    .collect(),
            );
        }

        self.coerce_columns(&mut table);
        table.sort_by_column(START_TIME, true);
        tracing::debug!(
            rows = table.len(),
            columns = table.columns().len(),
            "assembled wide table"
        );
        table
    }

    fn coerce_columns(&self, table: &mut Table) {
        let mut fallbacks = 0u64;
        for (idx, column) in table.columns.iter().enumerate() {
            let Some(ty) = declared_type(column) else {
                continue;
            };
            for row in &mut table.rows {
                match coerce(&row[idx], ty, &self.tz) {
                    Some(cell) => row[idx] = cell,
                    None => {
                        fallbacks += 1;
                        tracing::debug!(column = %column, ?ty, "kept value that does not fit declared type");
                    }
                }
            }
        }
        if fallbacks > 0 {
            metrics::counter!("ride_ledger_coercion_fallbacks_total").increment(fallbacks);
        }
    }
}

/// Assemble with the given local timezone.
pub fn assemble(rows: &[FlatRow], tz: impl Into<LocalZone>) -> WideTable {
    TableAssembler::new(tz).assemble(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset};

    fn tz() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    fn row(pairs: &[(&str, Cell)]) -> FlatRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn ts(s: &str) -> Cell {
        Cell::Timestamp(DateTime::parse_from_rfc3339(s).unwrap())
    }

    #[test]
    fn partial_column_is_padded_with_null() {
        let rows = vec![
            row(&[("start_time", ts("2023-01-01T10:00:00Z")), ("hr_zone5", Cell::Float(30.0))]),
            row(&[("start_time", ts("2023-01-02T10:00:00Z"))]),
        ];
        let t = assemble(&rows, tz());
        assert!(t.has_column("hr_zone5"));
        assert_eq!(t.get(0, "hr_zone5"), Some(&Cell::Int(30)));
        assert_eq!(t.get(1, "hr_zone5"), Some(&Cell::Null));
    }

    #[test]
    fn all_null_and_absent_columns_are_dropped() {
        let rows = vec![
            row(&[("start_time", ts("2023-01-01T10:00:00Z")), ("distance", Cell::Null)]),
            row(&[("start_time", ts("2023-01-02T10:00:00Z")), ("distance", Cell::Null)]),
        ];
        let t = assemble(&rows, tz());
        assert!(!t.has_column("distance"));
        assert!(!t.has_column("hr_zone5"));
        assert_eq!(t.columns(), &["start_time".to_string()]);
    }

    #[test]
    fn rows_are_sorted_by_start_time() {
        let rows = vec![
            row(&[("start_time", ts("2023-03-01T10:00:00Z")), ("title", "b".into())]),
            row(&[("title", "none".into())]),
            row(&[("start_time", ts("2023-01-01T10:00:00Z")), ("title", "a".into())]),
        ];
        let t = assemble(&rows, tz());
        let titles: Vec<_> = t.column("title").unwrap().cloned().collect();
        assert_eq!(titles, vec!["a".into(), "b".into(), Cell::from("none")]);
    }

    #[test]
    fn coercion_failures_keep_original_value() {
        let rows = vec![
            row(&[("duration", Cell::Text("n/a".into())), ("calories", Cell::Text("210.5".into()))]),
            row(&[("duration", Cell::Float(600.0)), ("calories", Cell::Int(200))]),
        ];
        let t = assemble(&rows, tz());
        assert_eq!(t.get(0, "duration"), Some(&Cell::Text("n/a".into())));
        assert_eq!(t.get(1, "duration"), Some(&Cell::Int(600)));
        assert_eq!(t.get(0, "calories"), Some(&Cell::Float(210.5)));
        assert_eq!(t.get(1, "calories"), Some(&Cell::Float(200.0)));
    }

    #[test]
    fn timestamps_are_moved_into_local_zone() {
        let rows = vec![row(&[("start_time", Cell::Text("2023-01-01T15:00:00Z".into()))])];
        let t = assemble(&rows, tz());
        let start = t.get(0, "start_time").and_then(Cell::as_timestamp).unwrap();
        assert_eq!(start.offset(), &tz());
        assert_eq!(start.to_rfc3339(), "2023-01-01T10:00:00-05:00");
    }

    #[test]
    fn empty_input_gives_empty_table() {
        let t = assemble(&[], tz());
        assert!(t.is_empty());
        assert!(t.columns().is_empty());
    }

    #[test]
    fn declared_types_by_prefix() {
        assert_eq!(declared_type("avg_cadence"), Some(ColumnType::Float));
        assert_eq!(declared_type("hr_zone2"), Some(ColumnType::Int));
        assert_eq!(declared_type("start_time"), Some(ColumnType::Timestamp));
        assert_eq!(declared_type("mystery"), None);
    }

    #[test]
    fn serializes_rows_in_column_order() {
        let mut t = Table::new(vec!["b".into(), "a".into()]);
        t.push_row(vec![Cell::Int(1), Cell::Null]);
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"[{"b":1,"a":null}]"#);
    }
}
