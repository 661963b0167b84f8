//! Month and year rollups over the bucketed wide table.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use crate::buckets::{ANNUAL_PERIOD, MONTH_LABEL, MONTHLY_PERIOD, UNIQUE_DAY, YEAR};
use crate::cell::{Cell, round2};
use crate::flatten::{DURATION_HRS, OUTPUT_PER_MIN};
use crate::table::{RollupTable, Table, WideTable};

pub const RIDES: &str = "rides";
pub const DAYS: &str = "days";
pub const TOTAL_HOURS: &str = "total_hours";
pub const TOTAL_MILES: &str = "total_miles";
pub const AVG_CALORIES: &str = "avg_calories";
pub const AVG_OUTPUT_PER_MIN: &str = "avg_output/min";
pub const MONTH: &str = "month";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregation {
    CountNonNull,
    CountDistinct,
    Sum,
    Mean,
}

impl Aggregation {
    /// Reduce a column slice. Counts are integers; sums and means are floats
    /// rounded to two decimals. A mean over nothing is null, a sum is zero.
    pub fn apply<'a>(self, cells: impl Iterator<Item = &'a Cell>) -> Cell {
        match self {
            Aggregation::CountNonNull => Cell::Int(cells.filter(|c| !c.is_null()).count() as i64),
            Aggregation::CountDistinct => {
                Cell::Int(cells.filter_map(Cell::key).collect::<BTreeSet<_>>().len() as i64)
            }
            Aggregation::Sum => Cell::Float(round2(cells.filter_map(Cell::as_f64).sum())),
            Aggregation::Mean => {
                let (sum, n) = cells
                    .filter_map(Cell::as_f64)
                    .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                if n == 0 {
                    Cell::Null
                } else {
                    Cell::Float(round2(sum / n as f64))
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregateSpec {
    pub output: &'static str,
    pub source: &'static str,
    pub function: Aggregation,
}

/// The fixed aggregation map applied to every group.
pub const ROLLUP_AGGREGATES: [AggregateSpec; 6] = [
    AggregateSpec {
        output: RIDES,
        source: "title",
        function: Aggregation::CountNonNull,
    },
    AggregateSpec {
        output: DAYS,
        source: UNIQUE_DAY,
        function: Aggregation::CountDistinct,
    },
    AggregateSpec {
        output: TOTAL_HOURS,
        source: DURATION_HRS,
        function: Aggregation::Sum,
    },
    AggregateSpec {
        output: TOTAL_MILES,
        source: "distance",
        function: Aggregation::Sum,
    },
    AggregateSpec {
        output: AVG_CALORIES,
        source: "calories",
        function: Aggregation::Mean,
    },
    AggregateSpec {
        output: AVG_OUTPUT_PER_MIN,
        source: OUTPUT_PER_MIN,
        function: Aggregation::Mean,
    },
];

pub const MONTH_GROUP_KEYS: [&str; 3] = [ANNUAL_PERIOD, MONTHLY_PERIOD, MONTH_LABEL];
pub const YEAR_GROUP_KEYS: [&str; 2] = [ANNUAL_PERIOD, YEAR];

struct Group {
    keys: Vec<Cell>,
    rows: Vec<usize>,
}

/// Group `table` by `group_keys` and apply [`ROLLUP_AGGREGATES`].
///
/// Output columns are the group keys followed by the aggregate outputs. Rows
/// with a null in any group key are left out. Groups are sorted by the keys
/// in order, ascending or descending.
pub fn rollup(table: &WideTable, group_keys: &[&str], ascending: bool) -> RollupTable {
    let mut columns: Vec<String> = group_keys.iter().map(|k| k.to_string()).collect();
    columns.extend(ROLLUP_AGGREGATES.iter().map(|a| a.output.to_string()));
    let mut out = Table::new(columns);

    let Some(key_idx) = group_keys
        .iter()
        .map(|k| table.column_index(k))
        .collect::<Option<Vec<_>>>()
    else {
        tracing::debug!(?group_keys, "group key column missing; empty rollup");
        return out;
    };

    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<Vec<String>, usize> = HashMap::new();
    for (i, row) in table.rows().iter().enumerate() {
        let Some(id) = key_idx
            .iter()
            .map(|&k| row[k].key())
            .collect::<Option<Vec<_>>>()
        else {
            continue;
        };
        let slot = *index.entry(id).or_insert_with(|| {
            groups.push(Group {
                keys: key_idx.iter().map(|&k| row[k].clone()).collect(),
                rows: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].rows.push(i);
    }

    groups.sort_by(|a, b| {
        let ord = a
            .keys
            .iter()
            .zip(&b.keys)
            .map(|(x, y)| x.sort_cmp(y))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal);
        if ascending { ord } else { ord.reverse() }
    });

    let sources: Vec<Option<usize>> = ROLLUP_AGGREGATES
        .iter()
        .map(|a| table.column_index(a.source))
        .collect();
    for group in groups {
        let mut row = group.keys;
        for (agg, src) in ROLLUP_AGGREGATES.iter().zip(&sources) {
            let cell = match src {
                Some(col) => agg
                    .function
                    .apply(group.rows.iter().map(|&r| &table.rows()[r][*col])),
                None => agg.function.apply(std::iter::empty()),
            };
            row.push(cell);
        }
        out.push_row(row);
    }
    out
}

/// Keep and rename columns: each entry is `(output name, source column)`.
pub fn project(table: &Table, columns: &[(&str, &str)]) -> Table {
    let idx: Vec<Option<usize>> = columns
        .iter()
        .map(|(_, src)| table.column_index(src))
        .collect();
    let mut out = Table::new(columns.iter().map(|(name, _)| name.to_string()).collect());
    for row in table.rows() {
        out.push_row(
            idx.iter()
                .map(|i| i.map(|i| row[i].clone()).unwrap_or(Cell::Null))
                .collect(),
        );
    }
    out
}

fn report_columns(label: (&'static str, &'static str)) -> Vec<(&'static str, &'static str)> {
    std::iter::once(label)
        .chain(ROLLUP_AGGREGATES.iter().map(|a| (a.output, a.output)))
        .collect()
}

/// `[month, rides, days, total_hours, total_miles, avg_calories, avg_output/min]`,
/// one row per calendar month.
pub fn month_table(table: &WideTable, ascending: bool) -> RollupTable {
    let grouped = rollup(table, &MONTH_GROUP_KEYS, ascending);
    project(&grouped, &report_columns((MONTH, MONTH_LABEL)))
}

/// `[year, rides, days, total_hours, total_miles, avg_calories, avg_output/min]`,
/// one row per calendar year.
pub fn year_table(table: &WideTable, ascending: bool) -> RollupTable {
    let grouped = rollup(table, &YEAR_GROUP_KEYS, ascending);
    project(&grouped, &report_columns((YEAR, YEAR)))
}
