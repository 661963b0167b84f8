//! Calendar bucket keys derived from `start_time` in the configured local
//! timezone.

use chrono::{DateTime, Datelike, FixedOffset};

use crate::cell::Cell;
use crate::config::LocalZone;
use crate::table::{START_TIME, WideTable};

pub const ANNUAL_PERIOD: &str = "annual_period";
pub const MONTHLY_PERIOD: &str = "monthly_period";
pub const MONTH_LABEL: &str = "month_label";
pub const UNIQUE_DAY: &str = "unique_day";
pub const YEAR: &str = "year";

const BUCKET_COLUMNS: [&str; 5] = [ANNUAL_PERIOD, MONTHLY_PERIOD, MONTH_LABEL, UNIQUE_DAY, YEAR];

/// Bucket identifiers for one instant, as seen in `tz`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketKeys {
    pub annual_period: String,
    pub monthly_period: String,
    pub month_label: String,
    pub unique_day: String,
    pub year: i32,
}

impl BucketKeys {
    pub fn for_instant(ts: &DateTime<FixedOffset>, tz: &LocalZone) -> Self {
        let local = tz.convert(ts);
        Self {
            annual_period: local.format("%Y").to_string(),
            monthly_period: local.format("%Y-%m").to_string(),
            month_label: local.format("%B %Y").to_string(),
            unique_day: local.format("%Y-%m-%d").to_string(),
            year: local.year(),
        }
    }

    fn cell(&self, column: &str) -> Cell {
        match column {
            ANNUAL_PERIOD => Cell::Text(self.annual_period.clone()),
            MONTHLY_PERIOD => Cell::Text(self.monthly_period.clone()),
            MONTH_LABEL => Cell::Text(self.month_label.clone()),
            UNIQUE_DAY => Cell::Text(self.unique_day.clone()),
            YEAR => Cell::Int(i64::from(self.year)),
            _ => Cell::Null,
        }
    }
}

/// Add `annual_period`, `monthly_period`, `month_label`, `unique_day` and
/// `year` columns. A bucket column the table already has is kept as it is;
/// rows without a timestamp get null keys.
pub fn derive_buckets(table: WideTable, tz: impl Into<LocalZone>) -> WideTable {
    let tz = tz.into();
    let start_idx = table.column_index(START_TIME);
    if start_idx.is_none() {
        tracing::debug!("no start_time column; bucket keys will be null");
    }

    let keys: Vec<Option<BucketKeys>> = table
        .rows()
        .iter()
        .map(|row| {
            start_idx
                .and_then(|idx| row[idx].as_timestamp())
                .map(|ts| BucketKeys::for_instant(ts, &tz))
        })
        .collect();

    BUCKET_COLUMNS.into_iter().fold(table, |t, name| {
        if t.has_column(name) {
            tracing::warn!(column = name, "column already present; not deriving bucket key");
            return t;
        }
        let mut row_keys = keys.iter();
        t.with_column(name, |_, _| {
            row_keys
                .next()
                .and_then(Option::as_ref)
                .map_or(Cell::Null, |k| k.cell(name))
        })
    })
}
