//! Grand totals over the year table.

use serde::Serialize;

use crate::cell::{Cell, round2};
use crate::rollup::{AVG_CALORIES, AVG_OUTPUT_PER_MIN, RIDES, TOTAL_HOURS, TOTAL_MILES};
use crate::table::{RollupTable, Table};

/// How a per-year average column is folded into the grand total.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AggregationStrategy {
    /// Unweighted mean of the per-year means.
    #[default]
    MeanOfMeans,
    /// Mean of the per-year means weighted by that year's `rides`.
    WeightedMean,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TotalsStrategy {
    pub avg_calories: AggregationStrategy,
    pub avg_output_per_min: AggregationStrategy,
}

impl TotalsStrategy {
    pub fn uniform(strategy: AggregationStrategy) -> Self {
        Self {
            avg_calories: strategy,
            avg_output_per_min: strategy,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TotalsRow {
    pub rides: i64,
    pub total_hours: f64,
    pub total_miles: f64,
    pub avg_calories: Option<f64>,
    #[serde(rename = "avg_output/min")]
    pub avg_output_per_min: Option<f64>,
}

impl TotalsRow {
    /// One-row table with the same column names as the year table, minus `year`.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(
            [RIDES, TOTAL_HOURS, TOTAL_MILES, AVG_CALORIES, AVG_OUTPUT_PER_MIN]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        );
        table.push_row(vec![
            Cell::Int(self.rides),
            Cell::Float(self.total_hours),
            Cell::Float(self.total_miles),
            self.avg_calories.into(),
            self.avg_output_per_min.into(),
        ]);
        table
    }
}

pub fn totals(year_table: &RollupTable) -> TotalsRow {
    totals_with(year_table, TotalsStrategy::default())
}

pub fn totals_with(year_table: &RollupTable, strategy: TotalsStrategy) -> TotalsRow {
    let values = |name: &str| -> Vec<Option<f64>> {
        year_table
            .column(name)
            .map(|col| col.map(Cell::as_f64).collect())
            .unwrap_or_else(|| vec![None; year_table.len()])
    };
    let rides = values(RIDES);
    let sum = |name: &str| round2(values(name).into_iter().flatten().sum());

    TotalsRow {
        rides: year_table
            .column(RIDES)
            .map(|col| col.filter_map(Cell::as_i64).sum())
            .unwrap_or(0),
        total_hours: sum(TOTAL_HOURS),
        total_miles: sum(TOTAL_MILES),
        avg_calories: average(&values(AVG_CALORIES), &rides, strategy.avg_calories),
        avg_output_per_min: average(
            &values(AVG_OUTPUT_PER_MIN),
            &rides,
            strategy.avg_output_per_min,
        ),
    }
}

fn average(
    means: &[Option<f64>],
    weights: &[Option<f64>],
    strategy: AggregationStrategy,
) -> Option<f64> {
    let (sum, denom) = means
        .iter()
        .zip(weights)
        .filter_map(|(m, w)| {
            let m = (*m)?;
            match strategy {
                AggregationStrategy::MeanOfMeans => Some((m, 1.0)),
                AggregationStrategy::WeightedMean => w.map(|w| (m * w, w)),
            }
        })
        .fold((0.0, 0.0), |(s, d), (v, w)| (s + v, d + w));
    (denom > 0.0).then(|| round2(sum / denom))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buckets::YEAR;

    fn year_table(rows: &[(i64, i64, f64, Option<f64>)]) -> Table {
        let mut t = Table::new(
            [YEAR, RIDES, TOTAL_HOURS, TOTAL_MILES, AVG_CALORIES, AVG_OUTPUT_PER_MIN]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        );
        for (year, rides, hours, calories) in rows {
            t.push_row(vec![
                Cell::Int(*year),
                Cell::Int(*rides),
                Cell::Float(*hours),
                Cell::Float(0.0),
                (*calories).into(),
                Cell::Null,
            ]);
        }
        t
    }

    #[test]
    fn mean_of_means_by_default() {
        let t = year_table(&[(2022, 1, 0.5, Some(100.0)), (2023, 3, 2.25, Some(300.0))]);
        let row = totals(&t);
        assert_eq!(row.rides, 4);
        assert_eq!(row.total_hours, 2.75);
        assert_eq!(row.avg_calories, Some(200.0));
        assert_eq!(row.avg_output_per_min, None);
    }

    #[test]
    fn weighted_mean_uses_rides() {
        let t = year_table(&[(2022, 1, 0.5, Some(100.0)), (2023, 3, 2.25, Some(300.0))]);
        let row = totals_with(&t, TotalsStrategy::uniform(AggregationStrategy::WeightedMean));
        assert_eq!(row.avg_calories, Some(250.0));
    }

    #[test]
    fn null_year_means_are_skipped() {
        let t = year_table(&[(2022, 2, 1.0, None), (2023, 1, 1.0, Some(150.0))]);
        assert_eq!(totals(&t).avg_calories, Some(150.0));
    }

    #[test]
    fn empty_year_table() {
        let row = totals(&Table::default());
        assert_eq!(row, TotalsRow::default());
        assert_eq!(row.to_table().len(), 1);
    }

    #[test]
    fn renders_one_row_table_and_json() {
        let t = year_table(&[(2023, 3, 6.0, Some(200.0))]);
        let table = totals(&t).to_table();
        assert_eq!(table.columns()[4], "avg_output/min");
        assert_eq!(table.get(0, RIDES), Some(&Cell::Int(3)));
        assert_eq!(table.get(0, AVG_CALORIES), Some(&Cell::Float(200.0)));

        let json = serde_json::to_value(totals(&t)).unwrap();
        assert_eq!(json["avg_output/min"], serde_json::Value::Null);
        assert_eq!(json["rides"], 3);
    }
}
