//! End-to-end batch: raw payloads in, wide table and rollups out.

use serde::Serialize;
use serde_json::Value;

use crate::buckets::derive_buckets;
use crate::config::{LocalZone, PipelineConfig};
use crate::error::LedgerResult;
use crate::flatten::{ConflictPolicy, FlatRow, RowFlattener};
use crate::model::CanonicalWorkout;
use crate::rollup::{month_table, year_table};
use crate::table::{RollupTable, TableAssembler, WideTable};
use crate::totals::{TotalsRow, TotalsStrategy, totals_with};
use crate::validate::{RecordValidator, Rejection};

/// Everything the presentation layer reads. Always rebuilt from scratch.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Reports {
    pub wide: WideTable,
    pub months: RollupTable,
    pub years: RollupTable,
    pub totals: TotalsRow,
}

#[derive(Clone, Debug, Default)]
pub struct PipelineRun {
    pub reports: Reports,
    pub rejected: Vec<Rejection>,
}

#[derive(Clone, Debug)]
pub struct Pipeline {
    validator: RecordValidator,
    flattener: RowFlattener,
    assembler: TableAssembler,
    tz: LocalZone,
    ascending: bool,
    totals: TotalsStrategy,
}

impl Pipeline {
    /// Oldest period first, last-write-wins flattening, mean-of-means totals.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            validator: RecordValidator::from_config(config),
            flattener: RowFlattener::default(),
            assembler: TableAssembler::new(config.timezone),
            tz: config.timezone,
            ascending: true,
            totals: TotalsStrategy::default(),
        }
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.flattener = RowFlattener::new(policy);
        self
    }

    /// `false` lists the latest period first.
    pub fn with_ascending(mut self, ascending: bool) -> Self {
        self.ascending = ascending;
        self
    }

    pub fn with_totals_strategy(mut self, strategy: TotalsStrategy) -> Self {
        self.totals = strategy;
        self
    }

    pub fn validator(&self) -> &RecordValidator {
        &self.validator
    }

    /// Validate `raws`, skip the invalid ones, and build reports from the rest.
    pub fn run(&self, raws: &[Value]) -> LedgerResult<PipelineRun> {
        let outcome = self.validator.validate_batch(raws);
        let reports = self.build(&outcome.accepted)?;
        Ok(PipelineRun {
            reports,
            rejected: outcome.rejected,
        })
    }

    /// Build reports from already validated workouts. Fails only when the
    /// flattener rejects a key collision.
    pub fn build(&self, workouts: &[CanonicalWorkout]) -> LedgerResult<Reports> {
        let rows = workouts
            .iter()
            .map(|w| self.flattener.flatten(w))
            .collect::<LedgerResult<Vec<FlatRow>>>()?;

        let wide = derive_buckets(self.assembler.assemble(&rows), self.tz);
        let months = month_table(&wide, self.ascending);
        let years = year_table(&wide, self.ascending);
        let totals = totals_with(&years, self.totals);

        tracing::info!(
            workouts = workouts.len(),
            columns = wide.columns().len(),
            months = months.len(),
            years = years.len(),
            "built reports"
        );
        Ok(Reports {
            wide,
            months,
            years,
            totals,
        })
    }
}

/// Build reports in `tz` with the default options.
pub fn build_reports(
    workouts: &[CanonicalWorkout],
    tz: impl Into<LocalZone>,
) -> LedgerResult<Reports> {
    Pipeline::new(&PipelineConfig::new(tz)).build(workouts)
}
