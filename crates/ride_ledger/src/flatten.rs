//! Projection of one [`CanonicalWorkout`] into a single flat row.
//!
//! The row is built by an ordered list of named merge stages. Stages are not
//! supposed to produce the same key; when they do, the [`ConflictPolicy`]
//! decides whether the later write wins or the row is refused.

use std::collections::BTreeMap;

use crate::cell::Cell;
use crate::error::{LedgerError, LedgerResult};
use crate::model::CanonicalWorkout;

/// One flat row: column name to cell.
pub type FlatRow = BTreeMap<String, Cell>;

pub const OUTPUT_PER_MIN: &str = "output_per_min";
pub const DURATION_HRS: &str = "duration_hrs";
pub const TOTAL_OUTPUT: &str = "total_output";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Later stages overwrite earlier ones.
    #[default]
    LastWins,
    /// Any key written twice is an error.
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStage {
    Summary,
    Ride,
    Summaries,
    Metrics,
    Zones,
    Effort,
    OutputPerMin,
    DurationHrs,
}

/// Stage order; later entries overwrite earlier ones under `LastWins`.
pub const MERGE_STAGES: [MergeStage; 8] = [
    MergeStage::Summary,
    MergeStage::Ride,
    MergeStage::Summaries,
    MergeStage::Metrics,
    MergeStage::Zones,
    MergeStage::Effort,
    MergeStage::OutputPerMin,
    MergeStage::DurationHrs,
];

impl MergeStage {
    pub fn name(self) -> &'static str {
        match self {
            MergeStage::Summary => "summary",
            MergeStage::Ride => "ride",
            MergeStage::Summaries => "summaries",
            MergeStage::Metrics => "metrics",
            MergeStage::Zones => "zones",
            MergeStage::Effort => "effort",
            MergeStage::OutputPerMin => OUTPUT_PER_MIN,
            MergeStage::DurationHrs => DURATION_HRS,
        }
    }

    fn apply(self, w: &CanonicalWorkout, row: &mut RowBuilder) {
        match self {
            MergeStage::Summary => {
                row.put("workout_id", w.workout_id.as_str());
                row.put("start_time", w.start_time);
                row.put("end_time", w.end_time);
                row.put("status", w.status.clone());
                row.put("total_work", w.total_work);
                row.put(
                    "is_total_work_personal_record",
                    w.is_total_work_personal_record,
                );
                row.put("leaderboard_rank", w.leaderboard_rank);
                row.put("total_leaderboard_users", w.total_leaderboard_users);
            }
            MergeStage::Ride => {
                let ride = &w.ride;
                row.put("ride_id", ride.ride_id.clone());
                row.put("title", ride.title.clone());
                row.put("description", ride.description.clone());
                row.put("length", ride.length);
                row.put("duration", ride.duration);
                row.put("difficulty_estimate", ride.difficulty_estimate);
                row.put("fitness_discipline", ride.fitness_discipline.clone());
                row.put("image_url", ride.image_url.clone());
                row.put("instructor_id", ride.instructor_id());
                row.put("instructor_name", ride.instructor_name());
            }
            MergeStage::Summaries => {
                for s in &w.summaries {
                    row.put(s.slug.clone(), s.value);
                }
            }
            MergeStage::Metrics => {
                for m in &w.metrics {
                    row.put(format!("avg_{}", m.slug), m.average_value);
                    row.put(format!("max_{}", m.slug), m.max_value);
                }
            }
            MergeStage::Zones => {
                for zone in w.heart_rate_zones().unwrap_or_default() {
                    row.put(format!("hr_{}", zone.slug), zone.duration);
                }
            }
            MergeStage::Effort => {
                if let Some(effort) = &w.effort_zone_summary {
                    row.put("total_effort_points", effort.total_effort_points);
                    for (zone, secs) in &effort.heart_rate_zone_durations {
                        row.put(zone.clone(), *secs);
                    }
                }
            }
            MergeStage::OutputPerMin => row.put(OUTPUT_PER_MIN, output_per_min(w)),
            MergeStage::DurationHrs => row.put(DURATION_HRS, duration_hrs(w)),
        }
    }
}

/// `total_output / minutes`, or `None` without a non-zero duration and a
/// `total_output` summary.
pub fn output_per_min(w: &CanonicalWorkout) -> Option<f64> {
    let duration = w.ride.duration.filter(|d| *d != 0)?;
    let total_output = w.summary(TOTAL_OUTPUT)?;
    Some(total_output / (duration as f64 / 60.0))
}

pub fn duration_hrs(w: &CanonicalWorkout) -> Option<f64> {
    let duration = w.ride.duration.filter(|d| *d != 0)?;
    Some(duration as f64 / 3600.0)
}

struct RowBuilder {
    stage: MergeStage,
    row: FlatRow,
    collisions: Vec<(String, &'static str)>,
}

impl RowBuilder {
    fn put(&mut self, key: impl Into<String>, cell: impl Into<Cell>) {
        let key = key.into();
        if self.row.insert(key.clone(), cell.into()).is_some() {
            tracing::debug!(key = %key, stage = self.stage.name(), "flat row key overwritten");
            self.collisions.push((key, self.stage.name()));
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RowFlattener {
    policy: ConflictPolicy,
}

impl RowFlattener {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    pub fn flatten(&self, w: &CanonicalWorkout) -> LedgerResult<FlatRow> {
        let (row, mut collisions) = build(w);
        match (self.policy, collisions.is_empty()) {
            (ConflictPolicy::Reject, false) => {
                let (key, stage) = collisions.swap_remove(0);
                Err(LedgerError::KeyCollision { key, stage })
            }
            _ => Ok(row),
        }
    }
}

/// Flatten with the legacy last-write-wins behaviour.
pub fn flatten(w: &CanonicalWorkout) -> FlatRow {
    build(w).0
}

fn build(w: &CanonicalWorkout) -> (FlatRow, Vec<(String, &'static str)>) {
    let mut builder = RowBuilder {
        stage: MergeStage::Summary,
        row: FlatRow::new(),
        collisions: Vec::new(),
    };
    for stage in MERGE_STAGES {
        builder.stage = stage;
        stage.apply(w, &mut builder);
    }
    (builder.row, builder.collisions)
}
