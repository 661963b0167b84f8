//! Normalization and aggregation of cycling-workout history.
//!
//! Raw provider payloads are validated into [`CanonicalWorkout`]s, flattened
//! into rows, assembled into one wide table, tagged with calendar buckets and
//! rolled up into month, year and grand-total reports. [`sync`] keeps a store
//! of workouts up to date from the provider.

pub mod buckets;
pub mod cell;
pub mod config;
pub mod error;
pub mod flatten;
pub mod input;
pub mod model;
pub mod pipeline;
pub mod rollup;
pub mod sync;
pub mod table;
pub mod totals;
pub mod validate;

pub use buckets::derive_buckets;
pub use cell::Cell;
pub use config::{LocalZone, PipelineConfig};
pub use error::{LedgerError, LedgerResult, ValidationError};
pub use flatten::{ConflictPolicy, FlatRow, RowFlattener, flatten};
pub use model::{CanonicalWorkout, WorkoutId};
pub use pipeline::{Pipeline, PipelineRun, Reports, build_reports};
pub use rollup::{month_table, rollup, year_table};
pub use sync::{MemoryStore, SyncReport, WorkoutStore, sync_new_workouts};
pub use table::{RollupTable, Table, TableAssembler, WideTable, assemble};
pub use totals::{AggregationStrategy, TotalsRow, totals, totals_with};
pub use validate::{BatchOutcome, RecordValidator, Rejection};
