//! Incremental ingest from the provider into a [`WorkoutStore`].
//!
//! The sync is the only writer: it works out how many workouts are new,
//! checks the provider agrees, fetches and validates them, and only then
//! appends. A disagreement aborts the run before anything is written.

use std::collections::HashSet;

use async_trait::async_trait;
use ride_ledger_client::WorkoutProvider;
use tokio::sync::RwLock;

use crate::error::{LedgerError, LedgerResult};
use crate::model::CanonicalWorkout;
use crate::validate::{RecordValidator, Rejection};

#[async_trait]
pub trait WorkoutStore: Send + Sync {
    async fn workout_ids(&self) -> LedgerResult<HashSet<String>>;

    async fn count(&self) -> LedgerResult<usize>;

    /// Append workouts whose id is not stored yet; returns how many were added.
    async fn append(&self, workouts: Vec<CanonicalWorkout>) -> LedgerResult<usize>;

    /// Every stored workout in insertion order.
    async fn all(&self) -> LedgerResult<Vec<CanonicalWorkout>>;
}

/// In-process store backed by a `Vec`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    workouts: RwLock<Vec<CanonicalWorkout>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workouts(workouts: Vec<CanonicalWorkout>) -> Self {
        Self {
            workouts: RwLock::new(workouts),
        }
    }
}

#[async_trait]
impl WorkoutStore for MemoryStore {
    async fn workout_ids(&self) -> LedgerResult<HashSet<String>> {
        Ok(self
            .workouts
            .read()
            .await
            .iter()
            .map(|w| w.workout_id.to_string())
            .collect())
    }

    async fn count(&self) -> LedgerResult<usize> {
        Ok(self.workouts.read().await.len())
    }

    async fn append(&self, workouts: Vec<CanonicalWorkout>) -> LedgerResult<usize> {
        let mut stored = self.workouts.write().await;
        let mut known: HashSet<String> = stored.iter().map(|w| w.workout_id.to_string()).collect();
        let before = stored.len();
        for w in workouts {
            if known.insert(w.workout_id.to_string()) {
                stored.push(w);
            }
        }
        Ok(stored.len() - before)
    }

    async fn all(&self) -> LedgerResult<Vec<CanonicalWorkout>> {
        Ok(self.workouts.read().await.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// `provider total - local count` at the start of the run.
    pub expected: i64,
    pub fetched: usize,
    pub inserted: usize,
    pub rejected: Vec<Rejection>,
}

pub struct SyncJob<'a, P: ?Sized, S: ?Sized> {
    provider: &'a P,
    store: &'a S,
    validator: &'a RecordValidator,
}

impl<'a, P, S> SyncJob<'a, P, S>
where
    P: WorkoutProvider + ?Sized,
    S: WorkoutStore + ?Sized,
{
    pub fn new(provider: &'a P, store: &'a S, validator: &'a RecordValidator) -> Self {
        Self {
            provider,
            store,
            validator,
        }
    }

    pub async fn run(&self) -> LedgerResult<SyncReport> {
        let total = i64::try_from(self.provider.total_workouts().await?).unwrap_or(i64::MAX);
        let local = i64::try_from(self.store.count().await?).unwrap_or(i64::MAX);
        let expected = total - local;
        tracing::info!(total, local, expected, "starting workout sync");

        if expected == 0 {
            return Ok(SyncReport::default());
        }
        if expected < 0 {
            return Err(LedgerError::CountMismatch { expected, found: 0 });
        }

        let limit = u32::try_from(expected).unwrap_or(u32::MAX);
        let recent = self.provider.recent_workout_ids(limit).await?;
        let known = self.store.workout_ids().await?;
        let mut seen = HashSet::new();
        let new_ids: Vec<String> = recent
            .into_iter()
            .filter(|id| !known.contains(id) && seen.insert(id.clone()))
            .collect();

        if new_ids.len() as i64 != expected {
            tracing::warn!(
                expected,
                found = new_ids.len(),
                "provider and store disagree on new workouts"
            );
            return Err(LedgerError::CountMismatch {
                expected,
                found: new_ids.len(),
            });
        }

        let mut raws = Vec::with_capacity(new_ids.len());
        for id in &new_ids {
            tracing::debug!(workout_id = %id, "fetching workout");
            raws.push(self.provider.get_workout(id).await?);
        }

        let outcome = self.validator.validate_batch(&raws);
        let inserted = self.store.append(outcome.accepted).await?;
        metrics::counter!("ride_ledger_sync_inserted_total").increment(inserted as u64);
        tracing::info!(
            fetched = raws.len(),
            inserted,
            rejected = outcome.rejected.len(),
            "workout sync finished"
        );

        Ok(SyncReport {
            expected,
            fetched: raws.len(),
            inserted,
            rejected: outcome.rejected,
        })
    }
}

/// Fetch every workout the store is missing and append the valid ones.
pub async fn sync_new_workouts<P, S>(
    provider: &P,
    store: &S,
    validator: &RecordValidator,
) -> LedgerResult<SyncReport>
where
    P: WorkoutProvider + ?Sized,
    S: WorkoutStore + ?Sized,
{
    SyncJob::new(provider, store, validator).run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use ride_ledger_client::ProviderError;
    use serde_json::{Value, json};

    struct FixedProvider {
        total: u64,
        ids: Vec<String>,
    }

    #[async_trait]
    impl WorkoutProvider for FixedProvider {
        async fn total_workouts(&self) -> Result<u64, ProviderError> {
            Ok(self.total)
        }

        async fn recent_workout_ids(&self, limit: u32) -> Result<Vec<String>, ProviderError> {
            Ok(self.ids.iter().take(limit as usize).cloned().collect())
        }

        async fn get_workout(&self, workout_id: &str) -> Result<Value, ProviderError> {
            Ok(json!({ "id": workout_id, "start_time": 1_694_691_000 }))
        }
    }

    fn id(c: char) -> String {
        c.to_string().repeat(32)
    }

    fn validator() -> RecordValidator {
        RecordValidator::from_config(&PipelineConfig::default())
    }

    #[tokio::test]
    async fn memory_store_append_skips_known_ids() {
        let v = validator();
        let w = v
            .validate(&json!({ "id": id('a'), "start_time": 1_694_691_000 }))
            .unwrap();
        let store = MemoryStore::new();
        assert_eq!(store.append(vec![w.clone(), w.clone()]).await.unwrap(), 1);
        assert_eq!(store.append(vec![w]).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.workout_ids().await.unwrap().contains(&id('a')));
    }

    #[tokio::test]
    async fn nothing_new_makes_no_listing_call() {
        let provider = FixedProvider {
            total: 0,
            ids: vec![],
        };
        let store = MemoryStore::new();
        let report = sync_new_workouts(&provider, &store, &validator()).await.unwrap();
        assert_eq!(report, SyncReport::default());
    }

    #[tokio::test]
    async fn fewer_local_than_remote_is_fetched() {
        let provider = FixedProvider {
            total: 2,
            ids: vec![id('b'), id('c')],
        };
        let store = MemoryStore::new();
        let report = sync_new_workouts(&provider, &store, &validator()).await.unwrap();
        assert_eq!(report.expected, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn more_local_than_remote_is_a_mismatch() {
        let v = validator();
        let store = MemoryStore::with_workouts(vec![
            v.validate(&json!({ "id": id('a'), "start_time": 1_694_691_000 }))
                .unwrap(),
        ]);
        let provider = FixedProvider {
            total: 0,
            ids: vec![],
        };
        let err = sync_new_workouts(&provider, &store, &v).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::CountMismatch {
                expected: -1,
                found: 0
            }
        ));
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
