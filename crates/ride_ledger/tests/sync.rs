use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ride_ledger::{
    LedgerError, MemoryStore, PipelineConfig, RecordValidator, WorkoutStore, sync_new_workouts,
};
use ride_ledger_client::http_client::ReqwestWorkoutProvider;
use ride_ledger_client::retry::RetryPolicy;
use ride_ledger_client::{ProviderError, WorkoutProvider};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEP_14: i64 = 1_694_691_000;

fn id(c: char) -> String {
    c.to_string().repeat(32)
}

fn validator() -> RecordValidator {
    RecordValidator::from_config(&PipelineConfig::default())
}

/// Provider double that records which workouts were fetched.
struct MockProvider {
    total: u64,
    recent: Vec<String>,
    payloads: Vec<Value>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    fn new(total: u64, recent: &[String]) -> Self {
        Self {
            total,
            recent: recent.to_vec(),
            payloads: Vec::new(),
            fetched: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl WorkoutProvider for MockProvider {
    async fn total_workouts(&self) -> Result<u64, ProviderError> {
        Ok(self.total)
    }

    async fn recent_workout_ids(&self, limit: u32) -> Result<Vec<String>, ProviderError> {
        Ok(self.recent.iter().take(limit as usize).cloned().collect())
    }

    async fn get_workout(&self, workout_id: &str) -> Result<Value, ProviderError> {
        self.fetched.lock().await.push(workout_id.to_string());
        Ok(self
            .payloads
            .iter()
            .find(|p| p["id"] == workout_id)
            .cloned()
            .unwrap_or_else(|| json!({ "id": workout_id, "start_time": SEP_14 })))
    }
}

async fn seeded_store(ids: &[char]) -> MemoryStore {
    let v = validator();
    let store = MemoryStore::new();
    let workouts = ids
        .iter()
        .map(|c| v.validate(&json!({ "id": id(*c), "start_time": SEP_14 })).unwrap())
        .collect();
    store.append(workouts).await.unwrap();
    store
}

#[tokio::test]
async fn fetches_only_new_workouts() {
    let store = seeded_store(&['a', 'b']).await;
    let provider = MockProvider::new(4, &[id('d'), id('c'), id('b'), id('a')]);

    let report = sync_new_workouts(&provider, &store, &validator())
        .await
        .expect("sync");
    assert_eq!(report.expected, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(*provider.fetched.lock().await, vec![id('d'), id('c')]);
    assert_eq!(store.count().await.unwrap(), 4);
}

#[tokio::test]
async fn count_mismatch_fails_before_any_write() {
    let store = seeded_store(&['a']).await;
    // provider claims three new workouts but only lists one unknown id
    let provider = MockProvider::new(4, &[id('b'), id('a'), id('a')]);

    let err = sync_new_workouts(&provider, &store, &validator())
        .await
        .expect_err("mismatch");
    assert!(matches!(
        err,
        LedgerError::CountMismatch {
            expected: 3,
            found: 1
        }
    ));
    assert!(provider.fetched.lock().await.is_empty());
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn invalid_fetched_workouts_are_skipped() {
    let store = MemoryStore::new();
    let mut provider = MockProvider::new(2, &[id('b'), id('c')]);
    provider.payloads = vec![json!({ "id": id('c'), "start_time": "not a time" })];

    let report = sync_new_workouts(&provider, &store, &validator())
        .await
        .expect("sync");
    assert_eq!(report.fetched, 2);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].workout_id.as_deref(), Some(id('c').as_str()));
}

#[tokio::test]
async fn syncs_against_http_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/user/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u1",
            "total_workouts": 1
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user/u1/workouts"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": id('e') }],
            "page_count": 1
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/workout/{}", id('e'))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id('e'),
            "start_time": SEP_14,
            "ride": { "title": "30 min Ride", "duration": 1800, "length": 1860 },
            "achievement_templates": [{ "id": "1", "name": "Best Output", "slug": "best_output" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/workout/{}/performance_graph", id('e'))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metrics": [{ "slug": "output", "average_value": 150, "max_value": 300 }],
            "summaries": [{ "slug": "total_output", "value": 270 }]
        })))
        .mount(&server)
        .await;

    let provider = ReqwestWorkoutProvider::new(&server.uri(), "u1", SecretString::new("s".into()))
        .expect("client")
        .with_retry(RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
        });
    let store = MemoryStore::new();
    let report = sync_new_workouts(&provider, &store, &validator())
        .await
        .expect("sync");
    assert_eq!(report.inserted, 1);

    let stored = store.all().await.unwrap();
    assert_eq!(stored[0].ride.title.as_deref(), Some("30 min Ride"));
    assert_eq!(stored[0].summary("total_output"), Some(270.0));
    assert_eq!(stored[0].achievements.len(), 1);
}
