//! HTTP client implementation for the upstream provider API.
//!
//! This module provides a reqwest-based implementation of the
//! [`WorkoutProvider`](crate::WorkoutProvider) trait. It never logs in: the
//! caller hands over an already-issued session id.

use crate::config::Config;
use crate::retry::RetryPolicy;
use crate::{ProviderError, UserOverview, WorkoutPage, WorkoutProvider};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

/// Sampling stride requested from the performance graph endpoint.
const PERFORMANCE_EVERY_N: u32 = 5;

/// Client for the provider API using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestWorkoutProvider {
    base_url: String,
    user_id: String,
    session_id: SecretString,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl ReqwestWorkoutProvider {
    /// Create a new client instance.
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the provider API
    /// * `user_id` - The user whose workouts are read
    /// * `session_id` - An existing session id sent as a cookie
    pub fn new(
        base_url: &str,
        user_id: impl Into<String>,
        session_id: SecretString,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().gzip(true).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.into(),
            session_id,
            client,
            retry: RetryPolicy::default(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        Self::new(
            &config.base_url,
            config.user_id.clone(),
            config.session_id.clone(),
        )
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build an authenticated GET request.
    fn get_request(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url).header(
            reqwest::header::COOKIE,
            format!("peloton_session_id={}", self.session_id.expose_secret()),
        )
    }

    /// GET `url` with the retry policy and decode the JSON body.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        self.retry
            .retry_transient(move || async move {
                let resp = self.get_request(url).query(query).send().await?;
                self.handle_response(resp).await
            })
            .await
    }

    /// Handle a response, converting status codes to appropriate errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(self.error_from_response(resp).await);
        }
        Ok(resp.json::<T>().await?)
    }

    /// Extract error information from a failed response.
    async fn error_from_response(&self, resp: reqwest::Response) -> ProviderError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let body_snippet: String = body.chars().take(256).collect();
        ProviderError::from_status(status, body_snippet)
    }
}

/// Fold the performance graph and achievements into the workout summary so the
/// result has the nested shape the validator expects.
pub fn merge_workout_payload(summary: Value, performance: Value) -> Result<Value, ProviderError> {
    let Value::Object(mut workout) = summary else {
        return Err(ProviderError::Decode(
            "workout summary is not an object".into(),
        ));
    };
    let Value::Object(graph) = performance else {
        return Err(ProviderError::Decode(
            "performance graph is not an object".into(),
        ));
    };

    for key in ["metrics", "summaries"] {
        if let Some(v) = graph.get(key) {
            workout.insert(key.to_string(), v.clone());
        }
    }
    if let Some(effort) = graph.get("effort_zones").filter(|v| !v.is_null()) {
        workout.insert("effort_zone_summary".to_string(), effort.clone());
    }

    let achievements = workout
        .remove("achievement_templates")
        .and_then(|v| match v {
            Value::Array(items) => Some(items),
            _ => None,
        })
        .unwrap_or_default();
    if !achievements.is_empty() {
        workout.insert("achievements".to_string(), Value::Array(achievements));
    }

    Ok(Value::Object(normalize_keys(workout)))
}

fn normalize_keys(mut workout: Map<String, Value>) -> Map<String, Value> {
    if !workout.contains_key("workout_id")
        && let Some(id) = workout.get("id").cloned()
    {
        workout.insert("workout_id".to_string(), id);
    }
    workout
}

#[async_trait]
impl WorkoutProvider for ReqwestWorkoutProvider {
    async fn total_workouts(&self) -> Result<u64, ProviderError> {
        let url = format!("{}/api/user/{}", self.base_url, self.user_id);
        let user: UserOverview = self.get_json(&url, &[]).await?;
        tracing::debug!(user = %user.id, total = user.total_workouts, "fetched workout total");
        Ok(user.total_workouts)
    }

    async fn recent_workout_ids(&self, limit: u32) -> Result<Vec<String>, ProviderError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let url = format!("{}/api/user/{}/workouts", self.base_url, self.user_id);
        let query = [
            ("limit", limit.to_string()),
            ("page", "0".to_string()),
            ("sort_by", "-created".to_string()),
        ];
        let page: WorkoutPage = self.get_json(&url, &query).await?;
        Ok(page.data.into_iter().map(|w| w.id).collect())
    }

    async fn get_workout(&self, workout_id: &str) -> Result<Value, ProviderError> {
        let summary_url = format!("{}/api/workout/{}", self.base_url, workout_id);
        let summary: Value = self
            .get_json(&summary_url, &[("joins", "ride,ride.instructor".to_string())])
            .await?;
        let graph_url = format!(
            "{}/api/workout/{}/performance_graph",
            self.base_url, workout_id
        );
        let graph: Value = self
            .get_json(&graph_url, &[("every_n", PERFORMANCE_EVERY_N.to_string())])
            .await?;
        merge_workout_payload(summary, graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_moves_graph_sections_into_workout() {
        let summary = json!({
            "id": "a".repeat(32),
            "start_time": 1_694_700_000,
            "ride": {"title": "20 min Ride"},
            "achievement_templates": [{"id": "x", "name": "Best Output"}]
        });
        let graph = json!({
            "metrics": [{"slug": "output", "average_value": 150, "max_value": 300}],
            "summaries": [{"slug": "total_output", "value": 180}],
            "effort_zones": {"total_effort_points": 12.5},
            "seconds_since_pedaling_start": [0, 5, 10]
        });
        let merged = merge_workout_payload(summary, graph).expect("merge");
        assert_eq!(merged["workout_id"], json!("a".repeat(32)));
        assert_eq!(merged["metrics"][0]["slug"], "output");
        assert_eq!(merged["summaries"][0]["value"], 180);
        assert_eq!(merged["effort_zone_summary"]["total_effort_points"], 12.5);
        assert_eq!(merged["achievements"][0]["name"], "Best Output");
        assert!(merged.get("achievement_templates").is_none());
        assert!(merged.get("seconds_since_pedaling_start").is_none());
    }

    #[test]
    fn merge_skips_null_effort_zones() {
        let merged = merge_workout_payload(
            json!({"workout_id": "w"}),
            json!({"metrics": [], "effort_zones": null}),
        )
        .expect("merge");
        assert!(merged.get("effort_zone_summary").is_none());
        assert!(merged.get("achievements").is_none());
    }

    #[test]
    fn merge_rejects_non_object() {
        let res = merge_workout_payload(json!([1, 2]), json!({}));
        assert!(matches!(res, Err(ProviderError::Decode(_))));
    }
}
