//! Minimal `WorkoutProvider` trait and a reqwest-based implementation for the
//! upstream fitness provider.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub mod config;
pub mod http_client;
pub mod retry;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            404 => ProviderError::NotFound(body),
            401 | 403 => ProviderError::Auth(body),
            429 => ProviderError::RateLimited(body),
            500..=599 => ProviderError::Server { status, body },
            _ => ProviderError::UnexpectedStatus { status, body },
        }
    }

    /// Transient failures are worth another attempt; everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited(_) | ProviderError::Server { .. } => true,
            ProviderError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// User-level counters reported by the provider.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct UserOverview {
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub id: String,
    #[serde(default)]
    pub total_workouts: u64,
}

/// One entry of the provider's workout listing.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct WorkoutListing {
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct WorkoutPage {
    #[serde(default)]
    pub data: Vec<WorkoutListing>,
    #[serde(default)]
    pub page_count: Option<u32>,
}

fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[async_trait]
pub trait WorkoutProvider: Send + Sync + 'static {
    /// Total number of workouts the provider holds for the configured user.
    async fn total_workouts(&self) -> Result<u64, ProviderError>;

    /// Ids of the most recent `limit` workouts, newest first.
    async fn recent_workout_ids(&self, limit: u32) -> Result<Vec<String>, ProviderError>;

    /// Raw nested payload for one workout: the workout summary with its `ride`,
    /// merged with the performance graph (`metrics`, `summaries`,
    /// `effort_zones`) and the achievements earned during it.
    async fn get_workout(&self, workout_id: &str) -> Result<serde_json::Value, ProviderError>;
}
