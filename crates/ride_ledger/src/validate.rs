//! Validation and coercion of raw provider payloads into [`CanonicalWorkout`]s.
//!
//! The provider is loose about types: numbers arrive as strings, timestamps as
//! epoch seconds or ISO-8601 text, and whole sections may be `null`. Everything
//! is normalized here so later stages only see the canonical shape.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::config::{LocalZone, PipelineConfig};
use crate::error::ValidationError;
use crate::model::{
    Achievement, CanonicalWorkout, EffortZoneSummary, HeartRateZone, InstructorRef, MetricSeries,
    Ride, SummaryTotal, WorkoutId, is_well_formed_id,
};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const AWARE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Substitute `fallback` when `primary` is absent or zero; `None` when both are.
pub fn resolve_duration(duration: Option<i64>, length: Option<i64>) -> Option<i64> {
    nonzero(duration).or_else(|| nonzero(length))
}

/// Mirror of [`resolve_duration`] for the nominal length.
pub fn resolve_length(length: Option<i64>, duration: Option<i64>) -> Option<i64> {
    nonzero(length).or_else(|| nonzero(duration))
}

fn nonzero(v: Option<i64>) -> Option<i64> {
    v.filter(|v| *v != 0)
}

/// Instructor ids that are all zeros or not 32 characters mean "no instructor".
pub fn normalize_instructor_id(id: Option<&str>) -> Option<String> {
    id.map(str::trim)
        .filter(|id| is_well_formed_id(id))
        .map(str::to_string)
}

/// Parse epoch seconds, an ISO-8601 string or an offset-carrying timestamp and
/// express it in `tz`. Naive strings are read as wall-clock time in `tz`.
pub fn parse_timestamp(value: &Value, tz: &LocalZone) -> Option<DateTime<FixedOffset>> {
    match value {
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                from_epoch(secs, 0, tz)
            } else {
                let f = n.as_f64()?;
                if !f.is_finite() {
                    return None;
                }
                let secs = f.floor();
                let nanos = ((f - secs) * 1e9).round() as u32;
                from_epoch(secs as i64, nanos.min(999_999_999), tz)
            }
        }
        Value::String(s) => parse_timestamp_str(s.trim(), tz),
        _ => None,
    }
}

fn from_epoch(secs: i64, nanos: u32, tz: &LocalZone) -> Option<DateTime<FixedOffset>> {
    DateTime::<Utc>::from_timestamp(secs, nanos).map(|dt| tz.convert(&dt))
}

fn parse_timestamp_str(s: &str, tz: &LocalZone) -> Option<DateTime<FixedOffset>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<i64>() {
        return from_epoch(secs, 0, tz);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(tz.convert(&dt));
    }
    for fmt in AWARE_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(tz.convert(&dt));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return tz.from_local(&ndt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return tz.from_local(&date.and_hms_opt(0, 0, 0)?);
    }
    None
}

/// A payload that failed validation, kept so the caller can report it.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub workout_id: Option<String>,
    pub error: ValidationError,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub accepted: Vec<CanonicalWorkout>,
    pub rejected: Vec<Rejection>,
}

/// Validates raw payloads against the configured local timezone.
#[derive(Clone, Debug)]
pub struct RecordValidator {
    tz: LocalZone,
}

impl RecordValidator {
    pub fn new(tz: impl Into<LocalZone>) -> Self {
        Self { tz: tz.into() }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.timezone)
    }

    pub fn validate(&self, raw: &Value) -> Result<CanonicalWorkout, ValidationError> {
        let Some(obj) = raw.as_object() else {
            return Err(ValidationError::MalformedPayload {
                workout_id: String::new(),
                reason: "payload is not a JSON object".into(),
            });
        };

        let raw_id = obj
            .get("workout_id")
            .filter(|v| !v.is_null())
            .or_else(|| obj.get("id"))
            .and_then(value_as_string)
            .unwrap_or_default();
        let workout_id = WorkoutId::parse(raw_id)?;

        let parsed: RawWorkout =
            serde_json::from_value(raw.clone()).map_err(|e| ValidationError::MalformedPayload {
                workout_id: workout_id.to_string(),
                reason: e.to_string(),
            })?;

        let start_time = self.required_timestamp(&workout_id, "start_time", &parsed.start_time)?;
        let end_time = self.optional_timestamp(&workout_id, "end_time", &parsed.end_time)?;

        Ok(CanonicalWorkout {
            workout_id,
            start_time,
            end_time,
            status: parsed.status,
            total_work: parsed.total_work,
            is_total_work_personal_record: parsed.is_total_work_personal_record,
            leaderboard_rank: parsed.leaderboard_rank,
            total_leaderboard_users: parsed.total_leaderboard_users,
            ride: parsed.ride.map(RawRide::into_ride).unwrap_or_default(),
            metrics: parsed
                .metrics
                .unwrap_or_default()
                .into_iter()
                .filter_map(RawMetric::into_metric)
                .collect(),
            summaries: parsed
                .summaries
                .unwrap_or_default()
                .into_iter()
                .filter_map(RawSummary::into_summary)
                .collect(),
            effort_zone_summary: parsed.effort_zone_summary.map(RawEffort::into_effort),
            achievements: parsed
                .achievements
                .unwrap_or_default()
                .into_iter()
                .map(RawAchievement::into_achievement)
                .collect(),
        })
    }

    /// Validate every payload, skipping (and logging) the ones that fail.
    pub fn validate_batch(&self, raws: &[Value]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for raw in raws {
            match self.validate(raw) {
                Ok(workout) => outcome.accepted.push(workout),
                Err(error) => {
                    let workout_id = error.workout_id().map(str::to_string);
                    tracing::warn!(
                        workout_id = workout_id.as_deref().unwrap_or("<unknown>"),
                        %error,
                        "skipping invalid workout"
                    );
                    metrics::counter!("ride_ledger_records_rejected_total").increment(1);
                    outcome.rejected.push(Rejection { workout_id, error });
                }
            }
        }
        tracing::info!(
            accepted = outcome.accepted.len(),
            rejected = outcome.rejected.len(),
            "validated workout batch"
        );
        outcome
    }

    fn required_timestamp(
        &self,
        workout_id: &WorkoutId,
        field: &'static str,
        value: &Value,
    ) -> Result<DateTime<FixedOffset>, ValidationError> {
        parse_timestamp(value, &self.tz).ok_or_else(|| ValidationError::InvalidTimestamp {
            workout_id: workout_id.to_string(),
            field,
            value: value.to_string(),
        })
    }

    fn optional_timestamp(
        &self,
        workout_id: &WorkoutId,
        field: &'static str,
        value: &Value,
    ) -> Result<Option<DateTime<FixedOffset>>, ValidationError> {
        if value.is_null() {
            return Ok(None);
        }
        self.required_timestamp(workout_id, field, value).map(Some)
    }
}

fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn deserialize_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn deserialize_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => value_as_f64(&v)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected a number, got {v}"))),
    }
}

fn deserialize_opt_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f == 0.0 => Ok(Some(false)),
            Some(f) if f == 1.0 => Ok(Some(true)),
            _ => Err(D::Error::custom(format!("expected 0 or 1, got {n}"))),
        },
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(D::Error::custom(format!("expected a boolean, got {s:?}"))),
        },
        Some(other) => Err(D::Error::custom(format!(
            "expected a boolean, got {other}"
        ))),
    }
}

fn deserialize_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = deserialize_opt_f64(deserializer)?;
    Ok(value.filter(|f| f.is_finite()).map(|f| f.round() as i64))
}

#[derive(Debug, Deserialize)]
struct RawWorkout {
    #[serde(default)]
    start_time: Value,
    #[serde(default)]
    end_time: Value,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_f64")]
    total_work: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_opt_bool")]
    is_total_work_personal_record: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_opt_i64")]
    leaderboard_rank: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_opt_i64")]
    total_leaderboard_users: Option<i64>,
    #[serde(default)]
    ride: Option<RawRide>,
    #[serde(default)]
    metrics: Option<Vec<RawMetric>>,
    #[serde(default)]
    summaries: Option<Vec<RawSummary>>,
    #[serde(default, alias = "effort_zones")]
    effort_zone_summary: Option<RawEffort>,
    #[serde(default, alias = "achievement_templates")]
    achievements: Option<Vec<RawAchievement>>,
}

#[derive(Debug, Deserialize)]
struct RawRide {
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_i64")]
    length: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_opt_i64")]
    duration: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_opt_f64")]
    difficulty_estimate: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    fitness_discipline: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    image_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    instructor_id: Option<String>,
    #[serde(default)]
    instructor: Option<RawInstructor>,
}

#[derive(Debug, Deserialize)]
struct RawInstructor {
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    image_url: Option<String>,
}

impl RawRide {
    fn into_ride(self) -> Ride {
        let embedded_name = self
            .instructor
            .as_ref()
            .and_then(|i| i.name.clone())
            .filter(|n| !n.trim().is_empty());
        let instructor = match normalize_instructor_id(self.instructor_id.as_deref()) {
            Some(id) => Some(InstructorRef::Human {
                id,
                name: embedded_name,
            }),
            None => embedded_name.map(|name| InstructorRef::Embedded {
                name,
                image_url: self.instructor.and_then(|i| i.image_url),
            }),
        };
        Ride {
            ride_id: self.id,
            title: self.title,
            description: self.description,
            length: resolve_length(self.length, self.duration),
            duration: resolve_duration(self.duration, self.length),
            difficulty_estimate: self.difficulty_estimate,
            fitness_discipline: self.fitness_discipline,
            image_url: self.image_url,
            instructor,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawZone {
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    slug: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    display_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_f64")]
    duration: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_opt_f64")]
    min_value: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_opt_f64")]
    max_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawMetric {
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    slug: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    display_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    display_unit: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_f64")]
    average_value: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_opt_f64")]
    max_value: Option<f64>,
    #[serde(default)]
    values: Option<Vec<Value>>,
    #[serde(default)]
    zones: Option<Vec<RawZone>>,
}

impl RawMetric {
    fn into_metric(self) -> Option<MetricSeries> {
        let Some(slug) = self.slug.filter(|s| !s.is_empty()) else {
            tracing::debug!("dropping metric without slug");
            return None;
        };
        Some(MetricSeries {
            slug,
            display_name: self.display_name,
            display_unit: self.display_unit,
            average_value: self.average_value,
            max_value: self.max_value,
            values: self
                .values
                .map(|vals| vals.iter().map(value_as_f64).collect()),
            zones: self.zones.map(|zones| {
                zones
                    .into_iter()
                    .filter_map(|z| {
                        Some(HeartRateZone {
                            slug: z.slug.filter(|s| !s.is_empty())?,
                            display_name: z.display_name,
                            duration: z.duration,
                            min_value: z.min_value,
                            max_value: z.max_value,
                        })
                    })
                    .collect()
            }),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawSummary {
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    slug: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_f64")]
    value: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    display_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    display_unit: Option<String>,
}

impl RawSummary {
    fn into_summary(self) -> Option<SummaryTotal> {
        Some(SummaryTotal {
            slug: self.slug.filter(|s| !s.is_empty())?,
            value: self.value,
            display_name: self.display_name,
            display_unit: self.display_unit,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawEffort {
    #[serde(default, deserialize_with = "deserialize_opt_f64")]
    total_effort_points: Option<f64>,
    #[serde(default)]
    heart_rate_zone_durations: Option<BTreeMap<String, Value>>,
}

impl RawEffort {
    fn into_effort(self) -> EffortZoneSummary {
        EffortZoneSummary {
            total_effort_points: self.total_effort_points,
            heart_rate_zone_durations: self
                .heart_rate_zone_durations
                .unwrap_or_default()
                .into_iter()
                .filter_map(|(k, v)| value_as_f64(&v).map(|secs| (k, secs)))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAchievement {
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    slug: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    image_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_i64")]
    count: Option<i64>,
}

impl RawAchievement {
    fn into_achievement(self) -> Achievement {
        Achievement {
            id: self.id,
            name: self.name,
            slug: self.slug,
            image_url: self.image_url,
            description: self.description,
            count: self.count,
        }
    }
}
