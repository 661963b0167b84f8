//! Canonical, validated workout records.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const WORKOUT_ID_LEN: usize = 32;

/// Provider-issued workout identifier: exactly 32 characters and not all zeros.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkoutId(String);

impl WorkoutId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let id = raw.into();
        if is_well_formed_id(&id) {
            Ok(Self(id))
        } else {
            Err(ValidationError::InvalidWorkoutId { id })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// True for a 32-character id that is not the all-zero "empty" sentinel.
pub fn is_well_formed_id(id: &str) -> bool {
    id.chars().count() == WORKOUT_ID_LEN && !id.chars().all(|c| c == '0')
}

impl TryFrom<String> for WorkoutId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<WorkoutId> for String {
    fn from(id: WorkoutId) -> Self {
        id.0
    }
}

impl fmt::Display for WorkoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who led the class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstructorRef {
    /// A human instructor known to the provider by id.
    Human { id: String, name: Option<String> },
    /// A descriptor embedded in the ride itself, e.g. "JUST RIDE" or a scenic ride.
    Embedded {
        name: String,
        image_url: Option<String>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub ride_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Nominal class length in seconds.
    pub length: Option<i64>,
    /// Nominal class duration in seconds.
    pub duration: Option<i64>,
    pub difficulty_estimate: Option<f64>,
    pub fitness_discipline: Option<String>,
    pub image_url: Option<String>,
    pub instructor: Option<InstructorRef>,
}

impl Ride {
    pub fn instructor_id(&self) -> Option<&str> {
        match &self.instructor {
            Some(InstructorRef::Human { id, .. }) => Some(id),
            _ => None,
        }
    }

    pub fn instructor_name(&self) -> Option<&str> {
        match &self.instructor {
            Some(InstructorRef::Human { name, .. }) => name.as_deref(),
            Some(InstructorRef::Embedded { name, .. }) => Some(name),
            None => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeartRateZone {
    pub slug: String,
    pub display_name: Option<String>,
    /// Seconds spent in the zone.
    pub duration: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

/// One per-unit time series (output, cadence, heart rate, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub slug: String,
    pub display_name: Option<String>,
    pub display_unit: Option<String>,
    pub average_value: Option<f64>,
    pub max_value: Option<f64>,
    pub values: Option<Vec<Option<f64>>>,
    pub zones: Option<Vec<HeartRateZone>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryTotal {
    pub slug: String,
    pub value: Option<f64>,
    pub display_name: Option<String>,
    pub display_unit: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EffortZoneSummary {
    pub total_effort_points: Option<f64>,
    /// Zone key (e.g. `heart_rate_z1_duration`) to seconds.
    pub heart_rate_zone_durations: BTreeMap<String, f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: Option<String>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub count: Option<i64>,
}

/// An image the asset fetcher may download for a workout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AssetRef {
    pub kind: AssetKind,
    pub url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Ride,
    Instructor,
    Achievement,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalWorkout {
    pub workout_id: WorkoutId,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: Option<DateTime<FixedOffset>>,
    pub status: Option<String>,
    pub total_work: Option<f64>,
    pub is_total_work_personal_record: Option<bool>,
    pub leaderboard_rank: Option<i64>,
    pub total_leaderboard_users: Option<i64>,
    pub ride: Ride,
    pub metrics: Vec<MetricSeries>,
    pub summaries: Vec<SummaryTotal>,
    pub effort_zone_summary: Option<EffortZoneSummary>,
    pub achievements: Vec<Achievement>,
}

impl CanonicalWorkout {
    /// Look a metric unit up by slug; missing units are simply absent.
    pub fn metric(&self, slug: &str) -> Option<&MetricSeries> {
        self.metrics.iter().find(|m| m.slug == slug)
    }

    pub fn summary(&self, slug: &str) -> Option<f64> {
        self.summaries
            .iter()
            .find(|s| s.slug == slug)
            .and_then(|s| s.value)
    }

    /// Zones of the first metric unit that carries any.
    pub fn heart_rate_zones(&self) -> Option<&[HeartRateZone]> {
        self.metrics.iter().find_map(|m| m.zones.as_deref())
    }

    pub fn asset_refs(&self) -> Vec<AssetRef> {
        let mut refs = Vec::new();
        if let Some(url) = &self.ride.image_url {
            refs.push(AssetRef {
                kind: AssetKind::Ride,
                url: url.clone(),
            });
        }
        if let Some(InstructorRef::Embedded {
            image_url: Some(url),
            ..
        }) = &self.ride.instructor
        {
            refs.push(AssetRef {
                kind: AssetKind::Instructor,
                url: url.clone(),
            });
        }
        refs.extend(self.achievements.iter().filter_map(|a| {
            a.image_url.as_ref().map(|url| AssetRef {
                kind: AssetKind::Achievement,
                url: url.clone(),
            })
        }));
        refs
    }
}
