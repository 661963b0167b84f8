use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::LedgerError;

/// Zone used when nothing is configured.
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// The single local timezone every timestamp and calendar bucket is expressed
/// in: either an IANA zone (daylight saving applies) or a fixed UTC offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalZone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl LocalZone {
    /// `America/New_York`, `Europe/London`, `+05:30`, `-0500`, `Z` or `UTC`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        parse_utc_offset(s)
            .map(LocalZone::Fixed)
            .or_else(|| s.parse::<Tz>().ok().map(LocalZone::Named))
    }

    /// Express an instant in this zone, keeping the offset in effect at that
    /// instant.
    pub fn convert<Z: TimeZone>(&self, dt: &DateTime<Z>) -> DateTime<FixedOffset> {
        let utc = dt.with_timezone(&Utc);
        match self {
            LocalZone::Named(tz) => utc.with_timezone(tz).fixed_offset(),
            LocalZone::Fixed(offset) => utc.with_timezone(offset),
        }
    }

    /// Read a wall-clock time in this zone. An ambiguous time (clocks going
    /// back) resolves to the earlier instant; a skipped time is `None`.
    pub fn from_local(&self, naive: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            LocalZone::Named(tz) => tz
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.fixed_offset()),
            LocalZone::Fixed(offset) => offset.from_local_datetime(naive).single(),
        }
    }
}

impl Default for LocalZone {
    fn default() -> Self {
        LocalZone::Named(chrono_tz::America::New_York)
    }
}

impl From<Tz> for LocalZone {
    fn from(tz: Tz) -> Self {
        LocalZone::Named(tz)
    }
}

impl From<FixedOffset> for LocalZone {
    fn from(offset: FixedOffset) -> Self {
        LocalZone::Fixed(offset)
    }
}

impl fmt::Display for LocalZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalZone::Named(tz) => f.write_str(tz.name()),
            LocalZone::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Local timezone every timestamp and calendar bucket is expressed in.
    pub timezone: LocalZone,
}

impl PipelineConfig {
    pub fn new(timezone: impl Into<LocalZone>) -> Self {
        Self {
            timezone: timezone.into(),
        }
    }

    pub fn from_env() -> Result<Self, LedgerError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, LedgerError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let raw = get("RIDE_LEDGER_TZ")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TIMEZONE.into());
        let timezone = LocalZone::parse(&raw).ok_or_else(|| {
            LedgerError::Config(format!(
                "RIDE_LEDGER_TZ must be an IANA zone name or a +HH:MM/-HH:MM offset, got {raw:?}"
            ))
        })?;
        Ok(Self { timezone })
    }
}

/// Parse `+HH:MM`, `-HH:MM`, `+HHMM` or `Z`.
pub fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Some(Utc.fix());
    }
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn default_zone_is_new_york() {
        let cfg = PipelineConfig::from_env_with(|_| None).expect("cfg");
        assert_eq!(cfg.timezone, LocalZone::Named(chrono_tz::America::New_York));
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.timezone.to_string(), DEFAULT_TIMEZONE);
    }

    #[test]
    fn named_zone_follows_daylight_saving() {
        let zone = LocalZone::default();
        let winter = DateTime::parse_from_rfc3339("2023-01-15T12:00:00Z").unwrap();
        let summer = DateTime::parse_from_rfc3339("2023-07-15T12:00:00Z").unwrap();
        assert_eq!(zone.convert(&winter).offset().local_minus_utc(), -5 * 3600);
        assert_eq!(zone.convert(&summer).offset().local_minus_utc(), -4 * 3600);
    }

    #[test]
    fn local_wall_clock_in_named_zone() {
        let zone = LocalZone::default();
        let naive = NaiveDate::from_ymd_opt(2023, 7, 1)
            .unwrap()
            .and_hms_opt(0, 30, 0)
            .unwrap();
        let dt = zone.from_local(&naive).unwrap();
        assert_eq!(dt.to_rfc3339(), "2023-07-01T00:30:00-04:00");

        // 02:30 does not exist on the spring-forward day
        let skipped = NaiveDate::from_ymd_opt(2023, 3, 12)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        assert!(zone.from_local(&skipped).is_none());
    }

    #[test]
    fn reads_zone_or_offset_from_env() {
        let get = |k: &str| match k {
            "RIDE_LEDGER_TZ" => Some("+05:30".into()),
            _ => None,
        };
        let cfg = PipelineConfig::from_env_with(get).expect("cfg");
        assert_eq!(
            cfg.timezone,
            LocalZone::Fixed(FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap())
        );

        let get = |_: &str| Some("Europe/London".to_string());
        let cfg = PipelineConfig::from_env_with(get).expect("cfg");
        assert_eq!(cfg.timezone, LocalZone::Named(chrono_tz::Europe::London));
    }

    #[test]
    fn rejects_garbage_zone() {
        let get = |_: &str| Some("Not/A_Zone".to_string());
        assert!(matches!(
            PipelineConfig::from_env_with(get),
            Err(LedgerError::Config(_))
        ));
    }

    #[test]
    fn parse_offset_variants() {
        assert_eq!(parse_utc_offset("Z").map(|o| o.local_minus_utc()), Some(0));
        assert_eq!(
            parse_utc_offset("-0400").map(|o| o.local_minus_utc()),
            Some(-4 * 3600)
        );
        assert!(parse_utc_offset("+25:00").is_none());
        assert!(parse_utc_offset("+01:75").is_none());
        assert!(parse_utc_offset("01:00").is_none());
    }
}
