use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A closed interval of continuous focus on one `(app, window title)`
/// identity. Sessions are created whole at boundary time; the open session
/// lives only in the tracker's memory and is never written incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub app_name: String,
    pub window_title: String,
    /// Empty when the owning executable could not be resolved.
    pub exe_path: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Icon bytes captured at classification time, used to seed the icon
    /// cache on first persist. Not stored per-row.
    pub icon: Option<Vec<u8>>,
}

impl Session {
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    pub fn duration_seconds(&self) -> i64 {
        self.duration().num_seconds()
    }

    /// `end_time > start_time` must hold for every persisted session.
    pub fn is_well_formed(&self) -> bool {
        self.end_time > self.start_time
    }
}

/// A session as read back from the store, with its surrogate id and the
/// cached icon joined in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub id: i64,
    pub app_name: String,
    pub window_title: String,
    pub exe_path: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i64,
    pub icon: Option<Vec<u8>>,
}

/// Whether idle desktop time counts as trackable activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityScope {
    #[default]
    ActiveAppsOnly,
    EntireScreen,
}

impl ActivityScope {
    pub fn to_i64(self) -> i64 {
        match self {
            ActivityScope::ActiveAppsOnly => 0,
            ActivityScope::EntireScreen => 1,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        if value == 1 {
            ActivityScope::EntireScreen
        } else {
            ActivityScope::ActiveAppsOnly
        }
    }
}

/// The singleton preferences row. Fields added after a database was created
/// are backfilled by migrations and default on read, so an old store never
/// fails a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub track_private_mode: bool,
    pub track_vpn: bool,
    /// "HH:MM"; "00:00" disables the break reminder.
    pub break_interval: String,
    pub notify_every_interval: bool,
    pub scope: ActivityScope,
    /// How many days of history to keep; `None` keeps everything.
    pub history_retention_days: Option<u32>,
    /// Date of the last retention sweep, so it runs at most once per day.
    pub last_retention_sweep: Option<chrono::NaiveDate>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            track_private_mode: true,
            track_vpn: true,
            break_interval: "00:00".into(),
            notify_every_interval: false,
            scope: ActivityScope::ActiveAppsOnly,
            history_retention_days: None,
            last_retention_sweep: None,
        }
    }
}

impl UserPreferences {
    /// Parses `break_interval` into a duration; `None` when disabled or
    /// malformed.
    pub fn break_duration(&self) -> Option<Duration> {
        let (hours, minutes) = self.break_interval.split_once(':')?;
        let hours: i64 = hours.parse().ok()?;
        let minutes: i64 = minutes.parse().ok()?;
        let total = Duration::hours(hours) + Duration::minutes(minutes);
        if total > Duration::zero() {
            Some(total)
        } else {
            None
        }
    }
}

/// A single-field preference mutation, the only way settings change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreferenceUpdate {
    TrackPrivateMode(bool),
    TrackVpn(bool),
    BreakInterval(String),
    NotifyEveryInterval(bool),
    Scope(ActivityScope),
    HistoryRetentionDays(Option<u32>),
    LastRetentionSweep(chrono::NaiveDate),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_duration_parses_and_rejects_disabled() {
        let mut prefs = UserPreferences::default();
        assert_eq!(prefs.break_duration(), None);

        prefs.break_interval = "01:30".into();
        assert_eq!(prefs.break_duration(), Some(Duration::minutes(90)));

        prefs.break_interval = "nonsense".into();
        assert_eq!(prefs.break_duration(), None);
    }

    #[test]
    fn scope_roundtrip() {
        assert_eq!(ActivityScope::from_i64(0), ActivityScope::ActiveAppsOnly);
        assert_eq!(ActivityScope::from_i64(1), ActivityScope::EntireScreen);
        // Unknown values written by a future version fall back to the
        // conservative scope.
        assert_eq!(ActivityScope::from_i64(7), ActivityScope::ActiveAppsOnly);
    }
}
