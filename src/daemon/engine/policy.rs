use std::time::Duration;

use crate::daemon::storage::entities::{ActivityScope, UserPreferences};

/// Everything the tracker needs to know for one tick, derived from the
/// stored preferences. Handed over a watch channel so a tick always sees a
/// complete, consistent set of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingPolicy {
    pub track_private_mode: bool,
    pub track_vpn: bool,
    pub scope: ActivityScope,
    /// How long the desktop must stay focused before a Desktop session opens.
    pub desktop_entry_delay: Duration,
    /// How long a real app must stay focused before an open Desktop session
    /// closes.
    pub desktop_exit_delay: Duration,
}

impl Default for TrackingPolicy {
    fn default() -> Self {
        Self {
            track_private_mode: true,
            track_vpn: true,
            scope: ActivityScope::ActiveAppsOnly,
            desktop_entry_delay: Duration::from_secs(3),
            desktop_exit_delay: Duration::from_secs(2),
        }
    }
}

impl From<&UserPreferences> for TrackingPolicy {
    fn from(prefs: &UserPreferences) -> Self {
        Self {
            track_private_mode: prefs.track_private_mode,
            track_vpn: prefs.track_vpn,
            scope: prefs.scope,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_follows_preferences_and_keeps_default_hysteresis() {
        let prefs = UserPreferences {
            track_private_mode: false,
            scope: ActivityScope::EntireScreen,
            ..UserPreferences::default()
        };
        let policy = TrackingPolicy::from(&prefs);
        assert!(!policy.track_private_mode);
        assert!(policy.track_vpn);
        assert_eq!(policy.scope, ActivityScope::EntireScreen);
        assert_eq!(policy.desktop_entry_delay, Duration::from_secs(3));
        assert_eq!(policy.desktop_exit_delay, Duration::from_secs(2));
    }
}
