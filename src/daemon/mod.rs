use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::{
    select,
    sync::{mpsc, watch},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    probe::{
        power,
        scan::{InstallDirVpnEnumerator, SysinfoScanner},
        GenericProbe, NullIconExtractor,
    },
    utils::clock::{Clock, DefaultClock},
};

use self::{
    classify::Classifier,
    engine::{policy::TrackingPolicy, tracker::SessionTracker},
    storage::{db::Database, entities::{Session, UserPreferences}, maintenance, DATABASE_FILE},
};

pub mod args;
pub mod classify;
pub mod engine;
pub mod shutdown;
pub mod storage;
pub mod writer;

const SESSION_CHANNEL_CAPACITY: usize = 64;
const PREFERENCE_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Represents the starting point for the daemon.
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    std::env::set_current_dir("/")?;

    let db = Database::open(dir.join(DATABASE_FILE))?;
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let shutdown_token = CancellationToken::new();

    let preferences = db.get_preferences().await.unwrap_or_default();
    let (policy_sender, policy_receiver) = watch::channel(TrackingPolicy::from(&preferences));
    let (session_sender, session_receiver) = mpsc::channel::<Session>(SESSION_CHANNEL_CAPACITY);
    // The platform power listener plugs into this sender; the channel stays
    // open for the daemon's lifetime either way.
    let (_power_sender, power_receiver) = power::power_channel();

    let classifier = Classifier::new(
        Box::new(GenericProbe::new()?),
        Box::new(SysinfoScanner::new()),
        Box::new(NullIconExtractor),
        Box::new(InstallDirVpnEnumerator::new()),
    );
    let own_exe = std::env::current_exe()
        .map(|path| path.to_string_lossy().to_string())
        .unwrap_or_default();
    let tracker = SessionTracker::new(
        clock.clone(),
        Box::new(classifier),
        session_sender,
        policy_receiver,
        own_exe,
    );

    tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        tracker.run(power_receiver, shutdown_token.clone()),
        writer::run(session_receiver, db.clone()),
        maintenance::run(db.clone(), clock.clone(), shutdown_token.clone()),
        refresh_preferences(db, policy_sender, clock, shutdown_token),
    );

    Ok(())
}

/// Re-reads preferences on a fixed cadence, publishing a fresh policy to the
/// tracker and driving the break reminder. A failed read keeps the
/// last-known-good policy.
async fn refresh_preferences(
    db: Database,
    policy_sender: watch::Sender<TrackingPolicy>,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
) {
    let mut reminder = BreakReminder::default();
    loop {
        select! {
            _ = cancellation_token.cancelled() => return,
            _ = clock.sleep(PREFERENCE_REFRESH_INTERVAL) => {}
        }

        match db.get_preferences().await {
            Ok(preferences) => {
                let policy = TrackingPolicy::from(&preferences);
                policy_sender.send_if_modified(|current| {
                    if *current == policy {
                        false
                    } else {
                        *current = policy;
                        true
                    }
                });
                reminder.evaluate(&preferences, clock.time());
            }
            Err(err) => warn!("Preference refresh failed, keeping last policy: {err:?}"),
        }
    }
}

/// Fires a reminder once the configured break interval elapses. Changing the
/// interval re-arms the timer; with `notify_every_interval` set it repeats
/// on every elapsed interval instead of once.
#[derive(Default)]
struct BreakReminder {
    interval: Option<chrono::Duration>,
    armed_at: Option<DateTime<Utc>>,
    fired: bool,
}

impl BreakReminder {
    fn evaluate(&mut self, preferences: &UserPreferences, now: DateTime<Utc>) {
        let interval = preferences.break_duration();
        if interval != self.interval {
            self.interval = interval;
            self.armed_at = Some(now);
            self.fired = false;
        }
        let (Some(interval), Some(armed_at)) = (self.interval, self.armed_at) else {
            return;
        };
        if now - armed_at < interval {
            return;
        }
        if !self.fired || preferences.notify_every_interval {
            info!("Break reminder: {} elapsed since the last break", preferences.break_interval);
        }
        if preferences.notify_every_interval {
            self.armed_at = Some(now);
        } else {
            self.fired = true;
        }
    }
}

#[cfg(test)]
mod daemon_tests {
    use anyhow::Result;
    use chrono::Duration;
    use tempfile::tempdir;

    use crate::daemon::classify::{FocusSample, Observation, ObservationSource};
    use crate::utils::logging::TEST_LOGGING;

    use super::*;

    struct CyclingSource {
        items: Vec<Observation>,
        at: usize,
    }

    impl ObservationSource for CyclingSource {
        fn observe(&mut self) -> Observation {
            let item = self.items[self.at % self.items.len()].clone();
            self.at += 1;
            item
        }
    }

    fn focus(app: &str) -> Observation {
        Observation::Focus(FocusSample {
            app_name: app.to_string(),
            window_title: format!("{app} window"),
            exe_path: format!("C:\\apps\\{app}.exe"),
            icon: None,
            is_private: false,
            is_vpn: false,
        })
    }

    /// Very simple smoke test wiring the tracker to a real store through the
    /// writer, driven by a scripted observation cycle for a few seconds.
    #[tokio::test]
    async fn smoke_test_daemon() -> Result<()> {
        *TEST_LOGGING;

        let dir = tempdir()?;
        let db = Database::open(dir.path().join(DATABASE_FILE))?;
        let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
        let shutdown_token = CancellationToken::new();

        let (_policy_sender, policy_receiver) = watch::channel(TrackingPolicy::default());
        let (session_sender, session_receiver) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let (_power_sender, power_receiver) = power::power_channel();

        let source = CyclingSource {
            items: vec![focus("test"), focus("test"), focus("test b")],
            at: 0,
        };
        let tracker = SessionTracker::new(
            clock,
            Box::new(source),
            session_sender,
            policy_receiver,
            String::new(),
        );

        tokio::join!(
            async {
                tokio::time::sleep(std::time::Duration::from_millis(3500)).await;
                shutdown_token.cancel()
            },
            tracker.run(power_receiver, shutdown_token.clone()),
            writer::run(session_receiver, db.clone()),
        );

        let count: i64 = db
            .execute(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?))
            .await?;
        assert!(count >= 2, "expected at least two sessions, got {count}");
        Ok(())
    }

    #[test]
    fn break_reminder_fires_once_by_default() {
        let start = Utc::now();
        let prefs = UserPreferences {
            break_interval: "00:30".into(),
            ..UserPreferences::default()
        };

        let mut reminder = BreakReminder::default();
        reminder.evaluate(&prefs, start);
        assert!(!reminder.fired);

        reminder.evaluate(&prefs, start + Duration::minutes(31));
        assert!(reminder.fired);

        // Still fired, does not re-arm.
        reminder.evaluate(&prefs, start + Duration::minutes(90));
        assert!(reminder.fired);
    }

    #[test]
    fn break_reminder_rearms_on_interval_change() {
        let start = Utc::now();
        let mut prefs = UserPreferences {
            break_interval: "00:30".into(),
            ..UserPreferences::default()
        };

        let mut reminder = BreakReminder::default();
        reminder.evaluate(&prefs, start);
        reminder.evaluate(&prefs, start + Duration::minutes(31));
        assert!(reminder.fired);

        prefs.break_interval = "01:00".into();
        reminder.evaluate(&prefs, start + Duration::minutes(32));
        assert!(!reminder.fired);
    }

    #[test]
    fn break_reminder_repeats_when_configured() {
        let start = Utc::now();
        let prefs = UserPreferences {
            break_interval: "00:30".into(),
            notify_every_interval: true,
            ..UserPreferences::default()
        };

        let mut reminder = BreakReminder::default();
        reminder.evaluate(&prefs, start);
        reminder.evaluate(&prefs, start + Duration::minutes(31));
        // Repeating mode re-arms instead of latching.
        assert!(!reminder.fired);
        assert_eq!(reminder.armed_at, Some(start + Duration::minutes(31)));
    }
}
