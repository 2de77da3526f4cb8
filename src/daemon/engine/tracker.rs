//! The session state machine. One evaluation per tick turns the classified
//! observation stream into closed sessions; the open session only ever lives
//! here and is written whole at its boundary.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::daemon::classify::{tables::DESKTOP_APP_NAME, FocusSample, Observation, ObservationSource};
use crate::daemon::storage::entities::{ActivityScope, Session};
use crate::probe::power::PowerEvent;
use crate::utils::clock::Clock;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

struct OpenSession {
    app_name: String,
    window_title: String,
    exe_path: String,
    icon: Option<Vec<u8>>,
    start_time: DateTime<Utc>,
}

pub struct SessionTracker {
    clock: Arc<dyn Clock>,
    source: Box<dyn ObservationSource>,
    writer: mpsc::Sender<Session>,
    policy: watch::Receiver<super::policy::TrackingPolicy>,
    /// This program's own executable; its windows are never logged.
    own_exe: String,
    open: Option<OpenSession>,
    suspended: bool,
    desktop_since: Option<DateTime<Utc>>,
    real_app_since: Option<DateTime<Utc>>,
}

impl SessionTracker {
    pub fn new(
        clock: Arc<dyn Clock>,
        source: Box<dyn ObservationSource>,
        writer: mpsc::Sender<Session>,
        policy: watch::Receiver<super::policy::TrackingPolicy>,
        own_exe: String,
    ) -> Self {
        Self {
            clock,
            source,
            writer,
            policy,
            own_exe,
            open: None,
            suspended: false,
            desktop_since: None,
            real_app_since: None,
        }
    }

    /// Tick loop. Evaluations are serialized here; when one overruns its
    /// slot, the missed boundaries are skipped rather than queued.
    pub async fn run(
        mut self,
        mut power_events: mpsc::Receiver<PowerEvent>,
        cancellation_token: CancellationToken,
    ) {
        let mut tick_point = self.clock.instant();
        let mut power_open = true;
        loop {
            let clock = self.clock.clone();
            select! {
                _ = cancellation_token.cancelled() => break,
                event = power_events.recv(), if power_open => {
                    match event {
                        Some(event) => self.handle_power(event),
                        None => power_open = false,
                    }
                }
                _ = clock.sleep_until(tick_point) => {
                    self.evaluate_tick();
                    tick_point += TICK_PERIOD;
                    let now = self.clock.instant();
                    while tick_point < now {
                        tick_point += TICK_PERIOD;
                    }
                }
            }
        }
        self.flush();
    }

    fn evaluate_tick(&mut self) {
        if self.suspended {
            return;
        }

        let policy = self.policy.borrow().clone();
        let now = self.clock.time();

        match self.source.observe() {
            Observation::Focus(sample) => {
                if !self.own_exe.is_empty() && sample.exe_path == self.own_exe {
                    self.drop_focus(now);
                    return;
                }
                if sample.window_title.is_empty() {
                    self.drop_focus(now);
                    return;
                }
                if !policy.track_private_mode && sample.is_private {
                    self.drop_focus(now);
                    return;
                }
                if !policy.track_vpn && sample.is_vpn {
                    self.drop_focus(now);
                    return;
                }
                self.on_real_sample(sample, now, &policy);
            }
            Observation::Desktop => self.on_desktop(now, &policy),
            Observation::NoSample => self.drop_focus(now),
        }
    }

    /// Nothing trackable this tick: any open session ends now.
    fn drop_focus(&mut self, now: DateTime<Utc>) {
        self.close_open(now);
        self.desktop_since = None;
        self.real_app_since = None;
    }

    fn on_real_sample(
        &mut self,
        sample: FocusSample,
        now: DateTime<Utc>,
        policy: &super::policy::TrackingPolicy,
    ) {
        self.desktop_since = None;

        if let Some(open) = &self.open {
            if open.app_name == DESKTOP_APP_NAME {
                // A short alt-tab through a real window must not cut the
                // desktop session; the switch has to persist first.
                let since = *self.real_app_since.get_or_insert(now);
                if now.signed_duration_since(since).to_std().unwrap_or_default()
                    < policy.desktop_exit_delay
                {
                    return;
                }
                self.close_open(now);
            } else if open.app_name == sample.app_name && open.window_title == sample.window_title {
                self.real_app_since = None;
                return;
            } else {
                self.close_open(now);
            }
        }

        self.real_app_since = None;
        self.open = Some(OpenSession {
            app_name: sample.app_name,
            window_title: sample.window_title,
            exe_path: sample.exe_path,
            icon: sample.icon,
            start_time: now,
        });
    }

    fn on_desktop(&mut self, now: DateTime<Utc>, policy: &super::policy::TrackingPolicy) {
        self.real_app_since = None;

        match policy.scope {
            ActivityScope::ActiveAppsOnly => {
                self.close_open(now);
                self.desktop_since = None;
            }
            ActivityScope::EntireScreen => {
                if let Some(open) = &self.open {
                    if open.app_name == DESKTOP_APP_NAME {
                        self.desktop_since = None;
                        return;
                    }
                    self.close_open(now);
                }
                // Glancing at the desktop between apps is not a session; it
                // has to hold for the entry delay first.
                let since = *self.desktop_since.get_or_insert(now);
                if now.signed_duration_since(since).to_std().unwrap_or_default()
                    >= policy.desktop_entry_delay
                {
                    self.open = Some(OpenSession {
                        app_name: DESKTOP_APP_NAME.to_string(),
                        window_title: DESKTOP_APP_NAME.to_string(),
                        exe_path: String::new(),
                        icon: None,
                        start_time: now,
                    });
                    self.desktop_since = None;
                }
            }
        }
    }

    fn handle_power(&mut self, event: PowerEvent) {
        match event {
            PowerEvent::SleepBegan(at) | PowerEvent::Locked(at) => {
                debug!("Suspending tracking at {at}");
                self.close_open(at);
                self.desktop_since = None;
                self.real_app_since = None;
                self.suspended = true;
            }
            PowerEvent::Resumed | PowerEvent::Unlocked => {
                debug!("Resuming tracking");
                self.suspended = false;
            }
        }
    }

    /// Ends the open session at `end_time` and hands it to the writer. A
    /// session that would not satisfy `end > start` is discarded.
    fn close_open(&mut self, end_time: DateTime<Utc>) {
        let Some(open) = self.open.take() else {
            return;
        };
        if end_time <= open.start_time {
            return;
        }
        let session = Session {
            app_name: open.app_name,
            window_title: open.window_title,
            exe_path: open.exe_path,
            start_time: open.start_time,
            end_time,
            icon: open.icon,
        };
        if let Err(err) = self.writer.try_send(session) {
            warn!("Dropping closed session, writer unavailable: {err}");
        }
    }

    /// Shutdown path: the open session is closed and queued before the
    /// writer channel closes behind it.
    fn flush(&mut self) {
        let now = self.clock.time();
        self.close_open(now);
    }
}
