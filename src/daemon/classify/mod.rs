//! Turns raw foreground-window probes into classified observations. The
//! classifier owns every per-tick decision that does not need session state:
//! ignoring system processes, resolving display names, re-attributing
//! generic-host windows, and flagging private-browsing and VPN activity.

pub mod privacy;
pub mod tables;

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::probe::{ForegroundProbe, IconExtractor, ProcessScanner, RawWindow, VpnEnumerator};

/// Installed-VPN enumeration hits the filesystem, so the name list is only
/// refreshed on this cadence.
const VPN_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Snapshot of trackable focus for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusSample {
    pub app_name: String,
    pub window_title: String,
    pub exe_path: String,
    pub icon: Option<Vec<u8>>,
    pub is_private: bool,
    pub is_vpn: bool,
}

/// Classifier output. The bare desktop is a distinguished case, never a
/// zero-valued sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Focus(FocusSample),
    Desktop,
    NoSample,
}

/// What the tracker polls every tick. A trait so engine tests can script
/// observation sequences without a probe.
pub trait ObservationSource: Send {
    fn observe(&mut self) -> Observation;
}

pub struct Classifier {
    probe: Box<dyn ForegroundProbe>,
    scanner: Box<dyn ProcessScanner>,
    icons: Box<dyn IconExtractor>,
    vpn: Box<dyn VpnEnumerator>,
    vpn_names: Vec<String>,
    vpn_refreshed: Option<Instant>,
}

impl Classifier {
    pub fn new(
        probe: Box<dyn ForegroundProbe>,
        scanner: Box<dyn ProcessScanner>,
        icons: Box<dyn IconExtractor>,
        vpn: Box<dyn VpnEnumerator>,
    ) -> Self {
        Self {
            probe,
            scanner,
            icons,
            vpn,
            vpn_names: Vec::new(),
            vpn_refreshed: None,
        }
    }

    /// Classifies the current foreground window. Platform failures degrade
    /// to [Observation::NoSample]; no error crosses this boundary.
    pub fn classify(&mut self) -> Observation {
        let raw = match self.probe.foreground() {
            Ok(Some(raw)) => raw,
            Ok(None) => return Observation::NoSample,
            Err(err) => {
                warn!("Foreground probe failed, skipping tick: {err:?}");
                return Observation::NoSample;
            }
        };

        if raw.process_name.is_empty() || tables::is_ignored_process(&raw.process_name) {
            return Observation::NoSample;
        }
        if raw.minimized || !raw.on_current_desktop {
            return Observation::NoSample;
        }

        if raw.process_name.eq_ignore_ascii_case(tables::SHELL_PROCESS)
            && tables::is_generic_shell_title(&raw.window_title)
        {
            return Observation::Desktop;
        }

        let resolved = self.resolve_identity(&raw);

        let is_private = self.detect_private(&raw);
        let is_vpn = {
            self.refresh_vpn_names();
            privacy::matches_vpn(&raw.process_name, &self.vpn_names)
        };

        Observation::Focus(FocusSample {
            app_name: resolved.app_name,
            window_title: raw.window_title,
            exe_path: resolved.exe_path,
            icon: resolved.icon,
            is_private,
            is_vpn,
        })
    }

    fn resolve_identity(&mut self, raw: &RawWindow) -> ResolvedIdentity {
        if raw
            .process_name
            .eq_ignore_ascii_case(tables::GENERIC_HOST_PROCESS)
        {
            return self.resolve_hosted(raw);
        }

        let app_name = self.display_name(&raw.process_name, &raw.exe_path);
        let icon = self.extract_icon(&raw.exe_path);
        ResolvedIdentity {
            app_name,
            exe_path: raw.exe_path.clone(),
            icon,
        }
    }

    /// A generic-host window belongs to whatever packaged app it is hosting.
    /// When the rescan finds the real process its executable wins; otherwise
    /// the curated table keeps the window attributable.
    fn resolve_hosted(&mut self, raw: &RawWindow) -> ResolvedIdentity {
        let Some(hosted_name) = tables::hosted_app_name(&raw.window_title) else {
            return ResolvedIdentity {
                app_name: self.display_name(&raw.process_name, &raw.exe_path),
                exe_path: raw.exe_path.clone(),
                icon: self.extract_icon(&raw.exe_path),
            };
        };

        if let Some(real_exe) = self.scanner.find_hosted_exe(&raw.window_title) {
            let exe_path = real_exe.to_string_lossy().to_string();
            let stem = real_exe
                .file_stem()
                .map(|v| v.to_string_lossy().to_string())
                .unwrap_or_default();
            debug!("Hosted window {:?} attributed to {stem}", raw.window_title);
            let app_name = self.display_name(&stem, &exe_path);
            let icon = self.extract_icon(&exe_path);
            return ResolvedIdentity {
                app_name,
                exe_path,
                icon,
            };
        }

        ResolvedIdentity {
            app_name: hosted_name.to_string(),
            exe_path: raw.exe_path.clone(),
            icon: tables::fallback_icon(hosted_name).map(|v| v.to_vec()),
        }
    }

    /// Friendly table, then the executable's product name, then the raw
    /// process name.
    fn display_name(&mut self, process_stem: &str, exe_path: &str) -> String {
        if let Some(name) = tables::friendly_name(process_stem) {
            return name.to_string();
        }
        if !exe_path.is_empty() {
            if let Some(name) = self.scanner.product_name(Path::new(exe_path)) {
                return name;
            }
        }
        process_stem.to_string()
    }

    fn detect_private(&mut self, raw: &RawWindow) -> bool {
        if let Some(family) = privacy::browser_family(&raw.process_name) {
            let cmdline = self.scanner.cmdline(raw.process_id);
            if privacy::is_private_window(family, cmdline.as_deref(), &raw.window_title) {
                return true;
            }
        }
        privacy::title_suggests_private(&raw.window_title)
    }

    fn extract_icon(&mut self, exe_path: &str) -> Option<Vec<u8>> {
        if exe_path.is_empty() {
            return None;
        }
        self.icons.extract(Path::new(exe_path))
    }

    fn refresh_vpn_names(&mut self) {
        let due = self
            .vpn_refreshed
            .map_or(true, |at| at.elapsed() >= VPN_REFRESH_INTERVAL);
        if due {
            self.vpn_names = self.vpn.installed_vpn_names();
            self.vpn_refreshed = Some(Instant::now());
        }
    }
}

struct ResolvedIdentity {
    app_name: String,
    exe_path: String,
    icon: Option<Vec<u8>>,
}

impl ObservationSource for Classifier {
    fn observe(&mut self) -> Observation {
        self.classify()
    }
}
