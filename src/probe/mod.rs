//! OS collaborators consumed by the classifier: the foreground-window probe,
//! icon extraction, the installed-VPN enumerator and the hosted-app rescan.
//! [GenericProbe] picks the platform implementation at compile time.

#[cfg(feature = "win")]
pub mod win;

pub mod power;
pub mod scan;

use std::path::{Path, PathBuf};

use anyhow::Result;

/// Raw information about the current foreground window, before any
/// classification. `exe_path` is empty when the owning executable could not
/// be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWindow {
    pub process_id: u32,
    /// Process name without extension, e.g. `chrome`.
    pub process_name: String,
    pub window_title: String,
    pub exe_path: String,
    pub minimized: bool,
    pub on_current_desktop: bool,
}

/// Contract platform probes must implement. Returns `None` when there is no
/// foreground window at all (lock screen transitions, empty desktop on some
/// shells).
#[cfg_attr(test, mockall::automock)]
pub trait ForegroundProbe: Send {
    fn foreground(&mut self) -> Result<Option<RawWindow>>;
}

/// Extracts an icon for an executable. Extraction itself is platform chrome;
/// the daemon only needs the bytes, so the default implementation reports
/// nothing and the store backfills from the icon cache.
#[cfg_attr(test, mockall::automock)]
pub trait IconExtractor: Send {
    fn extract(&self, exe_path: &Path) -> Option<Vec<u8>>;
}

pub struct NullIconExtractor;

impl IconExtractor for NullIconExtractor {
    fn extract(&self, _exe_path: &Path) -> Option<Vec<u8>> {
        None
    }
}

/// Lists display names of installed VPN products, used by the VPN gate.
#[cfg_attr(test, mockall::automock)]
pub trait VpnEnumerator: Send {
    fn installed_vpn_names(&mut self) -> Vec<String>;
}

/// Narrow interface around the expensive "which process really owns this
/// hosted window" heuristic, so the state machine never depends on how the
/// rescan is done.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessScanner: Send {
    /// Looks for a running process whose main window title matches `title`
    /// and whose executable lives under the packaged-apps install segment.
    fn find_hosted_exe(&mut self, title: &str) -> Option<PathBuf>;

    /// Full command line of a process, used to spot private-browsing flags.
    fn cmdline(&mut self, pid: u32) -> Option<String>;

    /// Product name from the executable's version resource, the last resort
    /// before falling back to the raw process name.
    fn product_name(&mut self, exe_path: &Path) -> Option<String>;
}

/// Cross-platform probe entry point.
pub struct GenericProbe {
    inner: Box<dyn ForegroundProbe>,
}

impl GenericProbe {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                Ok(Self {
                    inner: Box::new(win::WindowsProbe::new()),
                })
            }
            else {
                // This runtime error is needed to allow the project to be compiled for during testing.
                unimplemented!("No foreground probe was specified")
            }
        }
    }
}

impl ForegroundProbe for GenericProbe {
    fn foreground(&mut self) -> Result<Option<RawWindow>> {
        self.inner.foreground()
    }
}
