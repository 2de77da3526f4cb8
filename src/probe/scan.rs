use std::path::{Path, PathBuf};

use sysinfo::System;
use tracing::debug;

use super::{ProcessScanner, VpnEnumerator};

/// Path segment identifying platform-packaged applications. A hosted window
/// is only re-attributed when the rescan lands on an executable under it.
const PACKAGED_APPS_SEGMENT: &str = "WindowsApps";

/// Product names a VPN installation is recognized by.
const VPN_KEYWORDS: [&str; 7] = [
    "vpn",
    "nord",
    "express",
    "proton",
    "surfshark",
    "pia",
    "windscribe",
];

/// sysinfo-backed implementation of the hosted-app rescan. The heuristic is
/// racy (the process set can change between the probe and the scan), which is
/// why it sits behind [ProcessScanner].
pub struct SysinfoScanner {
    system: System,
}

impl SysinfoScanner {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessScanner for SysinfoScanner {
    fn cmdline(&mut self, pid: u32) -> Option<String> {
        let pid = sysinfo::Pid::from_u32(pid);
        self.system
            .refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
        let process = self.system.process(pid)?;
        let cmd = process
            .cmd()
            .iter()
            .map(|v| v.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        if cmd.is_empty() {
            None
        } else {
            Some(cmd)
        }
    }

    fn product_name(&mut self, exe_path: &Path) -> Option<String> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                super::win::product_name(exe_path)
            } else {
                let _ = exe_path;
                None
            }
        }
    }

    fn find_hosted_exe(&mut self, title: &str) -> Option<PathBuf> {
        self.system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
        let title = title.to_lowercase();
        for process in self.system.processes().values() {
            let Some(exe) = process.exe() else {
                continue;
            };
            if !exe
                .components()
                .any(|c| c.as_os_str().to_string_lossy() == PACKAGED_APPS_SEGMENT)
            {
                continue;
            }
            let name = process.name().to_string_lossy().to_lowercase();
            let stem = name.trim_end_matches(".exe");
            if !stem.is_empty() && title.contains(stem) {
                debug!("Re-attributed hosted window {title:?} to {exe:?}");
                return Some(exe.to_path_buf());
            }
        }
        None
    }
}

/// Discovers installed VPN products by scanning standard install directories
/// for names matching the keyword list. Registry-based enumeration belongs to
/// the platform layer; directory names are a portable approximation of the
/// same install records.
pub struct InstallDirVpnEnumerator {
    roots: Vec<PathBuf>,
}

impl InstallDirVpnEnumerator {
    pub fn new() -> Self {
        let mut roots = Vec::new();
        for var in ["ProgramFiles", "ProgramFiles(x86)", "LOCALAPPDATA"] {
            if let Ok(v) = std::env::var(var) {
                roots.push(PathBuf::from(v));
            }
        }
        Self { roots }
    }

    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl Default for InstallDirVpnEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl VpnEnumerator for InstallDirVpnEnumerator {
    fn installed_vpn_names(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        for root in &self.roots {
            collect_vpn_dirs(root, &mut names);
        }
        names
    }
}

fn collect_vpn_dirs(root: &Path, names: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let lowered = name.to_lowercase();
        // Exact keyword match only, so helper tooling like "openvpn-docs"
        // doesn't get flagged as a VPN product.
        if VPN_KEYWORDS.iter().any(|k| lowered == *k) && !names.contains(&name) {
            names.push(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vpn_enumerator_matches_exact_directory_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nord")).unwrap();
        std::fs::create_dir(dir.path().join("nordic-tools")).unwrap();
        std::fs::create_dir(dir.path().join("surfshark")).unwrap();

        let mut enumerator = InstallDirVpnEnumerator::with_roots(vec![dir.path().to_path_buf()]);
        let mut names = enumerator.installed_vpn_names();
        names.sort();
        assert_eq!(names, vec!["nord".to_string(), "surfshark".to_string()]);
    }

    #[test]
    fn vpn_enumerator_survives_missing_root() {
        let mut enumerator =
            InstallDirVpnEnumerator::with_roots(vec![PathBuf::from("/nonexistent/focuslog")]);
        assert!(enumerator.installed_vpn_names().is_empty());
    }
}
