//! Private-browsing and VPN detection. Browser families advertise private
//! windows differently: chromium forks put a flag on the command line, Edge
//! and Firefox need the flag and a title marker together, Tor is private by
//! definition. Titles alone are the last resort for everything else.

/// Browsers with a known private-mode signature, keyed by process stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserFamily {
    Chromium,
    Edge,
    Firefox,
    Tor,
}

pub fn browser_family(process_name: &str) -> Option<BrowserFamily> {
    match process_name.to_lowercase().as_str() {
        "chrome" | "chromium" | "brave" | "opera" | "vivaldi" => Some(BrowserFamily::Chromium),
        "msedge" => Some(BrowserFamily::Edge),
        "firefox" | "librewolf" => Some(BrowserFamily::Firefox),
        "tor" | "torbrowser" => Some(BrowserFamily::Tor),
        _ => None,
    }
}

pub fn is_private_window(family: BrowserFamily, cmdline: Option<&str>, title: &str) -> bool {
    let cmdline = cmdline.map(|v| v.to_lowercase()).unwrap_or_default();
    let title = title.to_lowercase();
    match family {
        BrowserFamily::Chromium => cmdline.contains("--incognito"),
        // Edge launches InPrivate windows from the same process; the flag is
        // only trustworthy when the window says so too.
        BrowserFamily::Edge => cmdline.contains("-inprivate") && title.contains("inprivate"),
        BrowserFamily::Firefox => {
            cmdline.contains("-private") && title.contains("private browsing")
        }
        BrowserFamily::Tor => true,
    }
}

/// Catch-all for browsers without a known signature.
pub fn title_suggests_private(title: &str) -> bool {
    let lowered = title.to_lowercase();
    ["incognito", "inprivate", "private browsing"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Whether a process belongs to an installed VPN product. Compared both
/// ways so "NordVPN" the install dir matches "nordvpn-service" the process.
pub fn matches_vpn(process_name: &str, vpn_names: &[String]) -> bool {
    if process_name.is_empty() {
        return false;
    }
    let process = process_name.to_lowercase();
    vpn_names.iter().any(|name| {
        let name = name.to_lowercase();
        !name.is_empty() && (process.contains(&name) || name.contains(&process))
    })
}
