//! Constant lookup data backing classification: processes that never count
//! as activity, friendly display names, the hosted-app table for generic
//! host windows, and the shell titles that mean "just the desktop".

/// Pseudo-app name used when the bare desktop itself is tracked.
pub const DESKTOP_APP_NAME: &str = "Desktop";

/// The shell process owning the desktop and the taskbar.
pub const SHELL_PROCESS: &str = "explorer";

/// Generic host that runs packaged apps inside its own frame. Windows owned
/// by it need re-attribution before they mean anything.
pub const GENERIC_HOST_PROCESS: &str = "ApplicationFrameHost";

/// System processes that can briefly hold the foreground without the user
/// doing anything with them.
pub const IGNORED_PROCESSES: [&str; 16] = [
    "LockApp",
    "SearchHost",
    "SearchUI",
    "RuntimeBroker",
    "StartMenuExperienceHost",
    "ShellExperienceHost",
    "TextInputHost",
    "dwm",
    "sihost",
    "System",
    "Idle",
    "smss",
    "csrss",
    "wininit",
    "services",
    "lsass",
];

/// Shell window titles that mean no application is focused.
pub const GENERIC_SHELL_TITLES: [&str; 2] = ["Program Manager", "System tray overflow window"];

/// Process stem (lowercase) to display name.
const FRIENDLY_NAMES: [(&str, &str); 20] = [
    ("chrome", "Google Chrome"),
    ("msedge", "Microsoft Edge"),
    ("firefox", "Firefox"),
    ("brave", "Brave"),
    ("opera", "Opera"),
    ("code", "Visual Studio Code"),
    ("devenv", "Visual Studio"),
    ("notepad", "Notepad"),
    ("explorer", "File Explorer"),
    ("winword", "Microsoft Word"),
    ("excel", "Microsoft Excel"),
    ("powerpnt", "Microsoft PowerPoint"),
    ("outlook", "Microsoft Outlook"),
    ("slack", "Slack"),
    ("discord", "Discord"),
    ("spotify", "Spotify"),
    ("telegram", "Telegram"),
    ("steam", "Steam"),
    ("vlc", "VLC Media Player"),
    ("taskmgr", "Task Manager"),
];

/// Title fragments of packaged apps known to run inside the generic host,
/// with the display name to attribute when the rescan cannot find the real
/// process.
const HOSTED_APPS: [(&str, &str); 8] = [
    ("WhatsApp", "WhatsApp"),
    ("Spotify", "Spotify"),
    ("Teams", "Microsoft Teams"),
    ("Netflix", "Netflix"),
    ("Calculator", "Calculator"),
    ("Mail", "Mail"),
    ("Calendar", "Calendar"),
    ("Photos", "Photos"),
];

/// 1x1 transparent PNG used when an app has no extractable icon but reports
/// should still carry one.
const GENERIC_ICON: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x62, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

pub fn is_ignored_process(process_name: &str) -> bool {
    IGNORED_PROCESSES
        .iter()
        .any(|p| p.eq_ignore_ascii_case(process_name))
}

pub fn is_generic_shell_title(title: &str) -> bool {
    title.is_empty() || GENERIC_SHELL_TITLES.iter().any(|t| *t == title)
}

pub fn friendly_name(process_stem: &str) -> Option<&'static str> {
    let lowered = process_stem.to_lowercase();
    FRIENDLY_NAMES
        .iter()
        .find(|(stem, _)| *stem == lowered)
        .map(|(_, name)| *name)
}

/// Display name for a generic-host window, matched by title fragment.
pub fn hosted_app_name(window_title: &str) -> Option<&'static str> {
    HOSTED_APPS
        .iter()
        .find(|(fragment, _)| window_title.contains(fragment))
        .map(|(_, name)| *name)
}

/// Built-in icon for apps whose real icon could not be extracted. Hosted
/// apps and the desktop pseudo-app get the generic placeholder.
pub fn fallback_icon(app_name: &str) -> Option<&'static [u8]> {
    if app_name == DESKTOP_APP_NAME || HOSTED_APPS.iter().any(|(_, name)| *name == app_name) {
        Some(GENERIC_ICON)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_processes_match_case_insensitively() {
        assert!(is_ignored_process("lockapp"));
        assert!(is_ignored_process("RuntimeBroker"));
        assert!(!is_ignored_process("chrome"));
    }

    #[test]
    fn shell_titles() {
        assert!(is_generic_shell_title(""));
        assert!(is_generic_shell_title("Program Manager"));
        assert!(!is_generic_shell_title("Downloads - File Explorer"));
    }

    #[test]
    fn friendly_names_resolve_by_lowercase_stem() {
        assert_eq!(friendly_name("Chrome"), Some("Google Chrome"));
        assert_eq!(friendly_name("CODE"), Some("Visual Studio Code"));
        assert_eq!(friendly_name("myapp"), None);
    }

    #[test]
    fn hosted_app_matched_by_title_fragment() {
        assert_eq!(hosted_app_name("WhatsApp Web"), Some("WhatsApp"));
        assert_eq!(hosted_app_name("random window"), None);
        assert!(fallback_icon("WhatsApp").is_some());
        assert!(fallback_icon("Google Chrome").is_none());
    }
}
