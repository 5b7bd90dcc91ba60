//! Browser automation surface for the dashprobe engine.
//!
//! [`BrowserPage`] is the capability set the query stages are written
//! against. [`CdpPage`] drives a real Chromium-family browser over the
//! DevTools protocol; [`fake::FakePage`] is an in-memory stand-in for tests.

use std::{env, path::PathBuf};
use which::which;

pub mod anchor;
pub mod browser;
pub mod config;
pub mod error;
pub mod fake;
pub mod page;
mod script;
pub mod surface;
pub mod transport;
pub mod util;

pub use anchor::{normalize_text, AnchorDescriptor};
pub use browser::CdpBrowser;
pub use config::{CdpConfig, Viewport};
pub use error::{AdapterError, AdapterErrorKind};
pub use page::CdpPage;
pub use surface::{BrowserPage, ElementRef, FrameInfo, FrameRef};

/// Executable names looked up on `PATH`, most specific first.
#[cfg(windows)]
const PATH_NAMES: &[&str] = &["chrome.exe", "msedge.exe", "chromium.exe"];
#[cfg(not(windows))]
const PATH_NAMES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
    "microsoft-edge",
];

/// Locate a Chromium-family executable: `DASHPROBE_CHROME`, then `PATH`, then
/// the usual install locations.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    explicit_executable()
        .or_else(|| PATH_NAMES.iter().find_map(|name| which(name).ok()))
        .or_else(|| install_locations().into_iter().find(|path| path.exists()))
}

fn explicit_executable() -> Option<PathBuf> {
    let raw = env::var("DASHPROBE_CHROME").ok()?;
    let path = PathBuf::from(raw.trim());
    (!raw.trim().is_empty() && path.exists()).then_some(path)
}

#[cfg(target_os = "macos")]
fn install_locations() -> Vec<PathBuf> {
    [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(windows)]
fn install_locations() -> Vec<PathBuf> {
    const SUFFIXES: &[&str] = &[
        "Google/Chrome/Application/chrome.exe",
        "Microsoft/Edge/Application/msedge.exe",
        "Chromium/Application/chrome.exe",
    ];
    ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .filter(|root| !root.trim().is_empty())
        .flat_map(|root| SUFFIXES.iter().map(move |suffix| PathBuf::from(root.trim()).join(suffix)))
        .collect()
}

#[cfg(not(any(target_os = "macos", windows)))]
fn install_locations() -> Vec<PathBuf> {
    [
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/bin/microsoft-edge",
        "/snap/bin/chromium",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::ffi::OsString;
    use std::fs;
    use tempfile::tempdir;

    /// Restores the listed variables when dropped.
    struct EnvSnapshot(Vec<(&'static str, Option<OsString>)>);

    impl EnvSnapshot {
        fn take(keys: &[&'static str]) -> Self {
            Self(keys.iter().map(|key| (*key, env::var_os(key))).collect())
        }
    }

    impl Drop for EnvSnapshot {
        fn drop(&mut self) {
            for (key, value) in &self.0 {
                match value {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    #[serial]
    fn explicit_variable_wins() {
        let _restore = EnvSnapshot::take(&["DASHPROBE_CHROME"]);
        let dir = tempdir().unwrap();
        let exe = dir.path().join("my-chrome");
        fs::write(&exe, b"").unwrap();
        env::set_var("DASHPROBE_CHROME", &exe);
        assert_eq!(detect_chrome_executable(), Some(exe));
    }

    #[test]
    #[serial]
    fn missing_explicit_path_is_ignored() {
        let _restore = EnvSnapshot::take(&["DASHPROBE_CHROME"]);
        env::set_var("DASHPROBE_CHROME", "/definitely/not/here/chrome");
        assert!(explicit_executable().is_none());
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn falls_back_to_path_lookup() {
        use std::os::unix::fs::PermissionsExt;

        let _restore = EnvSnapshot::take(&["DASHPROBE_CHROME", "PATH"]);
        let dir = tempdir().unwrap();
        let exe = dir.path().join(PATH_NAMES[0]);
        fs::write(&exe, b"").unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
        env::remove_var("DASHPROBE_CHROME");
        env::set_var("PATH", dir.path());
        assert_eq!(detect_chrome_executable(), Some(exe));
    }
}
