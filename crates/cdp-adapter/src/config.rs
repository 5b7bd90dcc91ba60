use crate::detect_chrome_executable;
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
};

/// Configuration for launching and driving Chromium.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CdpConfig {
    pub executable: PathBuf,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    pub default_deadline_ms: u64,
    /// Attach to an already running browser instead of launching one.
    pub websocket_url: Option<String>,
    pub heartbeat_interval_ms: u64,
    pub viewport: Viewport,
    /// Pause between keystrokes on the typing path.
    pub keystroke_delay_ms: u64,
    pub no_sandbox: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 1100,
        }
    }
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            executable: default_chrome_path(),
            user_data_dir: default_profile_dir(),
            headless: true,
            default_deadline_ms: 30_000,
            websocket_url: None,
            heartbeat_interval_ms: 15_000,
            viewport: Viewport::default(),
            keystroke_delay_ms: 50,
            no_sandbox: resolve_no_sandbox(),
        }
    }
}

fn resolve_no_sandbox() -> bool {
    env::var("DASHPROBE_DISABLE_SANDBOX")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn default_chrome_path() -> PathBuf {
    detect_chrome_executable().unwrap_or_default()
}

fn default_profile_dir() -> PathBuf {
    if let Ok(path) = env::var("DASHPROBE_CHROME_PROFILE") {
        return PathBuf::from(path);
    }

    let default = Path::new("./.dashprobe-profile");
    default.into()
}
