//! Runtime configuration: YAML file, then environment overrides.

use std::path::PathBuf;
use std::time::Duration;

use action_flow::{host_of, FlowPolicy, QueryPlans, SessionCheck};
use cdp_adapter::{AnchorDescriptor, CdpConfig, Viewport};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const DEFAULT_DASHBOARD_URL: &str = "https://alicom-ops.alibaba-inc.com";
pub const DEFAULT_LOGIN_URL: &str = "https://login.alibaba-inc.com/ssoLogin.htm";

/// Browser engines that can be driven over the DevTools protocol.
const CHROMIUM_FAMILY: &[&str] = &["chromium", "chrome", "msedge", "edge"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserSettings,
    pub session: SessionSettings,
    pub login: LoginSettings,
    pub dashboard: DashboardSettings,
    pub timeouts: FlowPolicy,
    pub query: QueryDefaults,
    pub logging: LoggingSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub browser_type: String,
    /// Preferred installed browser, e.g. `msedge` or `chrome`.
    pub channel: Option<String>,
    pub executable: Option<PathBuf>,
    /// Attach to a running browser instead of launching one.
    pub websocket_url: Option<String>,
    pub user_data_dir: Option<PathBuf>,
    pub viewport: Viewport,
    pub no_sandbox: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            browser_type: "chromium".to_string(),
            channel: None,
            executable: None,
            websocket_url: None,
            user_data_dir: None,
            viewport: Viewport::default(),
            no_sandbox: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub dir: PathBuf,
    /// Joined onto `dir`; an absolute path replaces it.
    pub file: PathBuf,
    pub ttl_hours: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("session"),
            file: PathBuf::from("sso_session.json"),
            ttl_hours: 24,
        }
    }
}

impl SessionSettings {
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(3600))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSettings {
    pub url: String,
    pub account_selector: String,
    pub password_selector: String,
    pub submit_text: String,
    /// Text shown once signed in; waited for briefly, never required.
    pub success_text: String,
    pub success_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    /// Credentials come from the environment only.
    #[serde(skip)]
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_LOGIN_URL.to_string(),
            account_selector: "#account".to_string(),
            password_selector: "#password".to_string(),
            submit_text: "登 录".to_string(),
            success_text: "Welcome".to_string(),
            success_timeout_ms: 10_000,
            navigation_timeout_ms: 60_000,
            username: None,
            password: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    pub base_url: String,
    /// Element only the sign-in form renders.
    pub login_marker: Option<AnchorDescriptor>,
    /// Full plan override; built from `base_url` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plans: Option<QueryPlans>,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DASHBOARD_URL.to_string(),
            login_marker: None,
            plans: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryDefaults {
    pub pid: Option<String>,
    pub sign_name: Option<String>,
    pub window: String,
    /// Ceiling on one whole query, retries included.
    pub budget_ms: Option<u64>,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            pid: None,
            sign_name: None,
            window: "30天".to_string(),
            budget_ms: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: Option<String>,
    /// Daily log files go here when set.
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Apply the environment variable overrides. `lookup` is `std::env::var`
    /// in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(value) = get("SSO_USERNAME") {
            self.login.username = Some(value);
        }
        if let Some(value) = get("SSO_PASSWORD") {
            self.login.password = Some(value);
        }
        if let Some(value) = get("SMS_PID") {
            self.query.pid = Some(value);
        }
        if let Some(value) = get("SMS_SIGN_NAME") {
            self.query.sign_name = Some(value);
        }
        if let Some(value) = get("HEADLESS") {
            self.browser.headless = value.eq_ignore_ascii_case("true") || value == "1";
        }
        if let Some(ms) = get("BROWSER_TIMEOUT").and_then(|v| v.parse::<u64>().ok()) {
            self.timeouts.navigation_timeout_ms = ms;
            self.timeouts.stages.navigation_ms = self.timeouts.stages.navigation_ms.max(ms);
        }
        if let Some(value) = get("BROWSER_TYPE") {
            self.browser.browser_type = value.to_ascii_lowercase();
        }
        if let Some(value) = get("BROWSER_CHANNEL") {
            self.browser.channel = Some(value);
        }
        if let Some(value) = get("SESSION_FILE") {
            self.session.file = PathBuf::from(value);
        }
        if let Some(value) = get("LOG_LEVEL") {
            self.logging.level = Some(value.to_ascii_lowercase());
        }
        if let Some(value) = get("DASHPROBE_CHROME") {
            self.browser.executable = Some(PathBuf::from(value));
        }
        if let Some(value) = get("DASHPROBE_WS_URL") {
            self.browser.websocket_url = Some(value);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let engine = self.browser.browser_type.to_ascii_lowercase();
        if !CHROMIUM_FAMILY.contains(&engine.as_str()) {
            problems.push(format!(
                "browser_type {engine:?} is not supported; use one of {}",
                CHROMIUM_FAMILY.join(", ")
            ));
        }
        for (name, raw) in [("dashboard.base_url", &self.dashboard.base_url), ("login.url", &self.login.url)] {
            if let Err(err) = Url::parse(raw) {
                problems.push(format!("{name} {raw:?} is not a valid URL: {err}"));
            }
        }
        if let Some(ws) = &self.browser.websocket_url {
            match Url::parse(ws) {
                Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
                Ok(url) => problems.push(format!("browser.websocket_url must use ws/wss, got {}", url.scheme())),
                Err(err) => problems.push(format!("browser.websocket_url {ws:?} is not a valid URL: {err}")),
            }
        }
        if self.session.ttl_hours == 0 {
            problems.push("session.ttl_hours must be at least 1".to_string());
        }

        problems.extend(self.timeouts.problems());

        if let Some(budget) = self.query.budget_ms {
            let ceiling = self.timeouts.stages.total_ms();
            if budget > ceiling {
                problems.push(format!(
                    "query.budget_ms {budget}ms exceeds the sum of stage timeouts {ceiling}ms"
                ));
            }
        }
        problems
    }

    pub fn plans(&self) -> QueryPlans {
        self.dashboard
            .plans
            .clone()
            .unwrap_or_else(|| QueryPlans::for_base_url(&self.dashboard.base_url))
    }

    /// Landing on the SSO host after navigation means the session lapsed.
    pub fn session_check(&self) -> SessionCheck {
        SessionCheck::new(host_of(&self.login.url), self.dashboard.login_marker.clone())
    }

    pub fn cdp_config(&self) -> CdpConfig {
        let mut cfg = CdpConfig {
            headless: self.browser.headless,
            websocket_url: self.browser.websocket_url.clone(),
            viewport: self.browser.viewport,
            default_deadline_ms: self.timeouts.navigation_timeout_ms,
            ..CdpConfig::default()
        };
        if let Some(executable) = &self.browser.executable {
            cfg.executable = executable.clone();
        } else if let Some(found) = self.browser.channel.as_deref().and_then(channel_executable) {
            cfg.executable = found;
        }
        if let Some(dir) = &self.browser.user_data_dir {
            cfg.user_data_dir = dir.clone();
        }
        cfg.no_sandbox |= self.browser.no_sandbox;
        cfg
    }
}

/// Installed executable for a browser channel name, looked up on `PATH`.
pub fn channel_executable(channel: &str) -> Option<PathBuf> {
    let names: &[&str] = match channel.to_ascii_lowercase().as_str() {
        "msedge" | "edge" => &["msedge", "microsoft-edge", "microsoft-edge-stable"],
        "chrome" => &["google-chrome-stable", "google-chrome", "chrome"],
        "chromium" => &["chromium", "chromium-browser"],
        _ => &[],
    };
    names.iter().find_map(|name| which::which(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok(), "{:?}", config.problems());
        assert_eq!(config.session.path(), PathBuf::from("session/sso_session.json"));
        assert_eq!(config.query.window, "30天");
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config: Config = serde_yaml::from_str("query:\n  pid: \"1\"\nbrowser:\n  headless: false\n").unwrap();
        config.apply_env(env(&[
            ("SMS_PID", "100000103722927"),
            ("SMS_SIGN_NAME", "国能e购"),
            ("HEADLESS", "True"),
            ("BROWSER_TIMEOUT", "90000"),
            ("SSO_USERNAME", "ops"),
            ("SSO_PASSWORD", "secret"),
            ("SESSION_FILE", "/tmp/elsewhere.json"),
            ("LOG_LEVEL", "DEBUG"),
        ]));
        assert_eq!(config.query.pid.as_deref(), Some("100000103722927"));
        assert_eq!(config.query.sign_name.as_deref(), Some("国能e购"));
        assert!(config.browser.headless);
        assert_eq!(config.timeouts.navigation_timeout_ms, 90_000);
        assert_eq!(config.timeouts.stages.navigation_ms, 90_000);
        assert_eq!(config.session.path(), PathBuf::from("/tmp/elsewhere.json"));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert!(config.validate().is_ok(), "{:?}", config.problems());
    }

    #[test]
    fn credentials_never_serialized() {
        let mut config = Config::default();
        config.apply_env(env(&[("SSO_USERNAME", "ops"), ("SSO_PASSWORD", "hunter2")]));
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("hunter2"));
        assert!(!yaml.contains("username"));
    }

    #[test]
    fn rejects_unsupported_engine_bad_url_and_short_stage() {
        let mut config = Config::default();
        config.browser.browser_type = "firefox".into();
        config.dashboard.base_url = "not a url".into();
        config.timeouts.stages.frame_ms = 1_000;
        config.query.budget_ms = Some(u64::MAX);
        let problems = config.problems();
        assert_eq!(problems.len(), 4, "{problems:?}");
        assert!(problems[0].contains("firefox"));
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("frame_ready"), "{err}");
    }

    #[test]
    fn session_check_targets_login_host() {
        let check = Config::default().session_check();
        assert_eq!(check.login_host.as_deref(), Some("login.alibaba-inc.com"));
    }

    #[test]
    fn unknown_channel_has_no_executable() {
        assert_eq!(channel_executable("netscape"), None);
    }

    #[test]
    fn plans_follow_base_url() {
        let mut config = Config::default();
        config.dashboard.base_url = "https://ops.example.com".into();
        assert!(config.plans().ticket.url.starts_with("https://ops.example.com/"));
    }
}
