//! Daemon configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SOCKET_NAME: &str = "authui.sock";
pub const DEFAULT_LOGGING_LEVEL: u8 = 1;
pub const DEFAULT_DAEMON_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HELPER_PROGRAM: &str = "authui-browser";
pub const DEFAULT_HELPER_SHUTDOWN_SECS: u64 = 5;
pub const DEFAULT_DESKTOP_FILE: &str = "/usr/share/applications/authui.desktop";
pub const DEFAULT_DIALOG_COMMAND: &str = "zenity";
pub const DEFAULT_NOTIFY_COMMAND: &str = "notify-send";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown AUTHUI_BROWSER_MODE: {0} (expected 'remote' or 'in-process')")]
    InvalidBrowserMode(String),
}

/// Where web-login requests are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserMode {
    /// Out-of-process helper over framed IPC.
    Remote,
    /// Web view provided by the toolkit.
    InProcess,
}

/// How to launch the out-of-process browser helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperConfig {
    pub program: PathBuf,
    pub desktop_file: String,
    /// Bounded wait for a canceled helper to exit before it is killed.
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub socket_path: PathBuf,
    pub cache_dir: PathBuf,
    /// `None` disables idle shutdown.
    pub idle_timeout: Option<Duration>,
    pub browser_mode: BrowserMode,
    pub helper: HelperConfig,
    pub dialog_command: String,
    /// Empty disables desktop notifications; failures are only logged.
    pub notify_command: String,
    pub accounts_file: Option<PathBuf>,
    pub indicator_enabled: bool,
}

impl Config {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `AUTHUI_SOCKET`: default `$XDG_RUNTIME_DIR/authui.sock`
    /// - `AUTHUI_CACHE_DIR`: default `$XDG_CACHE_HOME/authui`
    /// - `AUTHUI_DAEMON_TIMEOUT`: idle seconds before exit, `0` never; default 30
    /// - `AUTHUI_BROWSER_MODE`: `remote` (default) or `in-process`
    /// - `AUTHUI_BROWSER_HELPER`, `AUTHUI_DESKTOP_FILE`, `AUTHUI_HELPER_SHUTDOWN_SECS`
    /// - `AUTHUI_DIALOG_COMMAND`: default `zenity`
    /// - `AUTHUI_NOTIFY_COMMAND`: default `notify-send`
    /// - `AUTHUI_ACCOUNTS_FILE`: JSON account list used for escalation
    /// - `AUTHUI_INDICATOR`: `0` disables escalation to the indicator
    pub fn from_env() -> Result<Self, ConfigError> {
        let socket_path = env_path("AUTHUI_SOCKET").unwrap_or_else(default_socket_path);
        let cache_dir = env_path("AUTHUI_CACHE_DIR").unwrap_or_else(default_cache_dir);
        let idle_secs = env_parse("AUTHUI_DAEMON_TIMEOUT", DEFAULT_DAEMON_TIMEOUT_SECS);
        let browser_mode = parse_browser_mode(std::env::var("AUTHUI_BROWSER_MODE").ok().as_deref())?;
        let helper = HelperConfig {
            program: env_path("AUTHUI_BROWSER_HELPER").unwrap_or_else(|| PathBuf::from(DEFAULT_HELPER_PROGRAM)),
            desktop_file: std::env::var("AUTHUI_DESKTOP_FILE").unwrap_or_else(|_| DEFAULT_DESKTOP_FILE.to_string()),
            shutdown_timeout: Duration::from_secs(env_parse(
                "AUTHUI_HELPER_SHUTDOWN_SECS",
                DEFAULT_HELPER_SHUTDOWN_SECS,
            )),
        };

        Ok(Self {
            socket_path,
            cache_dir,
            idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
            browser_mode,
            helper,
            dialog_command: std::env::var("AUTHUI_DIALOG_COMMAND").unwrap_or_else(|_| DEFAULT_DIALOG_COMMAND.to_string()),
            notify_command: std::env::var("AUTHUI_NOTIFY_COMMAND").unwrap_or_else(|_| DEFAULT_NOTIFY_COMMAND.to_string()),
            accounts_file: env_path("AUTHUI_ACCOUNTS_FILE"),
            indicator_enabled: std::env::var("AUTHUI_INDICATOR").map_or(true, |v| v != "0"),
        })
    }
}

/// Tracing filter directive for `AUTHUI_LOGGING_LEVEL`.
///
/// `0` errors only, `1` warnings (default), `2` and above debug.
#[must_use]
pub fn log_filter() -> &'static str {
    match env_parse("AUTHUI_LOGGING_LEVEL", DEFAULT_LOGGING_LEVEL) {
        0 => "error",
        1 => "warn",
        _ => "debug",
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn parse_browser_mode(raw: Option<&str>) -> Result<BrowserMode, ConfigError> {
    match raw.unwrap_or("remote") {
        "remote" => Ok(BrowserMode::Remote),
        "in-process" => Ok(BrowserMode::InProcess),
        other => Err(ConfigError::InvalidBrowserMode(other.to_string())),
    }
}

fn default_socket_path() -> PathBuf {
    env_path("XDG_RUNTIME_DIR")
        .unwrap_or_else(std::env::temp_dir)
        .join(DEFAULT_SOCKET_NAME)
}

fn default_cache_dir() -> PathBuf {
    if let Some(dir) = env_path("XDG_CACHE_HOME") {
        return dir.join("authui");
    }
    if let Some(home) = env_path("HOME") {
        return home.join(".cache").join("authui");
    }
    std::env::temp_dir().join("authui-cache")
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
