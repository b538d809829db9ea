use super::*;

const VARS: &[&str] = &[
    "AUTHUI_SOCKET",
    "AUTHUI_CACHE_DIR",
    "AUTHUI_DAEMON_TIMEOUT",
    "AUTHUI_BROWSER_MODE",
    "AUTHUI_BROWSER_HELPER",
    "AUTHUI_DESKTOP_FILE",
    "AUTHUI_HELPER_SHUTDOWN_SECS",
    "AUTHUI_DIALOG_COMMAND",
    "AUTHUI_NOTIFY_COMMAND",
    "AUTHUI_ACCOUNTS_FILE",
    "AUTHUI_INDICATOR",
    "AUTHUI_LOGGING_LEVEL",
];

/// # Safety
/// Tests must run with `--test-threads=1` to avoid env races.
unsafe fn clear_authui_env() {
    for var in VARS {
        unsafe { std::env::remove_var(var) };
    }
}

// One test touches the environment so parallel runs stay deterministic.
#[test]
fn from_env_defaults_and_overrides() {
    unsafe {
        clear_authui_env();
        std::env::set_var("XDG_RUNTIME_DIR", "/run/user/1000");
        std::env::set_var("XDG_CACHE_HOME", "/home/u/.cache");
    }

    let cfg = Config::from_env().expect("defaults");
    assert_eq!(cfg.socket_path, PathBuf::from("/run/user/1000/authui.sock"));
    assert_eq!(cfg.cache_dir, PathBuf::from("/home/u/.cache/authui"));
    assert_eq!(cfg.idle_timeout, Some(Duration::from_secs(DEFAULT_DAEMON_TIMEOUT_SECS)));
    assert_eq!(cfg.browser_mode, BrowserMode::Remote);
    assert_eq!(cfg.helper.program, PathBuf::from(DEFAULT_HELPER_PROGRAM));
    assert_eq!(cfg.helper.shutdown_timeout, Duration::from_secs(DEFAULT_HELPER_SHUTDOWN_SECS));
    assert_eq!(cfg.dialog_command, DEFAULT_DIALOG_COMMAND);
    assert!(cfg.accounts_file.is_none());
    assert!(cfg.indicator_enabled);
    assert_eq!(log_filter(), "warn");

    unsafe {
        std::env::set_var("AUTHUI_SOCKET", "/tmp/test.sock");
        std::env::set_var("AUTHUI_CACHE_DIR", "/var/cache/authui");
        std::env::set_var("AUTHUI_DAEMON_TIMEOUT", "0");
        std::env::set_var("AUTHUI_BROWSER_MODE", "in-process");
        std::env::set_var("AUTHUI_HELPER_SHUTDOWN_SECS", "not-a-number");
        std::env::set_var("AUTHUI_ACCOUNTS_FILE", "/etc/authui/accounts.json");
        std::env::set_var("AUTHUI_INDICATOR", "0");
        std::env::set_var("AUTHUI_LOGGING_LEVEL", "2");
    }

    let cfg = Config::from_env().expect("overrides");
    assert_eq!(cfg.socket_path, PathBuf::from("/tmp/test.sock"));
    assert_eq!(cfg.cache_dir, PathBuf::from("/var/cache/authui"));
    assert_eq!(cfg.idle_timeout, None);
    assert_eq!(cfg.browser_mode, BrowserMode::InProcess);
    assert_eq!(cfg.helper.shutdown_timeout, Duration::from_secs(DEFAULT_HELPER_SHUTDOWN_SECS));
    assert_eq!(cfg.accounts_file, Some(PathBuf::from("/etc/authui/accounts.json")));
    assert!(!cfg.indicator_enabled);
    assert_eq!(log_filter(), "debug");

    unsafe {
        std::env::set_var("AUTHUI_BROWSER_MODE", "webkit");
        std::env::set_var("AUTHUI_LOGGING_LEVEL", "0");
    }
    assert!(matches!(Config::from_env(), Err(ConfigError::InvalidBrowserMode(m)) if m == "webkit"));
    assert_eq!(log_filter(), "error");

    unsafe { clear_authui_env() };
}

#[test]
fn browser_mode_parsing() {
    assert_eq!(parse_browser_mode(None).expect("default"), BrowserMode::Remote);
    assert_eq!(parse_browser_mode(Some("remote")).expect("remote"), BrowserMode::Remote);
    assert_eq!(parse_browser_mode(Some("in-process")).expect("in-process"), BrowserMode::InProcess);
    assert!(parse_browser_mode(Some("Remote")).is_err());
}
