//! Tracing setup for the dashboard binaries.
//!
//! Reads `DASHBOARD_OBSERVABILITY` (on/off), `DASHBOARD_LOG_LEVEL` (filter,
//! falling back to `RUST_LOG`, then `info`) and `DASHBOARD_JSON_LOG_PATH`
//! (JSONL file instead of the stderr console). A verbosity count from the
//! command line overrides the filter.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "info";
const DEFAULT_JSON_LOG_FILE: &str = "dashboard.logs.jsonl";

/// Where log lines go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogOutput {
    /// Compact lines on stderr; stdout stays free for command output.
    Console,
    /// JSON lines appended to a file.
    JsonFile(PathBuf),
}

impl LogOutput {
    fn from_path(path: Option<String>) -> Self {
        match path.map(|raw| raw.trim().to_string()) {
            Some(raw) if !raw.is_empty() => LogOutput::JsonFile(PathBuf::from(raw)),
            _ => LogOutput::Console,
        }
    }
}

/// Logging settings resolved before the subscriber is installed.
#[derive(Clone, Debug)]
pub struct ObservabilityConfig {
    pub enabled: bool,
    /// `EnvFilter` directives.
    pub filter: String,
    pub output: LogOutput,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        let enabled = std::env::var("DASHBOARD_OBSERVABILITY")
            .ok()
            .and_then(|value| parse_bool_env(&value))
            .unwrap_or(true);
        let filter = ["DASHBOARD_LOG_LEVEL", "RUST_LOG"]
            .into_iter()
            .filter_map(|key| std::env::var(key).ok())
            .find(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        Self {
            enabled,
            filter,
            output: LogOutput::from_path(std::env::var("DASHBOARD_JSON_LOG_PATH").ok()),
        }
    }

    /// Raises the filter for `-v` (client crates at debug) and `-vv`
    /// (everything at debug, client crates at trace). Zero keeps it.
    pub fn verbosity(mut self, count: u8) -> Self {
        if let Some(directives) = verbosity_directives(count) {
            self.filter = directives.to_string();
        }
        self
    }
}

fn verbosity_directives(count: u8) -> Option<&'static str> {
    match count {
        0 => None,
        1 => Some("info,dashboard_core=debug,dashboard=debug"),
        _ => Some("debug,dashboard_core=trace,dashboard=trace"),
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|err| {
        eprintln!("ignoring invalid log filter {directives:?}: {err}");
        EnvFilter::new(DEFAULT_FILTER)
    })
}

/// Splits a log path into the directory to create and the file name.
fn json_log_target(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_JSON_LOG_FILE)
        .to_string();
    (dir, file_name)
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_observability(config: &ObservabilityConfig) {
    INIT.get_or_init(|| {
        if !config.enabled {
            return;
        }
        let filter = env_filter(&config.filter);
        match &config.output {
            LogOutput::JsonFile(path) => {
                let (dir, file_name) = json_log_target(path);
                if let Err(err) = std::fs::create_dir_all(&dir) {
                    eprintln!("cannot create log directory {}: {err}", dir.display());
                }
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
            LogOutput::Console => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
        }
    });
}

/// Span carrying the session and thread ids; every log line emitted while a
/// session command runs inside it is tagged with both.
pub fn session_span(session_id: uuid::Uuid, thread_id: Option<&str>) -> tracing::Span {
    tracing::info_span!(
        "session",
        session_id = %session_id,
        thread_id = thread_id.unwrap_or("-"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_flags_accept_common_spellings() {
        assert_eq!(parse_bool_env(" Off "), Some(false));
        assert_eq!(parse_bool_env("enabled"), Some(true));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn verbosity_overrides_the_filter() {
        let config = ObservabilityConfig {
            enabled: true,
            filter: "warn".into(),
            output: LogOutput::Console,
        };
        assert_eq!(config.clone().verbosity(0).filter, "warn");
        assert_eq!(
            config.clone().verbosity(1).filter,
            "info,dashboard_core=debug,dashboard=debug"
        );
        assert!(config.verbosity(5).filter.contains("dashboard_core=trace"));
    }

    #[test]
    fn blank_log_path_means_console() {
        assert_eq!(LogOutput::from_path(Some("  ".into())), LogOutput::Console);
        assert_eq!(LogOutput::from_path(None), LogOutput::Console);
        assert_eq!(
            LogOutput::from_path(Some("logs/run.jsonl".into())),
            LogOutput::JsonFile(PathBuf::from("logs/run.jsonl"))
        );
    }

    #[test]
    fn bare_file_name_logs_to_current_directory() {
        assert_eq!(
            json_log_target(Path::new("run.jsonl")),
            (PathBuf::from("."), "run.jsonl".to_string())
        );
        assert_eq!(
            json_log_target(Path::new("/var/log/dashboard/run.jsonl")),
            (PathBuf::from("/var/log/dashboard"), "run.jsonl".to_string())
        );
    }
}
