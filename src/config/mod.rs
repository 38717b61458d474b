use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

const DEFAULT_PORT: u16 = 4310;
const DEFAULT_MAX_PARTICIPANTS: usize = 2;
const DEFAULT_MESSAGE_PAGE_LIMIT: i64 = 50;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

/// Daemon configuration, resolved once at startup.
///
/// `max_participants_per_thread` is the fixed thread size N: every thread
/// has exactly this many participants, and the resolver rejects any request
/// whose participant set is a different size. It is process-wide and never
/// mutated at runtime.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub port: u16,
    pub bind_address: String,
    pub data_dir: PathBuf,
    pub log: String,
    /// `"pretty"` (default) or `"json"`.
    pub log_format: String,
    pub max_participants_per_thread: usize,
    /// Default and maximum page size for message listing.
    pub message_page_limit: i64,
    /// Slow-query log threshold in milliseconds (0 = disabled).
    pub slow_query_ms: u64,
}

/// Optional overrides read from `{data_dir}/config.toml`.
#[derive(Debug, Default, Deserialize, Serialize)]
struct TomlConfig {
    port: Option<u16>,
    bind_address: Option<String>,
    log: Option<String>,
    log_format: Option<String>,
    max_participants_per_thread: Option<usize>,
    message_page_limit: Option<i64>,
    slow_query_ms: Option<u64>,
}

impl DaemonConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
        max_participants: Option<usize>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let bind_address = bind_address
            .or(std::env::var("COURIERD_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let log_format = std::env::var("COURIERD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let max_participants_per_thread = max_participants
            .or(toml.max_participants_per_thread)
            .unwrap_or(DEFAULT_MAX_PARTICIPANTS)
            .max(2);

        let message_page_limit = toml
            .message_page_limit
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MESSAGE_PAGE_LIMIT);

        let slow_query_ms = toml.slow_query_ms.unwrap_or(0);

        Self {
            port,
            bind_address,
            data_dir,
            log,
            log_format,
            max_participants_per_thread,
            message_page_limit,
            slow_query_ms,
        }
    }
}

fn load_toml(data_dir: &std::path::Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let raw = std::fs::read_to_string(&path).ok()?;
    match toml::from_str(&raw) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!(path = %path.display(), "ignoring malformed config.toml: {e}");
            None
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/courierd
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("courierd");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/courierd or ~/.local/share/courierd
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("courierd");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("courierd");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\courierd
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("courierd");
        }
    }
    // Fallback
    PathBuf::from(".courierd")
}
