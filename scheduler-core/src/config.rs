//! Process-wide configuration, read once at `start()` and never re-read
//! (spec.md §9: "Do not rely on dynamic re-read").

use std::collections::HashMap;
use std::env;
use std::time::Duration;

const DEFAULT_ASK_TIMEOUT_SECS: u64 = 10;

/// An immutable snapshot of `<prefix>_*` environment variables, taken once.
#[derive(Debug, Clone)]
pub struct Config {
    pub ask_timeout: Duration,
    pub default_parallelism_override: Option<u32>,
    /// Every recognized `<prefix>_*` variable except `AKKA_ASK_TIMEOUT_SECS`,
    /// `DEFAULT_PARALLELISM`, and `HOST_PORT` — forwarded verbatim to each
    /// registering executor.
    pub properties: HashMap<String, String>,
}

impl Config {
    /// Snapshot all environment variables whose names begin with
    /// `<prefix>_`, excluding `<prefix>_HOST_PORT` from the properties
    /// forwarded to executors (spec.md §6).
    pub fn from_env(prefix: &str) -> Self {
        let full_prefix = format!("{}_", prefix.to_uppercase());
        let mut properties = HashMap::new();
        let mut ask_timeout = Duration::from_secs(DEFAULT_ASK_TIMEOUT_SECS);
        let mut default_parallelism_override = None;

        for (key, value) in env::vars() {
            let Some(suffix) = key.strip_prefix(&full_prefix) else {
                continue;
            };
            match suffix {
                "AKKA_ASK_TIMEOUT_SECS" => {
                    if let Ok(secs) = value.parse::<u64>() {
                        ask_timeout = Duration::from_secs(secs);
                    }
                }
                "DEFAULT_PARALLELISM" => {
                    default_parallelism_override = value.parse::<u32>().ok();
                }
                "HOST_PORT" => {
                    // Explicitly excluded from the snapshot forwarded to executors.
                }
                other => {
                    properties.insert(other.to_string(), value);
                }
            }
        }

        Config { ask_timeout, default_parallelism_override, properties }
    }

    /// A default configuration with no environment snapshot, for tests that
    /// don't exercise `Config::from_env` itself.
    pub fn for_test() -> Self {
        Config {
            ask_timeout: Duration::from_secs(DEFAULT_ASK_TIMEOUT_SECS),
            default_parallelism_override: None,
            properties: HashMap::new(),
        }
    }
}
