//! Dispatcher and transport configuration.
//!
//! Both configs have working defaults; `from_env` overrides individual fields
//! from `COURIER_*` variables and keeps the default for anything unset or
//! unparsable.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::codec::KeyCasing;

const WORKER_THREADS_VAR: &str = "COURIER_WORKER_THREADS";
const WIRE_CASING_VAR: &str = "COURIER_WIRE_CASING";
const TIMEOUT_VAR: &str = "COURIER_TIMEOUT_SECS";
const TEMP_DIR_VAR: &str = "COURIER_TEMP_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Threads in the owned worker pool that builds and submits requests.
    pub worker_threads: usize,
    /// Name of the thread that runs completions when the dispatcher owns the
    /// completion context.
    pub completion_thread_name: String,
    /// Wire key casing used by `send_json` and `PostRequest` bodies built
    /// through the dispatcher's codec.
    pub wire_casing: KeyCasing,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            completion_thread_name: "courier-completion".to_string(),
            wire_casing: KeyCasing::AsIs,
        }
    }
}

impl DispatcherConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(threads) = env_parse::<usize>(WORKER_THREADS_VAR).filter(|n| *n > 0) {
            config.worker_threads = threads;
        }
        if let Some(casing) = env_parse::<KeyCasing>(WIRE_CASING_VAR) {
            config.wire_casing = casing;
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Upper bound on a whole exchange, body included. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Where download bodies are staged. `None` uses the system temp dir.
    pub temp_dir: Option<PathBuf>,
    /// Body read granularity; cancellation is checked between chunks.
    pub read_chunk_size: usize,
    /// Redirect limit for requests that follow redirects.
    pub max_redirects: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(60)),
            temp_dir: None,
            read_chunk_size: 16 * 1024,
            max_redirects: 10,
        }
    }
}

impl TransportConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_parse::<u64>(TIMEOUT_VAR) {
            config.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(dir) = std::env::var_os(TEMP_DIR_VAR).filter(|d| !d.is_empty()) {
            config.temp_dir = Some(PathBuf::from(dir));
        }
        config
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(target: "courier", variable = name, value = %raw, "ignoring invalid configuration value");
            None
        }
    }
}
