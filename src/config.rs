use std::path::PathBuf;
use std::time::Duration;

use crate::gateway::heartbeat::{
    HeartbeatConfig, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_JOIN_TIMEOUT,
};
use crate::models::execution::DEFAULT_HISTORY_CAPACITY;
use crate::snippets::StarterSnippets;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_SESSION_IDLE_SECS: u64 = 3600;
const DEFAULT_SESSION_SWEEP_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub heartbeat: HeartbeatConfig,
    /// Sessions without connections are evicted after this long idle.
    /// `None` keeps them for the process lifetime.
    pub session_idle_ttl: Option<Duration>,
    pub session_sweep_interval: Duration,
    pub execution_history: usize,
    pub snippets_dir: Option<PathBuf>,
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_u64(key)
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let session_idle_ttl = match env_u64("CODECOLLAB_SESSION_IDLE_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(DEFAULT_SESSION_IDLE_SECS)),
        };

        Self {
            host: std::env::var("CODECOLLAB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            heartbeat: HeartbeatConfig {
                interval: env_secs(
                    "CODECOLLAB_HEARTBEAT_INTERVAL_SECS",
                    DEFAULT_HEARTBEAT_INTERVAL,
                ),
                timeout: env_secs("CODECOLLAB_HEARTBEAT_TIMEOUT_SECS", DEFAULT_HEARTBEAT_TIMEOUT),
                join_timeout: env_secs("CODECOLLAB_JOIN_TIMEOUT_SECS", DEFAULT_JOIN_TIMEOUT),
            },
            session_idle_ttl,
            session_sweep_interval: env_secs(
                "CODECOLLAB_SESSION_SWEEP_SECS",
                Duration::from_secs(DEFAULT_SESSION_SWEEP_SECS),
            ),
            execution_history: env_u64("CODECOLLAB_EXECUTION_HISTORY")
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_HISTORY_CAPACITY),
            snippets_dir: std::env::var("CODECOLLAB_SNIPPETS_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn snippets(&self) -> StarterSnippets {
        match &self.snippets_dir {
            Some(dir) => StarterSnippets::from_dir(dir),
            None => StarterSnippets::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            heartbeat: HeartbeatConfig::default(),
            session_idle_ttl: Some(Duration::from_secs(DEFAULT_SESSION_IDLE_SECS)),
            session_sweep_interval: Duration::from_secs(DEFAULT_SESSION_SWEEP_SECS),
            execution_history: DEFAULT_HISTORY_CAPACITY,
            snippets_dir: None,
        }
    }
}
