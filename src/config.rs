use std::sync::Arc;
use std::{env, fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: Arc<str>,
    pub api_token: Arc<str>,
    pub reconcile_interval_secs: u64,
    pub summary_interval_secs: u64,
    pub max_in_flight: usize,
    pub event_buffer: usize,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    api_url: String,
    #[serde(default)]
    api_token: String,
    #[serde(default = "default_reconcile_interval_secs")]
    reconcile_interval_secs: u64,
    #[serde(default = "default_summary_interval_secs")]
    summary_interval_secs: u64,
    #[serde(default = "default_max_in_flight")]
    max_in_flight: usize,
    #[serde(default = "default_event_buffer")]
    event_buffer: usize,
    #[serde(default = "default_http_timeout_secs")]
    http_timeout_secs: u64,
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        Self {
            api_url: raw.api_url.trim().into(),
            api_token: raw.api_token.trim().into(),
            reconcile_interval_secs: raw.reconcile_interval_secs,
            summary_interval_secs: raw.summary_interval_secs,
            max_in_flight: raw.max_in_flight,
            event_buffer: raw.event_buffer,
            http_timeout_secs: raw.http_timeout_secs,
        }
    }
}

impl Config {
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut cfg = if let Some(path) = path {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            Config::from(toml::from_str::<RawConfig>(&raw).context("parsing config")?)
        } else {
            let default_path = default_config_path();
            if default_path.exists() {
                let raw = fs::read_to_string(&default_path).context("reading default config")?;
                Config::from(toml::from_str::<RawConfig>(&raw).context("parsing config")?)
            } else {
                Self::default_from_env()?
            }
        };

        if let Ok(v) = env::var("CF_API_URL") {
            cfg.api_url = v.trim().into();
        }
        if let Ok(v) = env::var("CF_API_TOKEN") {
            cfg.api_token = v.trim().into();
        }
        maybe_env_u64(&mut cfg.reconcile_interval_secs, "RECONCILE_INTERVAL_SECS");
        maybe_env_u64(&mut cfg.summary_interval_secs, "SUMMARY_INTERVAL_SECS");
        maybe_env_usize(&mut cfg.max_in_flight, "MAX_IN_FLIGHT");
        maybe_env_usize(&mut cfg.event_buffer, "EVENT_BUFFER");
        maybe_env_u64(&mut cfg.http_timeout_secs, "HTTP_TIMEOUT_SECS");
        validate_required(&cfg)?;
        Ok(cfg)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_secs)
    }
}

impl Config {
    fn default_from_env() -> Result<Self> {
        Ok(Self {
            api_url: env_required("CF_API_URL")?.trim().into(),
            api_token: env::var("CF_API_TOKEN").unwrap_or_default().trim().into(),
            reconcile_interval_secs: env_u64(
                "RECONCILE_INTERVAL_SECS",
                default_reconcile_interval_secs(),
            ),
            summary_interval_secs: env_u64(
                "SUMMARY_INTERVAL_SECS",
                default_summary_interval_secs(),
            ),
            max_in_flight: env_usize("MAX_IN_FLIGHT", default_max_in_flight()),
            event_buffer: env_usize("EVENT_BUFFER", default_event_buffer()),
            http_timeout_secs: env_u64("HTTP_TIMEOUT_SECS", default_http_timeout_secs()),
        })
    }
}

fn default_reconcile_interval_secs() -> u64 {
    300
}

fn default_summary_interval_secs() -> u64 {
    60
}

fn default_max_in_flight() -> usize {
    64
}

fn default_event_buffer() -> usize {
    10_000
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_config_path() -> PathBuf {
    ProjectDirs::from("com", "appmetrics", "appmetrics")
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".appmetrics"))
        .join("config.toml")
}

fn validate_required(cfg: &Config) -> Result<()> {
    if cfg.api_url.is_empty() {
        anyhow::bail!("CF_API_URL is required (set via env or config)");
    }
    if !(cfg.api_url.starts_with("http://") || cfg.api_url.starts_with("https://")) {
        anyhow::bail!("CF_API_URL must be an http(s) URL, got {}", cfg.api_url);
    }
    if cfg.reconcile_interval_secs == 0 {
        anyhow::bail!("RECONCILE_INTERVAL_SECS must be > 0");
    }
    if cfg.summary_interval_secs == 0 {
        anyhow::bail!("SUMMARY_INTERVAL_SECS must be > 0");
    }
    if cfg.max_in_flight == 0 {
        anyhow::bail!("MAX_IN_FLIGHT must be > 0");
    }
    if cfg.event_buffer == 0 {
        anyhow::bail!("EVENT_BUFFER must be > 0");
    }
    Ok(())
}

fn maybe_env_usize(val: &mut usize, key: &str) {
    if let Ok(v) = env::var(key) {
        if let Ok(n) = v.parse::<usize>() {
            *val = n;
        }
    }
}

fn maybe_env_u64(val: &mut u64, key: &str) {
    if let Ok(v) = env::var(key) {
        if let Ok(n) = v.parse::<u64>() {
            *val = n;
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_required(key: &str) -> Result<String> {
    let val = env::var(key).unwrap_or_default();
    if val.trim().is_empty() {
        anyhow::bail!("{key} is required");
    }
    Ok(val)
}
