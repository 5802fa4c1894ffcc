//! fleetscale.toml daemon configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub listen_port: u16,
    pub data_dir: PathBuf,
    /// How often every autoscaler is reconciled, e.g. `"30s"`.
    pub sync_interval: String,
    /// Upper bound on a single webhook policy call.
    pub webhook_timeout: String,
    pub max_concurrent_syncs: usize,
    pub log_format: LogFormat,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_port: 8443,
            data_dir: PathBuf::from("/var/lib/fleetscale"),
            sync_interval: "30s".to_string(),
            webhook_timeout: "10s".to_string(),
            max_concurrent_syncs: 4,
            log_format: LogFormat::Text,
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: DaemonConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.check()?;
        Ok(config)
    }

    /// Load `path` if given and present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) if p.exists() => Self::from_file(p),
            _ => Ok(Self::default()),
        }
    }

    pub fn sync_interval(&self) -> anyhow::Result<Duration> {
        positive_duration("sync_interval", &self.sync_interval)
    }

    pub fn webhook_timeout(&self) -> anyhow::Result<Duration> {
        positive_duration("webhook_timeout", &self.webhook_timeout)
    }

    fn check(&self) -> anyhow::Result<()> {
        self.sync_interval()?;
        self.webhook_timeout()?;
        if self.max_concurrent_syncs == 0 {
            bail!("max_concurrent_syncs must be at least 1");
        }
        Ok(())
    }
}

fn positive_duration(field: &str, raw: &str) -> anyhow::Result<Duration> {
    match parse_duration(raw) {
        Some(d) if !d.is_zero() => Ok(d),
        Some(_) => bail!("{field} must be greater than zero"),
        None => bail!("{field}: invalid duration {raw:?} (expected e.g. \"500ms\", \"30s\", \"2m\")"),
    }
}

/// Parse a duration string like "5s", "500ms", "1m". A bare number is seconds.
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
