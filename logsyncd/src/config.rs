use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub registry: RegistryConfig,
    /// Namespace holding the cluster-wide catalog document.
    #[serde(default = "default_global_namespace")]
    pub global_namespace: String,
    /// Directory the daemon loads per-workload config files from.
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    #[serde(default = "default_pos_dir")]
    pub pos_dir: PathBuf,
    /// Root of the log files the daemon tails.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Base URL of the wrapper's control endpoint.
    #[serde(default = "default_notify_url")]
    pub notify_url: String,
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    #[serde(default = "default_resync_secs")]
    pub resync_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    pub endpoints: Vec<String>,
}

fn default_global_namespace() -> String {
    "logship-global".to_string()
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/fluentd/etc/config.d")
}

fn default_pos_dir() -> PathBuf {
    PathBuf::from("/fluentd/pos")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/workloads")
}

fn default_notify_url() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_debounce_secs() -> u64 {
    4
}

fn default_resync_secs() -> u64 {
    2
}

pub fn load_config(path: &str) -> Result<Settings> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config from {path}"))?;
    let cfg: Settings = serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}
