use std::{env, path::Path};

use anyhow::{anyhow, Context, Result};
use engine::config::EngineConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::info;

pub const RPC_URL_ENV: &str = "AUCTION_RPC_URL";
pub const CONTRACT_ENV: &str = "AUCTION_CONTRACT";

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Act as the ledger's first account with the admin view.
    #[serde(default)]
    pub admin: bool,
    /// Participant address; ignored in admin mode.
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub engine: EngineConfig,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
    #[serde(default)]
    pub viewer: ViewerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            metrics_addr: default_metrics_addr(),
            viewer: ViewerConfig::default(),
        }
    }
}

/// Reads a JSON config, fills missing keys from the defaults, then applies
/// environment overrides.
pub async fn load_config(config_path: &Path) -> Result<AppConfig> {
    let raw = fs::read(config_path)
        .await
        .with_context(|| format!("read config file: {}", config_path.display()))?;
    let disk_cfg: Value = serde_json::from_slice(&raw).context("parse config json")?;
    let mut cfg = merge_with_defaults(disk_cfg)?;
    apply_overrides(&mut cfg, env::var(RPC_URL_ENV).ok(), env::var(CONTRACT_ENV).ok());
    info!("loaded config: {}", config_path.display());
    Ok(cfg)
}

/// Defaults plus environment overrides, for runs without a config file.
pub fn default_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    apply_overrides(&mut cfg, env::var(RPC_URL_ENV).ok(), env::var(CONTRACT_ENV).ok());
    cfg
}

pub fn merge_with_defaults(disk_cfg: Value) -> Result<AppConfig> {
    if !disk_cfg.is_object() {
        return Err(anyhow!("config root must be a JSON object"));
    }
    let mut merged = serde_json::to_value(AppConfig::default()).context("encode defaults")?;
    merge_json(&mut merged, disk_cfg);
    serde_json::from_value(merged).context("decode config")
}

fn merge_json(base: &mut Value, over: Value) {
    match (base, over) {
        (Value::Object(base), Value::Object(over)) => {
            for (key, value) in over {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

pub fn apply_overrides(cfg: &mut AppConfig, rpc_url: Option<String>, contract: Option<String>) {
    if let Some(url) = rpc_url.filter(|s| !s.trim().is_empty()) {
        info!("{} overrides ledger.rpc_url", RPC_URL_ENV);
        cfg.engine.ledger.rpc_url = url;
    }
    if let Some(addr) = contract.filter(|s| !s.trim().is_empty()) {
        info!("{} overrides ledger.contract_address", CONTRACT_ENV);
        cfg.engine.ledger.contract_address = addr;
    }
}
