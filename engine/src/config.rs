use serde::{Deserialize, Serialize};

pub const DEFAULT_CONTRACT_ADDRESS: &str = "0xb96CDC6f427739ad422BD2c5730dE652F6C0F9B4";

fn default_receipt_poll_ms() -> u64 {
    500
}

fn default_receipt_timeout_ms() -> u64 {
    120_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub contract_address: String,
    pub timeout_ms: u64,
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_event_poll_ms() -> u64 {
    2_000
}

fn default_fetch_concurrency() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_event_poll_ms")]
    pub event_poll_ms: u64,
    /// 1 reads auctions one by one; larger values bound concurrent reads.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default)]
    pub dashboard: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub ledger: LedgerConfig,
    pub sync: SyncConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            event_poll_ms: default_event_poll_ms(),
            fetch_concurrency: default_fetch_concurrency(),
            dashboard: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig {
                rpc_url: "http://localhost:7545".to_string(),
                contract_address: DEFAULT_CONTRACT_ADDRESS.to_string(),
                timeout_ms: 10_000,
                receipt_poll_ms: default_receipt_poll_ms(),
                receipt_timeout_ms: default_receipt_timeout_ms(),
            },
            sync: SyncConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_section_fills_defaults() {
        let cfg: EngineConfig = serde_json::from_value(serde_json::json!({
            "ledger": {
                "rpc_url": "http://127.0.0.1:8545",
                "contract_address": DEFAULT_CONTRACT_ADDRESS,
                "timeout_ms": 5000
            },
            "sync": {}
        }))
        .unwrap();
        assert_eq!(cfg.sync.tick_interval_ms, 1_000);
        assert_eq!(cfg.sync.fetch_concurrency, 1);
        assert_eq!(cfg.ledger.receipt_poll_ms, 500);
        assert!(!cfg.sync.dashboard);
    }
}
