use crate::config::LedgerConfig;
use anyhow::{Context, Result};
use engine_core::{LedgerError, LedgerResult};
use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec, Registry};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE},
    Client, ClientBuilder,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// JSON-RPC 2.0 client over a pooled HTTP connection.
#[derive(Clone)]
pub struct RpcClient {
    client: Client,
    url: Url,
    next_id: Arc<AtomicU64>,
    metrics: Arc<RpcMetrics>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

impl RpcClient {
    pub fn new(cfg: &LedgerConfig, registry: &Registry) -> Result<Self> {
        let client = ClientBuilder::new()
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(8)
            .connect_timeout(Duration::from_millis(cfg.timeout_ms))
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .default_headers(Self::default_headers())
            .build()
            .context("build reqwest client")?;
        let url = Url::parse(&cfg.rpc_url)
            .with_context(|| format!("parse rpc url {}", cfg.rpc_url))?;
        Ok(Self {
            client,
            url,
            next_id: Arc::new(AtomicU64::new(1)),
            metrics: Arc::new(RpcMetrics::new(registry).context("register rpc metrics")?),
        })
    }

    fn default_headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(ACCEPT, HeaderValue::from_static("application/json"));
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> LedgerResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let start = Instant::now();
        self.metrics.inflight.with_label_values(&[method]).inc();
        self.metrics.req_total.with_label_values(&[method]).inc();
        let sent = self.client.post(self.url.clone()).json(&body).send().await;
        let outcome = match sent {
            Ok(resp) => resp
                .json::<RpcResponse>()
                .await
                .map_err(|e| LedgerError::Malformed(format!("{method} reply: {e}"))),
            Err(e) => Err(LedgerError::Transport(format!("{method}: {e}"))),
        };
        let dur = start.elapsed().as_secs_f64();
        self.metrics.inflight.with_label_values(&[method]).dec();
        self.metrics
            .latency
            .with_label_values(&[method])
            .observe(dur);
        tracing::debug!(target: "ledger", method=%method, id=%id, latency_ms=%((dur * 1000.0) as u64), "rpc call completed");

        let reply = match outcome {
            Ok(reply) => reply,
            Err(err) => {
                self.metrics.fail_total.with_label_values(&[method]).inc();
                return Err(err);
            }
        };
        if let Some(err) = reply.error {
            self.metrics.fail_total.with_label_values(&[method]).inc();
            let message = match err.data.as_ref().and_then(revert_data_reason) {
                Some(reason) if !err.message.contains(&reason) => {
                    format!("{} {}", err.message, reason)
                }
                _ => err.message,
            };
            return Err(LedgerError::Rpc {
                code: err.code,
                message,
            });
        }
        serde_json::from_value(reply.result.unwrap_or(Value::Null))
            .map_err(|e| LedgerError::Malformed(format!("{method} result: {e}")))
    }
}

/// Some nodes put the revert reason in `error.data.reason` or in a per-tx map.
fn revert_data_reason(data: &Value) -> Option<String> {
    if let Some(reason) = data.get("reason").and_then(Value::as_str) {
        return Some(reason.to_string());
    }
    data.as_object()?
        .values()
        .find_map(|v| v.get("reason").and_then(Value::as_str))
        .map(str::to_string)
}

#[derive(Clone)]
struct RpcMetrics {
    req_total: IntCounterVec,
    fail_total: IntCounterVec,
    inflight: IntGaugeVec,
    latency: HistogramVec,
}

impl RpcMetrics {
    fn new(registry: &Registry) -> prometheus::Result<Self> {
        let req_total = IntCounterVec::new(
            prometheus::Opts::new("ledger_rpc_requests_total", "Ledger RPC requests total"),
            &["method"],
        )?;
        let fail_total = IntCounterVec::new(
            prometheus::Opts::new("ledger_rpc_failures_total", "Ledger RPC failures total"),
            &["method"],
        )?;
        let inflight = IntGaugeVec::new(
            prometheus::Opts::new("ledger_rpc_inflight", "Ledger RPC inflight requests"),
            &["method"],
        )?;
        let latency = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "ledger_rpc_latency_seconds",
                "Ledger RPC latency seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["method"],
        )?;
        registry.register(Box::new(req_total.clone())).ok();
        registry.register(Box::new(fail_total.clone())).ok();
        registry.register(Box::new(inflight.clone())).ok();
        registry.register(Box::new(latency.clone())).ok();
        Ok(Self {
            req_total,
            fail_total,
            inflight,
            latency,
        })
    }
}
