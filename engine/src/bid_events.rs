use crate::rpc::RpcClient;
use crate::rpc_ledger::{quantity_u64, NewBid};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use engine_core::{BidEvent, BidStream, LedgerResult};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcLog {
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default)]
    pub block_number: Option<U256>,
}

/// Decodes a `NewBid` log whether or not the contract indexes its fields.
pub(crate) fn decode_new_bid(log: &RpcLog) -> Option<BidEvent> {
    if log.topics.first() != Some(&NewBid::SIGNATURE_HASH) {
        return None;
    }
    let word = |i: usize| -> Option<B256> {
        let chunk = log.data.get(i * 32..(i + 1) * 32)?;
        Some(B256::from_slice(chunk))
    };
    let indexed = &log.topics[1..];
    let mut words: Vec<B256> = indexed.to_vec();
    let mut i = 0;
    while words.len() < 3 {
        words.push(word(i)?);
        i += 1;
    }
    let auction_id = quantity_u64(U256::from_be_bytes(words[0].0), "auction id").ok()?;
    let bidder = Address::from_word(words[1]);
    let amount = U256::from_be_bytes(words[2].0);
    let block_number = log
        .block_number
        .and_then(|b| quantity_u64(b, "block number").ok());
    Some(BidEvent {
        auction_id,
        bidder,
        amount,
        block_number,
    })
}

/// Polls `eth_getLogs` for `NewBid` events and hands them out one by one.
#[derive(Clone)]
pub struct BidLogPoller {
    rpc: RpcClient,
    contract: Address,
    interval: Duration,
    tx: mpsc::Sender<BidEvent>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<BidEvent>>>,
    _bg: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl BidLogPoller {
    pub fn new(rpc: RpcClient, contract: Address, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(1_000);
        Self {
            rpc,
            contract,
            interval,
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            _bg: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub async fn close(&self) {
        if let Some(h) = self._bg.lock().await.take() {
            h.abort();
        }
    }

    async fn block_number(rpc: &RpcClient) -> LedgerResult<u64> {
        let n: U256 = rpc.call("eth_blockNumber", json!([])).await?;
        quantity_u64(n, "block number")
    }
}

#[async_trait]
impl BidStream for BidLogPoller {
    async fn connect(&self) -> LedgerResult<()> {
        if let Some(h) = self._bg.lock().await.take() {
            h.abort();
        }
        // Only bids placed after connecting are of interest.
        let start = Self::block_number(&self.rpc).await? + 1;

        let rpc = self.rpc.clone();
        let contract = self.contract;
        let interval = self.interval;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let mut from_block = start;
            let mut backoff = interval;
            let max_backoff = Duration::from_secs(30);
            tracing::info!(target: "bid_events", contract=%contract, from_block, "polling NewBid logs");
            loop {
                sleep(backoff).await;
                let head = match Self::block_number(&rpc).await {
                    Ok(head) => head,
                    Err(e) => {
                        tracing::warn!(target: "bid_events", "block number failed: {}", e);
                        backoff = (backoff * 2).min(max_backoff);
                        continue;
                    }
                };
                if head < from_block {
                    backoff = interval;
                    continue;
                }
                let filter = json!([{
                    "address": contract,
                    "fromBlock": format!("{:#x}", from_block),
                    "toBlock": format!("{:#x}", head),
                    "topics": [NewBid::SIGNATURE_HASH],
                }]);
                match rpc.call::<Vec<RpcLog>>("eth_getLogs", filter).await {
                    Ok(logs) => {
                        for log in &logs {
                            match decode_new_bid(log) {
                                Some(ev) => {
                                    if tx.send(ev).await.is_err() {
                                        return;
                                    }
                                }
                                None => {
                                    tracing::debug!(target: "bid_events", "skipping undecodable log")
                                }
                            }
                        }
                        from_block = head + 1;
                        backoff = interval;
                    }
                    Err(e) => {
                        tracing::warn!(target: "bid_events", "get logs failed: {}", e);
                        backoff = (backoff * 2).min(max_backoff);
                    }
                }
            }
        });
        *self._bg.lock().await = Some(handle);
        Ok(())
    }

    async fn next(&self) -> LedgerResult<Option<BidEvent>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }
}
