use crate::{config::LedgerConfig, rpc::RpcClient};
use alloy_primitives::{hex::encode_prefixed, Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall};
use anyhow::{Context, Result};
use async_trait::async_trait;
use engine_core::{
    AccountDirectory, Auction, AuctionId, AuctionReader, AuctionWriter, CreateAuctionRequest,
    LedgerError, LedgerResult,
};
use prometheus::Registry;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};

sol! {
    function auctionCount() external view returns (uint256);
    function auctions(uint256 id) external view returns (
        string itemName,
        string imageUrl,
        address seller,
        uint256 endTime,
        uint256 highestBid,
        address highestBidder,
        bool ended
    );
    function admin() external view returns (address);
    function getUserWonAuctions(address user) external view returns (uint256[] memory);
    function createAuction(string itemName, string imageUrl, uint256 duration, uint256 startingBid) external;
    function bid(uint256 auctionId) external payable;
    function endAuction(uint256 auctionId) external;
    event NewBid(uint256 auctionId, address bidder, uint256 amount);
}

pub(crate) fn quantity_u64(value: U256, what: &str) -> LedgerResult<u64> {
    if value.bit_len() > 64 {
        return Err(LedgerError::Malformed(format!("{what} out of range: {value}")));
    }
    Ok(value.as_limbs()[0])
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxReceipt {
    #[serde(default)]
    status: Option<U256>,
    #[serde(default)]
    block_number: Option<U256>,
}

/// Auction contract reached through a node's JSON-RPC endpoint.
///
/// Writes go out as `eth_sendTransaction` from accounts the node holds
/// unlocked, then wait for the receipt.
#[derive(Clone)]
pub struct RpcLedger {
    rpc: RpcClient,
    contract: Address,
    receipt_poll: Duration,
    receipt_timeout: Duration,
}

impl RpcLedger {
    pub fn new(cfg: &LedgerConfig, registry: &Registry) -> Result<Self> {
        let rpc = RpcClient::new(cfg, registry)?;
        let contract: Address = cfg
            .contract_address
            .parse()
            .with_context(|| format!("parse contract address {}", cfg.contract_address))?;
        Ok(Self::with_client(
            rpc,
            contract,
            Duration::from_millis(cfg.receipt_poll_ms),
            Duration::from_millis(cfg.receipt_timeout_ms),
        ))
    }

    pub fn with_client(
        rpc: RpcClient,
        contract: Address,
        receipt_poll: Duration,
        receipt_timeout: Duration,
    ) -> Self {
        Self {
            rpc,
            contract,
            receipt_poll,
            receipt_timeout,
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    async fn view<C: SolCall>(&self, call: C) -> LedgerResult<C::Return> {
        let data = encode_prefixed(call.abi_encode());
        let out: Bytes = self
            .rpc
            .call(
                "eth_call",
                json!([{ "to": self.contract, "data": data }, "latest"]),
            )
            .await?;
        C::abi_decode_returns(&out, true)
            .map_err(|e| LedgerError::Malformed(format!("decode {}: {e}", C::SIGNATURE)))
    }

    async fn send<C: SolCall>(&self, from: Address, call: C, value: U256) -> LedgerResult<()> {
        let data = encode_prefixed(call.abi_encode());
        let tx_hash: B256 = self
            .rpc
            .call(
                "eth_sendTransaction",
                json!([{
                    "from": from,
                    "to": self.contract,
                    "data": data,
                    "value": value,
                }]),
            )
            .await?;
        let method = C::SIGNATURE;
        tracing::info!(target: "ledger", method=%method, tx=%tx_hash, from=%from, "transaction submitted");
        self.await_receipt(tx_hash).await
    }

    async fn await_receipt(&self, tx_hash: B256) -> LedgerResult<()> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            let receipt: Option<TxReceipt> = self
                .rpc
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if let Some(receipt) = receipt {
                if receipt.status == Some(U256::ZERO) {
                    return Err(LedgerError::Reverted(format!("transaction {tx_hash} failed")));
                }
                tracing::info!(target: "ledger", tx=%tx_hash, block=?receipt.block_number, "transaction confirmed");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(LedgerError::Timeout(format!("receipt of {tx_hash}")));
            }
            tokio::time::sleep(self.receipt_poll).await;
        }
    }
}

#[async_trait]
impl AuctionReader for RpcLedger {
    async fn auction_count(&self) -> LedgerResult<u64> {
        let ret = self.view(auctionCountCall {}).await?;
        quantity_u64(ret._0, "auction count")
    }

    async fn auction(&self, id: AuctionId) -> LedgerResult<Auction> {
        let ret = self.view(auctionsCall { id: U256::from(id) }).await?;
        // Unused slots read back as the zero record.
        if ret.seller.is_zero() {
            return Err(LedgerError::AuctionNotFound(id));
        }
        Ok(Auction {
            id,
            item_name: ret.itemName,
            image_url: ret.imageUrl,
            seller: ret.seller,
            end_time: quantity_u64(ret.endTime, "end time")?,
            highest_bid: ret.highestBid,
            highest_bidder: ret.highestBidder,
            ended: ret.ended,
        })
    }

    async fn won_auctions(&self, who: Address) -> LedgerResult<Vec<AuctionId>> {
        let ret = self.view(getUserWonAuctionsCall { user: who }).await?;
        ret._0
            .into_iter()
            .map(|id| quantity_u64(id, "auction id"))
            .collect()
    }

    async fn admin(&self) -> LedgerResult<Address> {
        Ok(self.view(adminCall {}).await?._0)
    }
}

#[async_trait]
impl AuctionWriter for RpcLedger {
    /// The returned id is best-effort: it is `auctionCount()` read after the
    /// receipt, so another create confirmed in between yields that auction's id.
    async fn create_auction(
        &self,
        from: Address,
        request: &CreateAuctionRequest,
    ) -> LedgerResult<AuctionId> {
        let call = createAuctionCall {
            itemName: request.item_name.clone(),
            imageUrl: request.image_url.clone(),
            duration: U256::from(request.duration_secs),
            startingBid: request.starting_bid,
        };
        self.send(from, call, U256::ZERO).await?;
        self.auction_count().await
    }

    async fn place_bid(&self, from: Address, id: AuctionId, amount: U256) -> LedgerResult<()> {
        self.send(from, bidCall { auctionId: U256::from(id) }, amount)
            .await
    }

    async fn end_auction(&self, from: Address, id: AuctionId) -> LedgerResult<()> {
        self.send(from, endAuctionCall { auctionId: U256::from(id) }, U256::ZERO)
            .await
    }
}

#[async_trait]
impl AccountDirectory for RpcLedger {
    async fn accounts(&self) -> LedgerResult<Vec<Address>> {
        self.rpc.call("eth_accounts", json!([])).await
    }
}
