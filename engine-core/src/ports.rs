use crate::{error::LedgerError, model::*};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Read path of the auction contract.
#[async_trait]
pub trait AuctionReader: Send + Sync {
    async fn auction_count(&self) -> LedgerResult<u64>;
    async fn auction(&self, id: AuctionId) -> LedgerResult<Auction>;
    async fn won_auctions(&self, who: Address) -> LedgerResult<Vec<AuctionId>>;
    async fn admin(&self) -> LedgerResult<Address>;
}

/// Write path. Every call returns only after the write is confirmed.
#[async_trait]
pub trait AuctionWriter: Send + Sync {
    async fn create_auction(
        &self,
        from: Address,
        request: &CreateAuctionRequest,
    ) -> LedgerResult<AuctionId>;
    async fn place_bid(&self, from: Address, id: AuctionId, amount: U256) -> LedgerResult<()>;
    async fn end_auction(&self, from: Address, id: AuctionId) -> LedgerResult<()>;
}

/// Identities the ledger node can act for.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn accounts(&self) -> LedgerResult<Vec<Address>>;
}

/// "New bid placed" notifications. At-least-once, unordered.
#[async_trait]
pub trait BidStream: Send + Sync {
    async fn connect(&self) -> LedgerResult<()>;
    async fn next(&self) -> LedgerResult<Option<BidEvent>>;
}

/// Anything that can ask for a resync.
pub trait TriggerSink: Send + Sync {
    fn submit(&self, trigger: Trigger);
}

pub trait Clock: Send + Sync {
    fn now_secs(&self) -> TimestampSecs;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> TimestampSecs {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Hand-driven clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: TimestampSecs) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: TimestampSecs) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> TimestampSecs {
        self.now.load(Ordering::SeqCst)
    }
}
