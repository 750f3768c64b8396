use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use engine_core::{
    AccountDirectory, Auction, AuctionId, AuctionReader, AuctionWriter, BidEvent, BidStream,
    Clock, CreateAuctionRequest, LedgerError, LedgerResult,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct Book {
    auctions: Vec<Auction>,
    won: HashMap<Address, Vec<AuctionId>>,
    block: u64,
}

/// Ledger kept in process memory. Backs the offline demo and the tests.
///
/// The first account is the contract admin. Rules are the minimum needed to
/// exercise the client: bids must beat the current highest bid on an open
/// auction, sellers cannot bid, and only the admin ends auctions.
#[derive(Clone)]
pub struct InMemoryLedger {
    accounts: Arc<Vec<Address>>,
    clock: Arc<dyn Clock>,
    book: Arc<Mutex<Book>>,
    count_reads: Arc<AtomicUsize>,
    read_gate: Arc<tokio::sync::Mutex<()>>,
    failing_auction: Arc<Mutex<Option<AuctionId>>>,
    events_tx: mpsc::Sender<BidEvent>,
    events_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<BidEvent>>>,
}

impl InMemoryLedger {
    pub fn new(accounts: Vec<Address>, clock: Arc<dyn Clock>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(1_000);
        Self {
            accounts: Arc::new(accounts),
            clock,
            book: Arc::new(Mutex::new(Book::default())),
            count_reads: Arc::new(AtomicUsize::new(0)),
            read_gate: Arc::new(tokio::sync::Mutex::new(())),
            failing_auction: Arc::new(Mutex::new(None)),
            events_tx,
            events_rx: Arc::new(tokio::sync::Mutex::new(events_rx)),
        }
    }

    pub fn admin_address(&self) -> Address {
        self.accounts.first().copied().unwrap_or(Address::ZERO)
    }

    /// Inserts a fully formed record, bypassing the write rules.
    pub fn seed(&self, mut auction: Auction) -> AuctionId {
        let mut book = self.book.lock();
        auction.id = book.auctions.len() as AuctionId + 1;
        if auction.ended && auction.has_bidder() {
            book.won
                .entry(auction.highest_bidder)
                .or_default()
                .push(auction.id);
        }
        let id = auction.id;
        book.auctions.push(auction);
        id
    }

    /// Number of full read passes started (auction count reads).
    pub fn fetch_passes(&self) -> usize {
        self.count_reads.load(Ordering::SeqCst)
    }

    /// Holding this lock parks every read pass at its first call.
    pub fn read_gate(&self) -> Arc<tokio::sync::Mutex<()>> {
        self.read_gate.clone()
    }

    /// Makes reads of `id` fail until cleared with `None`.
    pub fn fail_reads_of(&self, id: Option<AuctionId>) {
        *self.failing_auction.lock() = id;
    }

    fn emit(&self, ev: BidEvent) {
        if let Err(e) = self.events_tx.try_send(ev) {
            tracing::debug!(target: "ledger", "dropping bid event: {}", e);
        }
    }
}

#[async_trait]
impl AuctionReader for InMemoryLedger {
    async fn auction_count(&self) -> LedgerResult<u64> {
        self.count_reads.fetch_add(1, Ordering::SeqCst);
        let _gate = self.read_gate.lock().await;
        Ok(self.book.lock().auctions.len() as u64)
    }

    async fn auction(&self, id: AuctionId) -> LedgerResult<Auction> {
        if *self.failing_auction.lock() == Some(id) {
            return Err(LedgerError::Transport(format!("read of auction {id} dropped")));
        }
        let book = self.book.lock();
        id.checked_sub(1)
            .and_then(|idx| book.auctions.get(idx as usize))
            .cloned()
            .ok_or(LedgerError::AuctionNotFound(id))
    }

    async fn won_auctions(&self, who: Address) -> LedgerResult<Vec<AuctionId>> {
        Ok(self.book.lock().won.get(&who).cloned().unwrap_or_default())
    }

    async fn admin(&self) -> LedgerResult<Address> {
        Ok(self.admin_address())
    }
}

#[async_trait]
impl AuctionWriter for InMemoryLedger {
    async fn create_auction(
        &self,
        from: Address,
        request: &CreateAuctionRequest,
    ) -> LedgerResult<AuctionId> {
        if request.duration_secs == 0 {
            return Err(LedgerError::Reverted("Duration must be positive".into()));
        }
        let end_time = self
            .clock
            .now_secs()
            .checked_add(request.duration_secs)
            .ok_or_else(|| LedgerError::Reverted("Duration too long".into()))?;
        let mut book = self.book.lock();
        let id = book.auctions.len() as AuctionId + 1;
        book.auctions.push(Auction {
            id,
            item_name: request.item_name.clone(),
            image_url: request.image_url.clone(),
            seller: from,
            end_time,
            highest_bid: request.starting_bid,
            highest_bidder: Address::ZERO,
            ended: false,
        });
        book.block += 1;
        Ok(id)
    }

    async fn place_bid(&self, from: Address, id: AuctionId, amount: U256) -> LedgerResult<()> {
        let now = self.clock.now_secs();
        let event = {
            let mut book = self.book.lock();
            let block = book.block + 1;
            let auction = id
                .checked_sub(1)
                .and_then(|idx| book.auctions.get_mut(idx as usize))
                .ok_or(LedgerError::AuctionNotFound(id))?;
            if auction.ended || auction.remaining_secs(now) <= 0 {
                return Err(LedgerError::Reverted("Auction ended".into()));
            }
            if auction.seller == from {
                return Err(LedgerError::Reverted("Seller cannot bid".into()));
            }
            if amount <= auction.highest_bid {
                return Err(LedgerError::Reverted("Bid too low".into()));
            }
            auction.highest_bid = amount;
            auction.highest_bidder = from;
            book.block = block;
            BidEvent {
                auction_id: id,
                bidder: from,
                amount,
                block_number: Some(block),
            }
        };
        self.emit(event);
        Ok(())
    }

    async fn end_auction(&self, from: Address, id: AuctionId) -> LedgerResult<()> {
        if from != self.admin_address() {
            return Err(LedgerError::Reverted("Only admin can end auctions".into()));
        }
        let mut book = self.book.lock();
        let auction = id
            .checked_sub(1)
            .and_then(|idx| book.auctions.get_mut(idx as usize))
            .ok_or(LedgerError::AuctionNotFound(id))?;
        if auction.ended {
            return Err(LedgerError::Reverted("Auction already ended".into()));
        }
        auction.ended = true;
        let winner = auction.has_bidder().then_some(auction.highest_bidder);
        if let Some(winner) = winner {
            book.won.entry(winner).or_default().push(id);
        }
        book.block += 1;
        Ok(())
    }
}

#[async_trait]
impl AccountDirectory for InMemoryLedger {
    async fn accounts(&self) -> LedgerResult<Vec<Address>> {
        Ok(self.accounts.as_ref().clone())
    }
}

#[async_trait]
impl BidStream for InMemoryLedger {
    async fn connect(&self) -> LedgerResult<()> {
        Ok(())
    }

    async fn next(&self) -> LedgerResult<Option<BidEvent>> {
        let mut rx = self.events_rx.lock().await;
        Ok(rx.recv().await)
    }
}
