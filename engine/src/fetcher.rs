use engine_core::{AuctionReader, Clock, FetchError, Snapshot, ViewerContext};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;

/// Reads the full auction set in one pass. Holds no state between calls.
pub struct SnapshotFetcher<L: AuctionReader + 'static> {
    ledger: Arc<L>,
    clock: Arc<dyn Clock>,
    concurrency: usize,
}

impl<L: AuctionReader + 'static> Clone for SnapshotFetcher<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            clock: self.clock.clone(),
            concurrency: self.concurrency,
        }
    }
}

impl<L: AuctionReader + 'static> SnapshotFetcher<L> {
    pub fn new(ledger: Arc<L>, clock: Arc<dyn Clock>, concurrency: usize) -> Self {
        Self {
            ledger,
            clock,
            concurrency: concurrency.max(1),
        }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Any failed read fails the whole pass; partial snapshots are never built.
    pub async fn fetch(&self, viewer: &ViewerContext) -> Result<Snapshot, FetchError> {
        let total = self.ledger.auction_count().await.map_err(FetchError::Count)?;

        let ledger = &self.ledger;
        let auctions: Vec<_> = stream::iter(1..=total)
            .map(|id| async move {
                ledger
                    .auction(id)
                    .await
                    .map_err(|source| FetchError::Auction { id, source })
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let won = if viewer.wants_dashboard() {
            let ids = self
                .ledger
                .won_auctions(viewer.address())
                .await
                .map_err(FetchError::Won)?;
            if let Some(stray) = ids.iter().find(|id| **id == 0 || **id > total) {
                return Err(FetchError::Inconsistent(format!(
                    "won auction {stray} outside 1..={total}"
                )));
            }
            Some(ids)
        } else {
            None
        };

        tracing::debug!(target: "fetcher", total, dashboard = won.is_some(), "snapshot read");
        Ok(Snapshot::new(auctions, total, won, self.clock.now_secs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem_ledger::InMemoryLedger;
    use alloy_primitives::{Address, U256};
    use engine_core::{reconcile, Auction, LedgerError, ManualClock, Role};

    fn setup() -> (Arc<InMemoryLedger>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(5_000));
        let accounts = (1..=4).map(Address::repeat_byte).collect();
        let ledger = Arc::new(InMemoryLedger::new(accounts, clock.clone()));
        for i in 0..5u64 {
            ledger.seed(Auction {
                id: 0,
                item_name: format!("lot {i}"),
                image_url: String::new(),
                seller: Address::repeat_byte(2),
                end_time: 5_000 + i * 10,
                highest_bid: U256::from(i),
                highest_bidder: Address::ZERO,
                ended: false,
            });
        }
        (ledger, clock)
    }

    fn participant() -> ViewerContext {
        ViewerContext::new(Address::repeat_byte(3), Role::Participant)
    }

    #[tokio::test]
    async fn reads_every_auction_in_order() {
        let (ledger, clock) = setup();
        for concurrency in [1, 3] {
            let f = SnapshotFetcher::new(ledger.clone(), clock.clone(), concurrency);
            let snap = f.fetch(&participant()).await.unwrap();
            assert_eq!(snap.total(), 5);
            let ids: Vec<_> = snap.auctions().iter().map(|a| a.id).collect();
            assert_eq!(ids, vec![1, 2, 3, 4, 5]);
            assert!(snap.won().is_none());
        }
    }

    #[tokio::test]
    async fn one_failed_read_fails_the_pass() {
        let (ledger, clock) = setup();
        ledger.fail_reads_of(Some(3));
        let f = SnapshotFetcher::new(ledger.clone(), clock, 2);
        match f.fetch(&participant()).await {
            Err(FetchError::Auction { id, source }) => {
                assert_eq!(id, 3);
                assert!(matches!(source, LedgerError::Transport(_)));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_fetches_render_identically() {
        let (ledger, clock) = setup();
        let f = SnapshotFetcher::new(ledger, clock.clone(), 1);
        let viewer = participant().with_dashboard(true);
        let a = f.fetch(&viewer).await.unwrap();
        let b = f.fetch(&viewer).await.unwrap();
        let now = clock.now_secs();
        assert_eq!(reconcile(&a, &viewer, now), reconcile(&b, &viewer, now));
        assert_eq!(a.won(), Some(&[][..]));
    }
}
