use crate::{
    config::SyncConfig,
    coordinator::UpdateCoordinator,
    fetcher::SnapshotFetcher,
    ticker::{CountdownBoard, CountdownTicker},
};
use anyhow::Result;
use engine_core::{
    AuctionReader, BidStream, Clock, SyncMetrics, Trigger, TriggerSink, ViewerContext,
};
use std::sync::Arc;
use tokio::{sync::watch, task::JoinHandle, time::Duration};
use tracing::{debug, info, warn};

/// Wires the three trigger sources (startup, countdown expiry, bid events)
/// into one coordinator.
pub struct SyncEngine<L: AuctionReader + 'static, S: BidStream + 'static> {
    coordinator: UpdateCoordinator<L>,
    stream: Arc<S>,
    ticker: CountdownTicker,
    countdowns: watch::Receiver<Arc<CountdownBoard>>,
}

impl<L: AuctionReader + 'static, S: BidStream + 'static> SyncEngine<L, S> {
    pub fn new(
        cfg: &SyncConfig,
        ledger: Arc<L>,
        stream: Arc<S>,
        viewer: ViewerContext,
        clock: Arc<dyn Clock>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        let fetcher = SnapshotFetcher::new(ledger, clock.clone(), cfg.fetch_concurrency);
        let coordinator = UpdateCoordinator::new(fetcher, viewer, clock.clone(), metrics);
        let ticker = CountdownTicker::new(
            clock,
            Duration::from_millis(cfg.tick_interval_ms.max(1)),
            Arc::new(coordinator.clone()),
        );
        let countdowns = ticker.subscribe();
        Self {
            coordinator,
            stream,
            ticker,
            countdowns,
        }
    }

    pub fn coordinator(&self) -> UpdateCoordinator<L> {
        self.coordinator.clone()
    }

    pub fn countdowns(&self) -> watch::Receiver<Arc<CountdownBoard>> {
        self.countdowns.clone()
    }

    /// Starts the ticker and the bid event loop, then fires the startup sync.
    /// Runs for the lifetime of the session.
    pub async fn run(self) -> Result<()> {
        info!(target: "runner", "sync engine starting");
        let h_ticker = self.ticker.spawn(self.coordinator.subscribe());

        let stream = self.stream.clone();
        let sink: Arc<dyn TriggerSink> = Arc::new(self.coordinator.clone());
        let h_events: JoinHandle<()> = tokio::spawn(pump_bid_events(stream, sink));

        self.coordinator.trigger(Trigger::startup());

        let (ticker, events) = tokio::join!(h_ticker, h_events);
        ticker?;
        events?;
        info!(target: "runner", "sync engine stopped");
        Ok(())
    }
}

/// Turns every observed bid into a push-event trigger. Any connect failure or
/// end of stream reconnects with backoff, reset once an event arrives.
pub async fn pump_bid_events<S: BidStream + ?Sized>(stream: Arc<S>, sink: Arc<dyn TriggerSink>) {
    info!(target: "runner", "bid event loop started");
    let initial = Duration::from_millis(500);
    let max_backoff = Duration::from_secs(30);
    let mut backoff = initial;
    loop {
        if let Err(e) = stream.connect().await {
            warn!(target: "runner", "bid stream connect failed: {}", e);
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(max_backoff);
            continue;
        }
        loop {
            match stream.next().await {
                Ok(Some(ev)) => {
                    backoff = initial;
                    debug!(target: "runner", auction_id = ev.auction_id, bidder = %ev.bidder, "new bid observed");
                    sink.submit(Trigger::push_event());
                }
                Ok(None) => {
                    warn!(target: "runner", "bid stream closed, reconnecting in {:?}", backoff);
                    break;
                }
                Err(e) => {
                    warn!(target: "runner", "bid stream failed, reconnecting in {:?}: {}", backoff, e);
                    break;
                }
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max_backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use async_trait::async_trait;
    use engine_core::{BidEvent, LedgerResult, TriggerSource};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// First session ends immediately; the second yields one bid and then idles.
    #[derive(Default)]
    struct FlakyStream {
        connects: AtomicUsize,
        delivered: AtomicUsize,
    }

    #[async_trait]
    impl BidStream for FlakyStream {
        async fn connect(&self) -> LedgerResult<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn next(&self) -> LedgerResult<Option<BidEvent>> {
            if self.connects.load(Ordering::SeqCst) < 2 {
                return Ok(None);
            }
            if self.delivered.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(Some(BidEvent {
                    auction_id: 1,
                    bidder: Address::repeat_byte(3),
                    amount: U256::from(5u64),
                    block_number: Some(7),
                }));
            }
            std::future::pending().await
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<TriggerSource>>);

    impl TriggerSink for Recorder {
        fn submit(&self, trigger: Trigger) {
            self.0.lock().push(trigger.source);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn closed_stream_reconnects_and_keeps_delivering() {
        let stream = Arc::new(FlakyStream::default());
        let recorder = Arc::new(Recorder::default());
        let handle = tokio::spawn(pump_bid_events(stream.clone(), recorder.clone()));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(stream.connects.load(Ordering::SeqCst), 2);
        assert_eq!(*recorder.0.lock(), vec![TriggerSource::PushEvent]);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn closed_stream_backs_off_between_reconnects() {
        struct AlwaysClosed(AtomicUsize);

        #[async_trait]
        impl BidStream for AlwaysClosed {
            async fn connect(&self) -> LedgerResult<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }

            async fn next(&self) -> LedgerResult<Option<BidEvent>> {
                Ok(None)
            }
        }

        let stream = Arc::new(AlwaysClosed(AtomicUsize::new(0)));
        let handle = tokio::spawn(pump_bid_events(stream.clone(), Arc::new(Recorder::default())));

        // connects at 0, 0.5s, 1.5s, 3.5s
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(stream.0.load(Ordering::SeqCst), 4);
        handle.abort();
    }
}
