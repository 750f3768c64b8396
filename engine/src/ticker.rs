use crate::coordinator::SyncView;
use engine_core::{AuctionId, Clock, Countdown, CountdownDisplay, TimestampSecs, Trigger, TriggerSink};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, info};

/// Countdown state of every rendered auction as of the last tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountdownBoard {
    pub at: TimestampSecs,
    pub entries: Vec<(AuctionId, CountdownDisplay)>,
}

impl CountdownBoard {
    pub fn get(&self, id: AuctionId) -> Option<CountdownDisplay> {
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, display)| *display)
    }
}

/// Re-evaluates cached end times once per interval and asks for a resync
/// the first time an auction runs out. Never touches the ledger.
pub struct CountdownTicker {
    clock: Arc<dyn Clock>,
    interval: Duration,
    triggers: Arc<dyn TriggerSink>,
    board_tx: watch::Sender<Arc<CountdownBoard>>,
}

impl CountdownTicker {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration, triggers: Arc<dyn TriggerSink>) -> Self {
        let (board_tx, _) = watch::channel(Arc::new(CountdownBoard::default()));
        Self {
            clock,
            interval,
            triggers,
            board_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<CountdownBoard>> {
        self.board_tx.subscribe()
    }

    /// Runs until the view publisher goes away.
    pub fn spawn(self, views: watch::Receiver<Arc<SyncView>>) -> JoinHandle<()> {
        tokio::spawn(self.run(views))
    }

    pub async fn run(self, mut views: watch::Receiver<Arc<SyncView>>) {
        let mut countdown = Countdown::new();
        let initial = views.borrow_and_update().clone();
        self.retrack(&mut countdown, &initial);

        let mut iv = tokio::time::interval(self.interval);
        iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(target: "ticker", interval_ms = self.interval.as_millis() as u64, "countdown ticker started");
        loop {
            tokio::select! {
                changed = views.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = views.borrow_and_update().clone();
                    self.retrack(&mut countdown, &view);
                }
                _ = iv.tick() => self.tick(&mut countdown),
            }
        }
        info!(target: "ticker", "countdown ticker stopped");
    }

    fn retrack(&self, countdown: &mut Countdown, view: &SyncView) {
        let Some(snapshot) = view.snapshot.as_ref() else {
            return;
        };
        countdown.track(
            snapshot
                .auctions()
                .iter()
                .map(|a| (a.id, a.end_time, a.ended)),
            self.clock.now_secs(),
        );
        debug!(target: "ticker", tracked = countdown.len(), "countdown retracked");
    }

    fn tick(&self, countdown: &mut Countdown) {
        let now = self.clock.now_secs();
        let outcome = countdown.tick(now);
        for id in &outcome.expired {
            info!(target: "ticker", auction_id = id, "auction countdown reached zero");
            self.triggers.submit(Trigger::timer_expiry());
        }
        self.board_tx.send_replace(Arc::new(CountdownBoard {
            at: now,
            entries: outcome.displays,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::SyncStatus;
    use alloy_primitives::{Address, U256};
    use engine_core::{Auction, ManualClock, Snapshot, TriggerSource};
    use parking_lot::Mutex;

    const NOW: TimestampSecs = 50_000;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Trigger>>);

    impl TriggerSink for Recorder {
        fn submit(&self, trigger: Trigger) {
            self.0.lock().push(trigger);
        }
    }

    fn view_with(end_times: &[(TimestampSecs, bool)]) -> Arc<SyncView> {
        let auctions: Vec<_> = end_times
            .iter()
            .enumerate()
            .map(|(i, (end_time, ended))| Auction {
                id: i as u64 + 1,
                item_name: format!("lot {i}"),
                image_url: String::new(),
                seller: Address::repeat_byte(1),
                end_time: *end_time,
                highest_bid: U256::ZERO,
                highest_bidder: Address::ZERO,
                ended: *ended,
            })
            .collect();
        let total = auctions.len() as u64;
        Arc::new(SyncView {
            snapshot: Some(Arc::new(Snapshot::new(auctions, total, None, NOW))),
            auctions: Arc::new(Vec::new()),
            dashboard: None,
            status: SyncStatus::Synced { at: NOW },
            generation: 1,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_requests_exactly_one_resync() {
        let clock = Arc::new(ManualClock::new(NOW));
        let recorder = Arc::new(Recorder::default());
        let (_view_tx, view_rx) = watch::channel(view_with(&[(NOW + 2, false), (NOW - 5, true)]));
        let ticker = CountdownTicker::new(clock.clone(), Duration::from_secs(1), recorder.clone());
        let board = ticker.subscribe();
        let handle = ticker.spawn(view_rx);

        for _ in 0..6 {
            clock.advance(1);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        tokio::time::sleep(Duration::from_secs(3)).await;

        let fired = recorder.0.lock().clone();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].source, TriggerSource::TimerExpiry);
        let board = board.borrow().clone();
        assert_eq!(board.get(1), Some(CountdownDisplay::Ended));
        assert_eq!(board.get(2), Some(CountdownDisplay::Ended));
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_views_close() {
        let clock = Arc::new(ManualClock::new(NOW));
        let (view_tx, view_rx) = watch::channel(view_with(&[]));
        let ticker = CountdownTicker::new(clock, Duration::from_secs(1), Arc::new(Recorder::default()));
        let handle = ticker.spawn(view_rx);
        drop(view_tx);
        handle.await.unwrap();
    }

    #[test]
    fn board_lookup() {
        let board = CountdownBoard {
            at: NOW,
            entries: vec![(3, CountdownDisplay::Remaining(9))],
        };
        assert_eq!(board.get(3), Some(CountdownDisplay::Remaining(9)));
        assert_eq!(board.get(4), None);
    }
}
