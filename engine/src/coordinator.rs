use crate::fetcher::SnapshotFetcher;
use engine_core::{
    reconcile, reconcile_dashboard, AuctionReader, AuctionView, Clock, DashboardView, Snapshot,
    SyncMetrics, TimestampSecs, Trigger, TriggerSink, ViewerContext,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Coordinator state. `Fetching` covers fetch and render of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching { pending: bool },
}

/// What happened to a submitted trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Started a new cycle.
    Started,
    /// A cycle is running; one follow-up cycle is now scheduled.
    Coalesced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Nothing published yet.
    Loading,
    Synced { at: TimestampSecs },
    /// Last cycle failed; the previously published snapshot stays on display.
    Failed { at: TimestampSecs, message: String },
}

/// Everything the UI reads. Swapped in whole after each cycle.
#[derive(Debug, Clone)]
pub struct SyncView {
    pub snapshot: Option<Arc<Snapshot>>,
    pub auctions: Arc<Vec<AuctionView>>,
    pub dashboard: Option<DashboardView>,
    pub status: SyncStatus,
    /// Number of snapshots adopted so far.
    pub generation: u64,
}

impl SyncView {
    fn empty() -> Self {
        Self {
            snapshot: None,
            auctions: Arc::new(Vec::new()),
            dashboard: None,
            status: SyncStatus::Loading,
            generation: 0,
        }
    }
}

struct Inner<L: AuctionReader + 'static> {
    fetcher: SnapshotFetcher<L>,
    viewer: ViewerContext,
    clock: Arc<dyn Clock>,
    metrics: Arc<SyncMetrics>,
    state: Mutex<Phase>,
    phase_tx: watch::Sender<Phase>,
    view_tx: watch::Sender<Arc<SyncView>>,
}

/// Serializes fetch-and-render cycles and folds trigger storms into at most
/// one follow-up cycle.
pub struct UpdateCoordinator<L: AuctionReader + 'static> {
    inner: Arc<Inner<L>>,
}

impl<L: AuctionReader + 'static> Clone for UpdateCoordinator<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L: AuctionReader + 'static> UpdateCoordinator<L> {
    pub fn new(
        fetcher: SnapshotFetcher<L>,
        viewer: ViewerContext,
        clock: Arc<dyn Clock>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        let (phase_tx, _) = watch::channel(Phase::Idle);
        let (view_tx, _) = watch::channel(Arc::new(SyncView::empty()));
        Self {
            inner: Arc::new(Inner {
                fetcher,
                viewer,
                clock,
                metrics,
                state: Mutex::new(Phase::Idle),
                phase_tx,
                view_tx,
            }),
        }
    }

    pub fn viewer(&self) -> &ViewerContext {
        &self.inner.viewer
    }

    pub fn phase(&self) -> Phase {
        *self.inner.state.lock()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.inner.phase_tx.subscribe()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SyncView>> {
        self.inner.view_tx.subscribe()
    }

    pub fn current(&self) -> Arc<SyncView> {
        self.inner.view_tx.borrow().clone()
    }

    /// Admits a trigger. Must be called from within a tokio runtime.
    pub fn trigger(&self, trigger: Trigger) -> Admission {
        let inner = &self.inner;
        inner.metrics.trigger(trigger.source);
        let admission = {
            let mut state = inner.state.lock();
            let admission = match *state {
                Phase::Idle => {
                    *state = Phase::Fetching { pending: false };
                    Admission::Started
                }
                Phase::Fetching { .. } => {
                    *state = Phase::Fetching { pending: true };
                    Admission::Coalesced
                }
            };
            inner.phase_tx.send_replace(*state);
            admission
        };

        match admission {
            Admission::Started => {
                info!(target: "coordinator", source = trigger.source.as_str(), "sync cycle starting");
                let inner = self.inner.clone();
                tokio::spawn(async move { inner.run_cycles().await });
            }
            Admission::Coalesced => {
                inner.metrics.triggers_coalesced.inc();
                tracing::debug!(target: "coordinator", source = trigger.source.as_str(), "trigger coalesced");
            }
        }
        admission
    }

    /// Resolves once the coordinator is idle with nothing pending.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe_phase();
        let _ = rx.wait_for(|p| *p == Phase::Idle).await;
    }
}

impl<L: AuctionReader + 'static> TriggerSink for UpdateCoordinator<L> {
    fn submit(&self, trigger: Trigger) {
        self.trigger(trigger);
    }
}

impl<L: AuctionReader + 'static> Inner<L> {
    async fn run_cycles(self: Arc<Self>) {
        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            self.run_cycle(cycle).await;

            let mut state = self.state.lock();
            let again = matches!(*state, Phase::Fetching { pending: true });
            *state = if again {
                Phase::Fetching { pending: false }
            } else {
                Phase::Idle
            };
            self.phase_tx.send_replace(*state);
            if !again {
                break;
            }
        }
    }

    async fn run_cycle(&self, cycle: u64) {
        self.metrics.fetch_cycles.inc();
        let fetched = self.fetcher.fetch(&self.viewer).await;
        let now = self.clock.now_secs();
        match fetched {
            Ok(snapshot) => self.adopt(snapshot, now, cycle),
            Err(err) => {
                self.metrics.fetch_failures.inc();
                warn!(target: "coordinator", cycle, error = %err, "sync cycle failed");
                self.view_tx.send_modify(|view| {
                    let mut next = SyncView::clone(view);
                    next.status = SyncStatus::Failed {
                        at: now,
                        message: err.to_string(),
                    };
                    *view = Arc::new(next);
                });
            }
        }
    }

    fn adopt(&self, snapshot: Snapshot, now: TimestampSecs, cycle: u64) {
        let previous = self.view_tx.borrow().clone();
        if let Some(prev) = previous.snapshot.as_ref() {
            for regression in snapshot.regressions_from(prev) {
                warn!(target: "coordinator", ?regression, "ledger state moved backwards");
            }
        }
        let auctions = reconcile(&snapshot, &self.viewer, now);
        let dashboard = reconcile_dashboard(&snapshot);
        self.metrics
            .snapshot_auctions
            .set(snapshot.auctions().len() as i64);
        let view = SyncView {
            snapshot: Some(Arc::new(snapshot)),
            auctions: Arc::new(auctions),
            dashboard,
            status: SyncStatus::Synced { at: now },
            generation: previous.generation + 1,
        };
        info!(target: "coordinator", cycle, generation = view.generation, auctions = view.auctions.len(), "snapshot adopted");
        self.view_tx.send_replace(Arc::new(view));
    }
}
