use crate::model::TriggerSource;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

#[derive(Clone)]
pub struct SyncMetrics {
    pub triggers: IntCounterVec,
    pub triggers_coalesced: IntCounter,
    pub fetch_cycles: IntCounter,
    pub fetch_failures: IntCounter,
    pub snapshot_auctions: IntGauge,
    pub actions_rejected: IntCounter,
}

impl SyncMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Arc<Self>> {
        let triggers = IntCounterVec::new(
            Opts::new("auction_sync_triggers", "Resync triggers received"),
            &["source"],
        )?;
        let triggers_coalesced = IntCounter::with_opts(Opts::new(
            "auction_sync_triggers_coalesced",
            "Triggers folded into a pending follow-up cycle",
        ))?;
        let fetch_cycles =
            IntCounter::with_opts(Opts::new("auction_sync_fetch_cycles", "Fetch cycles started"))?;
        let fetch_failures =
            IntCounter::with_opts(Opts::new("auction_sync_fetch_failures", "Fetch cycles failed"))?;
        let snapshot_auctions = IntGauge::with_opts(Opts::new(
            "auction_sync_snapshot_auctions",
            "Auctions in the published snapshot",
        ))?;
        let actions_rejected = IntCounter::with_opts(Opts::new(
            "auction_actions_rejected",
            "Ledger writes rejected",
        ))?;
        registry.register(Box::new(triggers.clone())).ok();
        registry.register(Box::new(triggers_coalesced.clone())).ok();
        registry.register(Box::new(fetch_cycles.clone())).ok();
        registry.register(Box::new(fetch_failures.clone())).ok();
        registry.register(Box::new(snapshot_auctions.clone())).ok();
        registry.register(Box::new(actions_rejected.clone())).ok();
        Ok(Arc::new(Self {
            triggers,
            triggers_coalesced,
            fetch_cycles,
            fetch_failures,
            snapshot_auctions,
            actions_rejected,
        }))
    }

    pub fn trigger(&self, source: TriggerSource) {
        self.triggers.with_label_values(&[source.as_str()]).inc();
    }
}
