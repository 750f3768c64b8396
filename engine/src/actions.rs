use alloy_primitives::U256;
use dashmap::DashMap;
use engine_core::{
    ActionKind, AuctionId, AuctionWriter, ContractError, CreateAuctionRequest, SyncMetrics,
    Trigger, TriggerSink, ViewerContext,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Where a rejected write is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionTarget {
    CreateForm,
    Auction(AuctionId),
}

/// UI-originated writes. Each confirmed write asks for exactly one resync;
/// a rejected write asks for none and is recorded against its target.
pub struct AuctionActions<W: AuctionWriter + 'static> {
    writer: Arc<W>,
    viewer: ViewerContext,
    triggers: Arc<dyn TriggerSink>,
    metrics: Arc<SyncMetrics>,
    failures: DashMap<ActionTarget, ContractError>,
}

impl<W: AuctionWriter + 'static> AuctionActions<W> {
    pub fn new(
        writer: Arc<W>,
        viewer: ViewerContext,
        triggers: Arc<dyn TriggerSink>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            writer,
            viewer,
            triggers,
            metrics,
            failures: DashMap::new(),
        }
    }

    pub fn viewer(&self) -> &ViewerContext {
        &self.viewer
    }

    pub async fn create_auction(
        &self,
        request: CreateAuctionRequest,
    ) -> Result<AuctionId, ContractError> {
        let target = ActionTarget::CreateForm;
        match self.writer.create_auction(self.viewer.address(), &request).await {
            Ok(id) => {
                info!(target: "actions", auction_id = id, item = %request.item_name, "auction created");
                self.confirmed(target);
                Ok(id)
            }
            Err(e) => Err(self.rejected(target, ContractError::from_ledger(ActionKind::Create, None, &e))),
        }
    }

    pub async fn place_bid(&self, id: AuctionId, amount: U256) -> Result<(), ContractError> {
        let target = ActionTarget::Auction(id);
        match self.writer.place_bid(self.viewer.address(), id, amount).await {
            Ok(()) => {
                info!(target: "actions", auction_id = id, %amount, "bid confirmed");
                self.confirmed(target);
                Ok(())
            }
            Err(e) => Err(self.rejected(target, ContractError::from_ledger(ActionKind::Bid, Some(id), &e))),
        }
    }

    pub async fn end_auction(&self, id: AuctionId) -> Result<(), ContractError> {
        let target = ActionTarget::Auction(id);
        match self.writer.end_auction(self.viewer.address(), id).await {
            Ok(()) => {
                info!(target: "actions", auction_id = id, "auction ended");
                self.confirmed(target);
                Ok(())
            }
            Err(e) => Err(self.rejected(target, ContractError::from_ledger(ActionKind::End, Some(id), &e))),
        }
    }

    /// Most recent rejection for a target, cleared by its next success.
    pub fn last_failure(&self, target: ActionTarget) -> Option<ContractError> {
        self.failures.get(&target).map(|e| e.value().clone())
    }

    fn confirmed(&self, target: ActionTarget) {
        self.failures.remove(&target);
        self.triggers.submit(Trigger::post_action());
    }

    fn rejected(&self, target: ActionTarget, err: ContractError) -> ContractError {
        self.metrics.actions_rejected.inc();
        warn!(target: "actions", ?target, error = %err, "write rejected");
        self.failures.insert(target, err.clone());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::UpdateCoordinator;
    use crate::fetcher::SnapshotFetcher;
    use crate::mem_ledger::InMemoryLedger;
    use alloy_primitives::Address;
    use engine_core::{Auction, ManualClock, Role, TriggerSource};
    use parking_lot::Mutex;
    use prometheus::Registry;

    const NOW: u64 = 20_000;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Trigger>>);

    impl TriggerSink for Recorder {
        fn submit(&self, trigger: Trigger) {
            self.0.lock().push(trigger);
        }
    }

    fn ledger() -> (Arc<InMemoryLedger>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let accounts = (1..=3).map(Address::repeat_byte).collect();
        let ledger = Arc::new(InMemoryLedger::new(accounts, clock.clone()));
        ledger.seed(Auction {
            id: 0,
            item_name: "Chair".into(),
            image_url: String::new(),
            seller: Address::repeat_byte(2),
            end_time: NOW + 30,
            highest_bid: U256::from(5u64),
            highest_bidder: Address::ZERO,
            ended: false,
        });
        (ledger, clock)
    }

    fn metrics() -> Arc<SyncMetrics> {
        SyncMetrics::new(&Registry::new()).unwrap()
    }

    #[tokio::test]
    async fn confirmed_bid_submits_one_post_action_trigger() {
        let (ledger, _) = ledger();
        let recorder = Arc::new(Recorder::default());
        let viewer = ViewerContext::new(Address::repeat_byte(3), Role::Participant);
        let actions = AuctionActions::new(ledger, viewer, recorder.clone(), metrics());

        actions.place_bid(1, U256::from(6u64)).await.unwrap();
        let fired = recorder.0.lock().clone();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].source, TriggerSource::PostAction);
    }

    #[tokio::test]
    async fn rejected_bid_is_reported_against_its_auction_only() {
        let (ledger, clock) = ledger();
        let viewer = ViewerContext::new(Address::repeat_byte(3), Role::Participant);
        let fetcher = SnapshotFetcher::new(ledger.clone(), clock.clone(), 1);
        let coord = UpdateCoordinator::new(fetcher, viewer.clone(), clock.clone(), metrics());
        coord.trigger(Trigger::startup());
        coord.wait_idle().await;
        let before = coord.current();

        let actions = AuctionActions::new(ledger.clone(), viewer, Arc::new(coord.clone()), metrics());
        clock.advance(31);
        let err = actions.place_bid(1, U256::from(9u64)).await.unwrap_err();
        assert_eq!(err.reason, "Auction ended");
        assert_eq!(err.auction_id, Some(1));

        coord.wait_idle().await;
        assert_eq!(ledger.fetch_passes(), 1);
        let after = coord.current();
        assert_eq!(after.generation, before.generation);
        assert_eq!(after.auctions, before.auctions);

        assert_eq!(actions.last_failure(ActionTarget::Auction(1)), Some(err));
        assert_eq!(actions.last_failure(ActionTarget::Auction(2)), None);
        assert_eq!(actions.last_failure(ActionTarget::CreateForm), None);
    }

    #[tokio::test]
    async fn success_clears_previous_failure() {
        let (ledger, _) = ledger();
        let recorder = Arc::new(Recorder::default());
        let viewer = ViewerContext::new(Address::repeat_byte(3), Role::Participant);
        let actions = AuctionActions::new(ledger, viewer, recorder.clone(), metrics());

        assert!(actions.place_bid(1, U256::from(5u64)).await.is_err());
        assert!(actions.last_failure(ActionTarget::Auction(1)).is_some());
        assert!(recorder.0.lock().is_empty());

        actions.place_bid(1, U256::from(7u64)).await.unwrap();
        assert!(actions.last_failure(ActionTarget::Auction(1)).is_none());
        assert_eq!(recorder.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn create_and_end_as_admin() {
        let (ledger, _) = ledger();
        let recorder = Arc::new(Recorder::default());
        let admin = ViewerContext::new(ledger.admin_address(), Role::Administrator);
        let actions = AuctionActions::new(ledger.clone(), admin, recorder.clone(), metrics());

        let id = actions
            .create_auction(CreateAuctionRequest {
                item_name: "Desk".into(),
                image_url: String::new(),
                duration_secs: 60,
                starting_bid: U256::ZERO,
            })
            .await
            .unwrap();
        assert_eq!(id, 2);
        actions.end_auction(id).await.unwrap();
        assert_eq!(recorder.0.lock().len(), 2);

        let err = actions.end_auction(id).await.unwrap_err();
        assert_eq!(err.to_string(), "end rejected for auction #2: Auction already ended");
    }
}
