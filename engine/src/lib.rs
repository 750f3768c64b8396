pub mod actions;
pub mod bid_events;
pub mod config;
pub mod coordinator;
pub mod fetcher;
pub mod mem_ledger;
pub mod rpc;
pub mod rpc_ledger;
pub mod runner;
pub mod session;
pub mod ticker;

pub use actions::*;
pub use bid_events::BidLogPoller;
pub use config::*;
pub use coordinator::*;
pub use fetcher::*;
pub use mem_ledger::*;
pub use rpc::RpcClient;
pub use rpc_ledger::RpcLedger;
pub use runner::*;
pub use session::*;
pub use ticker::*;
