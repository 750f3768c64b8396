use alloy_primitives::{utils::format_ether, Address, U256};
use serde::{Deserialize, Serialize};

pub type AuctionId = u64;
pub type TimestampSecs = u64;

/// Ledger-owned auction record, as last read by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub item_name: String,
    pub image_url: String,
    pub seller: Address,
    pub end_time: TimestampSecs,
    pub highest_bid: U256,
    pub highest_bidder: Address,
    pub ended: bool,
}

impl Auction {
    /// Seconds until `end_time`; zero or negative once the deadline passed.
    pub fn remaining_secs(&self, now: TimestampSecs) -> i64 {
        remaining_secs(self.end_time, now)
    }

    pub fn has_bidder(&self) -> bool {
        !self.highest_bidder.is_zero()
    }
}

/// Saturates at the `i64` range; ledger end times are arbitrary `u64`.
pub fn remaining_secs(end_time: TimestampSecs, now: TimestampSecs) -> i64 {
    (end_time as i128 - now as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Ether-formatted amount with trailing zeros trimmed (`1.5`, `0.0`).
pub fn format_amount(amount: U256) -> String {
    let raw = format_ether(amount);
    match raw.split_once('.') {
        Some((whole, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                format!("{whole}.0")
            } else {
                format!("{whole}.{frac}")
            }
        }
        None => format!("{raw}.0"),
    }
}

/// One atomically adopted read of the whole auction set.
///
/// Fields are private: a snapshot is built once by the fetcher and then only
/// replaced as a whole, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    auctions: Vec<Auction>,
    total: u64,
    won: Option<Vec<AuctionId>>,
    fetched_at: TimestampSecs,
}

impl Snapshot {
    pub fn new(
        auctions: Vec<Auction>,
        total: u64,
        won: Option<Vec<AuctionId>>,
        fetched_at: TimestampSecs,
    ) -> Self {
        Self {
            auctions,
            total,
            won,
            fetched_at,
        }
    }

    pub fn auctions(&self) -> &[Auction] {
        &self.auctions
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Ids won by the viewer; `None` when the dashboard was not requested.
    pub fn won(&self) -> Option<&[AuctionId]> {
        self.won.as_deref()
    }

    pub fn fetched_at(&self) -> TimestampSecs {
        self.fetched_at
    }

    pub fn get(&self, id: AuctionId) -> Option<&Auction> {
        self.auctions.iter().find(|a| a.id == id)
    }

    /// Compares against the snapshot this one replaces and lists every
    /// auction whose history contradicts the ledger's monotonic rules.
    pub fn regressions_from(&self, previous: &Snapshot) -> Vec<Regression> {
        let mut out = Vec::new();
        for cur in &self.auctions {
            let Some(prev) = previous.get(cur.id) else {
                continue;
            };
            if cur.end_time != prev.end_time {
                out.push(Regression::EndTimeChanged {
                    id: cur.id,
                    before: prev.end_time,
                    after: cur.end_time,
                });
            }
            if prev.ended && !cur.ended {
                out.push(Regression::Reopened { id: cur.id });
            }
            if cur.highest_bid < prev.highest_bid {
                out.push(Regression::BidDecreased {
                    id: cur.id,
                    before: prev.highest_bid,
                    after: cur.highest_bid,
                });
            }
            if prev.ended
                && (cur.highest_bid != prev.highest_bid
                    || cur.highest_bidder != prev.highest_bidder)
            {
                out.push(Regression::ChangedAfterEnd { id: cur.id });
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Regression {
    EndTimeChanged {
        id: AuctionId,
        before: TimestampSecs,
        after: TimestampSecs,
    },
    Reopened {
        id: AuctionId,
    },
    BidDecreased {
        id: AuctionId,
        before: U256,
        after: U256,
    },
    ChangedAfterEnd {
        id: AuctionId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Participant,
}

/// Connected identity for the session. Fixed once the session connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewerContext {
    address: Address,
    role: Role,
    ledger_admin: bool,
    dashboard: bool,
}

impl ViewerContext {
    pub fn new(address: Address, role: Role) -> Self {
        Self {
            address,
            role,
            ledger_admin: false,
            dashboard: false,
        }
    }

    /// Marks whether `address` matches the contract's `admin()`.
    pub fn with_ledger_admin(mut self, ledger_admin: bool) -> Self {
        self.ledger_admin = ledger_admin;
        self
    }

    pub fn with_dashboard(mut self, dashboard: bool) -> Self {
        self.dashboard = dashboard;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_admin_view(&self) -> bool {
        self.role == Role::Administrator
    }

    pub fn is_ledger_admin(&self) -> bool {
        self.ledger_admin
    }

    pub fn wants_dashboard(&self) -> bool {
        self.dashboard
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Startup,
    TimerExpiry,
    PushEvent,
    PostAction,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Startup => "startup",
            TriggerSource::TimerExpiry => "timer_expiry",
            TriggerSource::PushEvent => "push_event",
            TriggerSource::PostAction => "post_action",
        }
    }
}

/// Request to resynchronize. Carries nothing but its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub source: TriggerSource,
}

impl Trigger {
    pub fn new(source: TriggerSource) -> Self {
        Self { source }
    }

    pub fn startup() -> Self {
        Self::new(TriggerSource::Startup)
    }

    pub fn timer_expiry() -> Self {
        Self::new(TriggerSource::TimerExpiry)
    }

    pub fn push_event() -> Self {
        Self::new(TriggerSource::PushEvent)
    }

    pub fn post_action() -> Self {
        Self::new(TriggerSource::PostAction)
    }
}

/// "New bid placed" notification pushed by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidEvent {
    pub auction_id: AuctionId,
    pub bidder: Address,
    pub amount: U256,
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAuctionRequest {
    pub item_name: String,
    pub image_url: String,
    pub duration_secs: u64,
    pub starting_bid: U256,
}
