use crate::model::{format_amount, Auction, AuctionId, Snapshot, TimestampSecs, ViewerContext};
use alloy_primitives::{Address, U256};
use serde::Serialize;

pub const PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/200?text=No+Image";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "secs", rename_all = "snake_case")]
pub enum CountdownDisplay {
    Remaining(u64),
    Ended,
}

impl CountdownDisplay {
    pub fn from_remaining(remaining: i64) -> Self {
        if remaining > 0 {
            CountdownDisplay::Remaining(remaining as u64)
        } else {
            CountdownDisplay::Ended
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, CountdownDisplay::Ended)
    }
}

impl std::fmt::Display for CountdownDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountdownDisplay::Remaining(secs) => write!(f, "{secs}"),
            CountdownDisplay::Ended => f.write_str("Ended"),
        }
    }
}

/// The one display state shown for an auction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuctionDisplay {
    /// Auction finalized. `winner` is `None` when nobody bid.
    WinnerAnnouncement { winner: Option<Address> },
    AdminEndControl,
    SellerNotice,
    BidInput,
    AwaitingFinalize,
}

impl AuctionDisplay {
    pub fn offers_bid(&self) -> bool {
        matches!(self, AuctionDisplay::BidInput)
    }

    pub fn offers_end(&self) -> bool {
        matches!(self, AuctionDisplay::AdminEndControl)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuctionView {
    pub id: AuctionId,
    pub item_name: String,
    pub image_url: String,
    pub seller: Address,
    pub end_time: TimestampSecs,
    pub countdown: CountdownDisplay,
    pub highest_bid: U256,
    pub highest_bid_display: String,
    pub highest_bidder: Address,
    pub display: AuctionDisplay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WonAuctionCard {
    pub id: AuctionId,
    pub item_name: String,
    pub image_url: String,
    pub winning_bid: U256,
    pub winning_bid_display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "cards", rename_all = "snake_case")]
pub enum DashboardView {
    NothingWon,
    Won(Vec<WonAuctionCard>),
}

/// Precedence: ended, admin view, seller, still open, awaiting finalize.
pub fn display_for(auction: &Auction, viewer: &ViewerContext, now: TimestampSecs) -> AuctionDisplay {
    if auction.ended {
        let winner = auction.has_bidder().then_some(auction.highest_bidder);
        AuctionDisplay::WinnerAnnouncement { winner }
    } else if viewer.is_admin_view() {
        AuctionDisplay::AdminEndControl
    } else if viewer.address() == auction.seller {
        AuctionDisplay::SellerNotice
    } else if auction.remaining_secs(now) > 0 {
        AuctionDisplay::BidInput
    } else {
        AuctionDisplay::AwaitingFinalize
    }
}

fn image_or_placeholder(url: &str) -> String {
    if url.trim().is_empty() {
        PLACEHOLDER_IMAGE.to_string()
    } else {
        url.to_string()
    }
}

pub fn view_for(auction: &Auction, viewer: &ViewerContext, now: TimestampSecs) -> AuctionView {
    AuctionView {
        id: auction.id,
        item_name: auction.item_name.clone(),
        image_url: image_or_placeholder(&auction.image_url),
        seller: auction.seller,
        end_time: auction.end_time,
        countdown: CountdownDisplay::from_remaining(auction.remaining_secs(now)),
        highest_bid: auction.highest_bid,
        highest_bid_display: format_amount(auction.highest_bid),
        highest_bidder: auction.highest_bidder,
        display: display_for(auction, viewer, now),
    }
}

/// Pure projection of a snapshot into the ordered auction list.
pub fn reconcile(snapshot: &Snapshot, viewer: &ViewerContext, now: TimestampSecs) -> Vec<AuctionView> {
    snapshot
        .auctions()
        .iter()
        .map(|a| view_for(a, viewer, now))
        .collect()
}

/// Won-auction cards, or `None` when the snapshot carries no dashboard data.
pub fn reconcile_dashboard(snapshot: &Snapshot) -> Option<DashboardView> {
    let won = snapshot.won()?;
    let cards: Vec<WonAuctionCard> = won
        .iter()
        .filter_map(|id| snapshot.get(*id))
        .map(|a| WonAuctionCard {
            id: a.id,
            item_name: a.item_name.clone(),
            image_url: image_or_placeholder(&a.image_url),
            winning_bid: a.highest_bid,
            winning_bid_display: format_amount(a.highest_bid),
        })
        .collect();
    if cards.is_empty() {
        Some(DashboardView::NothingWon)
    } else {
        Some(DashboardView::Won(cards))
    }
}
