use alloy_primitives::{utils::parse_ether, Address, U256};
use engine::mem_ledger::InMemoryLedger;
use engine_core::{Auction, TimestampSecs};

/// Unlocked accounts of the demo ledger. The first one is the admin.
pub fn demo_accounts() -> Vec<Address> {
    (1..=5u8).map(|b| Address::repeat_byte(b * 0x11)).collect()
}

fn eth(text: &str) -> U256 {
    parse_ether(text).unwrap_or(U256::ZERO)
}

/// A few auctions in different states so every display shows up.
pub fn seed_demo(ledger: &InMemoryLedger, now: TimestampSecs) {
    let accounts = demo_accounts();
    let lots = [
        ("Brass Telescope", accounts[1], now + 90, "0.5", Address::ZERO, false),
        ("Walnut Desk", accounts[2], now + 600, "1.2", accounts[3], false),
        ("Vintage Camera", accounts[1], now.saturating_sub(30), "0.8", accounts[4], true),
        ("Oil Lamp", accounts[3], now + 20, "0.1", Address::ZERO, false),
    ];
    for (item_name, seller, end_time, bid, bidder, ended) in lots {
        ledger.seed(Auction {
            id: 0,
            item_name: item_name.to_string(),
            image_url: String::new(),
            seller,
            end_time,
            highest_bid: eth(bid),
            highest_bidder: bidder,
            ended,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{AuctionReader, ManualClock};
    use std::sync::Arc;

    #[tokio::test]
    async fn seeds_ended_auction_with_winner() {
        let ledger = InMemoryLedger::new(demo_accounts(), Arc::new(ManualClock::new(1_000)));
        seed_demo(&ledger, 1_000);
        assert_eq!(ledger.auction_count().await.unwrap(), 4);
        assert_eq!(ledger.won_auctions(demo_accounts()[4]).await.unwrap(), vec![3]);
        assert_eq!(ledger.admin().await.unwrap(), demo_accounts()[0]);
    }
}
