use alloy_primitives::{utils::parse_ether, U256};
use anyhow::{anyhow, bail, Context, Result};
use engine::ticker::CountdownBoard;
use engine_core::{
    AuctionDisplay, AuctionId, AuctionView, CountdownDisplay, CreateAuctionRequest, DashboardView,
};

pub const HELP: &str = "commands: list | bid <id> <eth> | end <id> | create <name> <duration_secs> <starting_eth> [image_url] | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Bid { id: AuctionId, amount: U256 },
    End { id: AuctionId },
    Create(CreateAuctionRequest),
    Help,
    Quit,
}

fn auction_id(text: Option<&str>) -> Result<AuctionId> {
    let text = text.ok_or_else(|| anyhow!("missing auction id"))?;
    let id: AuctionId = text
        .trim_start_matches('#')
        .parse()
        .with_context(|| format!("bad auction id {text}"))?;
    if id == 0 {
        bail!("auction ids start at 1");
    }
    Ok(id)
}

fn ether(text: Option<&str>) -> Result<U256> {
    let text = text.ok_or_else(|| anyhow!("missing amount"))?;
    parse_ether(text).map_err(|e| anyhow!("bad amount {text}: {e}"))
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(Command::Help);
        };
        let cmd = match verb {
            "list" | "ls" => Command::List,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "bid" => Command::Bid {
                id: auction_id(words.next())?,
                amount: ether(words.next())?,
            },
            "end" => Command::End {
                id: auction_id(words.next())?,
            },
            "create" => {
                let item_name = words
                    .next()
                    .ok_or_else(|| anyhow!("missing item name"))?
                    .replace('_', " ");
                let duration_secs: u64 = words
                    .next()
                    .ok_or_else(|| anyhow!("missing duration"))?
                    .parse()
                    .context("bad duration")?;
                let starting_bid = ether(words.next())?;
                let image_url = words.next().unwrap_or_default().to_string();
                Command::Create(CreateAuctionRequest {
                    item_name,
                    image_url,
                    duration_secs,
                    starting_bid,
                })
            }
            other => bail!("unknown command {other}"),
        };
        if let Some(extra) = words.next() {
            bail!("unexpected argument {extra}");
        }
        Ok(cmd)
    }
}

pub fn describe_display(display: &AuctionDisplay) -> String {
    match display {
        AuctionDisplay::WinnerAnnouncement { winner: Some(w) } => format!("ended, won by {w}"),
        AuctionDisplay::WinnerAnnouncement { winner: None } => "ended, no bids".to_string(),
        AuctionDisplay::AdminEndControl => "[end auction]".to_string(),
        AuctionDisplay::SellerNotice => "you are the seller".to_string(),
        AuctionDisplay::BidInput => "[place bid]".to_string(),
        AuctionDisplay::AwaitingFinalize => "has ended, awaiting finalize".to_string(),
    }
}

/// One console line per auction. A live countdown replaces the snapshot one.
pub fn describe_view(view: &AuctionView, live: Option<CountdownDisplay>) -> String {
    let countdown = live.unwrap_or(view.countdown);
    // bidding closes locally until the resync lands
    let display = if countdown.is_ended() && view.display.offers_bid() {
        AuctionDisplay::AwaitingFinalize
    } else {
        view.display.clone()
    };
    let countdown = match countdown {
        CountdownDisplay::Remaining(secs) => format!("{secs}s left"),
        CountdownDisplay::Ended => countdown.to_string(),
    };
    format!(
        "#{} {} | {} ETH | {} | {}",
        view.id,
        view.item_name,
        view.highest_bid_display,
        countdown,
        describe_display(&display)
    )
}

pub fn describe_all(views: &[AuctionView], board: &CountdownBoard) -> Vec<String> {
    if views.is_empty() {
        return vec!["no auctions".to_string()];
    }
    views
        .iter()
        .map(|v| describe_view(v, board.get(v.id)))
        .collect()
}

pub fn describe_dashboard(dashboard: &DashboardView) -> Vec<String> {
    match dashboard {
        DashboardView::NothingWon => vec!["You haven't won any auctions yet.".to_string()],
        DashboardView::Won(cards) => cards
            .iter()
            .map(|c| format!("won #{} {} for {} ETH", c.id, c.item_name, c.winning_bid_display))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;

    #[test]
    fn parses_bid_in_ether() {
        assert_eq!(
            Command::parse("bid #3 1.5").unwrap(),
            Command::Bid {
                id: 3,
                amount: U256::from(1_500_000_000_000_000_000u64)
            }
        );
        assert!(Command::parse("bid 0 1").is_err());
        assert!(Command::parse("bid 2").is_err());
        assert!(Command::parse("bid 2 lots").is_err());
    }

    #[test]
    fn parses_create() {
        let cmd = Command::parse("create Old_Map 120 0.25 https://img/map.png").unwrap();
        let Command::Create(req) = cmd else {
            panic!("expected create");
        };
        assert_eq!(req.item_name, "Old Map");
        assert_eq!(req.duration_secs, 120);
        assert_eq!(req.starting_bid, U256::from(250_000_000_000_000_000u64));
        assert_eq!(req.image_url, "https://img/map.png");
    }

    #[test]
    fn blank_line_is_help() {
        assert_eq!(Command::parse("   ").unwrap(), Command::Help);
        assert!(Command::parse("end 1 2").is_err());
        assert!(Command::parse("dance").is_err());
    }

    #[test]
    fn live_countdown_overrides_snapshot() {
        let view = AuctionView {
            id: 2,
            item_name: "Lamp".into(),
            image_url: String::new(),
            seller: Address::ZERO,
            end_time: 0,
            countdown: CountdownDisplay::Remaining(40),
            highest_bid: U256::ZERO,
            highest_bid_display: "0.0".into(),
            highest_bidder: Address::ZERO,
            display: AuctionDisplay::BidInput,
        };
        assert_eq!(
            describe_view(&view, Some(CountdownDisplay::Remaining(12))),
            "#2 Lamp | 0.0 ETH | 12s left | [place bid]"
        );
        assert_eq!(
            describe_view(&view, Some(CountdownDisplay::Ended)),
            "#2 Lamp | 0.0 ETH | Ended | has ended, awaiting finalize"
        );
        let seller_view = AuctionView {
            display: AuctionDisplay::SellerNotice,
            ..view.clone()
        };
        assert_eq!(
            describe_view(&seller_view, Some(CountdownDisplay::Ended)),
            "#2 Lamp | 0.0 ETH | Ended | you are the seller"
        );
        assert_eq!(describe_all(&[], &CountdownBoard::default()), vec!["no auctions"]);
    }
}
