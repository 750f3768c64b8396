use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use app::{
    config::{default_config, load_config, AppConfig},
    console::{describe_all, describe_dashboard, Command, HELP},
    demo::{demo_accounts, seed_demo},
    CliArgs,
};
use engine::{
    actions::AuctionActions,
    bid_events::BidLogPoller,
    mem_ledger::InMemoryLedger,
    rpc_ledger::RpcLedger,
    runner::SyncEngine,
    session::{connect, ConnectRequest},
    SyncStatus,
};
use engine_core::{
    AccountDirectory, AuctionReader, AuctionWriter, BidStream, Clock, SyncMetrics, SystemClock,
};
use prometheus::Registry;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = CliArgs::parse(env::args().skip(1))?;
    let cfg = match &args.config_path {
        Some(path) => load_config(path).await?,
        None => default_config(),
    };
    let request = match args.connect_request(&cfg.viewer) {
        Ok(request) => request,
        // the demo ledger defaults to its admin account
        Err(_) if args.memory => ConnectRequest::Admin,
        Err(e) => return Err(e),
    };
    let dashboard = args.dashboard || cfg.engine.sync.dashboard;

    let registry = Arc::new(Registry::new());
    spawn_metrics_server(&cfg, registry.clone())?;
    let metrics = SyncMetrics::new(registry.as_ref()).context("register sync metrics")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if args.memory {
        let ledger = Arc::new(InMemoryLedger::new(demo_accounts(), clock.clone()));
        seed_demo(&ledger, clock.now_secs());
        info!("using in-memory demo ledger with {} accounts", demo_accounts().len());
        run_session(&cfg, ledger.clone(), ledger, request, dashboard, clock, metrics).await
    } else {
        let ledger = Arc::new(RpcLedger::new(&cfg.engine.ledger, registry.as_ref())?);
        let stream = Arc::new(BidLogPoller::new(
            ledger.rpc().clone(),
            ledger.contract(),
            Duration::from_millis(cfg.engine.sync.event_poll_ms),
        ));
        info!(rpc = %cfg.engine.ledger.rpc_url, contract = %ledger.contract(), "using json-rpc ledger");
        let result = run_session(&cfg, ledger, stream.clone(), request, dashboard, clock, metrics).await;
        stream.close().await;
        result
    }
}

fn spawn_metrics_server(cfg: &AppConfig, registry: Arc<Registry>) -> Result<()> {
    let addr: SocketAddr = cfg
        .metrics_addr
        .parse()
        .with_context(|| format!("parse metrics_addr {}", cfg.metrics_addr))?;
    tokio::spawn(async move {
        use prometheus::{Encoder, TextEncoder};
        use warp::Filter;

        let metrics_route = warp::path!("metrics").map(move || {
            let encoder = TextEncoder::new();
            let mut buffer = vec![];
            if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
                warn!("encode metrics: {}", e);
            }
            warp::reply::with_header(
                String::from_utf8_lossy(&buffer).into_owned(),
                "content-type",
                "text/plain; version=0.0.4",
            )
        });

        info!("Prometheus metrics server listening on http://{}/metrics", addr);
        warp::serve(metrics_route).run(addr).await;
    });
    Ok(())
}

async fn run_session<L, S>(
    cfg: &AppConfig,
    ledger: Arc<L>,
    stream: Arc<S>,
    request: ConnectRequest,
    dashboard: bool,
    clock: Arc<dyn Clock>,
    metrics: Arc<SyncMetrics>,
) -> Result<()>
where
    L: AuctionReader + AuctionWriter + AccountDirectory + 'static,
    S: BidStream + 'static,
{
    let viewer = connect(ledger.as_ref(), ledger.as_ref(), &request, dashboard)
        .await
        .map_err(|e| anyhow!("connect failed: {e}"))?;
    println!("Connected: {}", viewer.address());
    if viewer.is_admin_view() && !viewer.is_ledger_admin() {
        println!("You are not the admin.");
    }

    let engine = SyncEngine::new(
        &cfg.engine.sync,
        ledger.clone(),
        stream,
        viewer.clone(),
        clock,
        metrics.clone(),
    );
    let coordinator = engine.coordinator();
    let countdowns = engine.countdowns();
    let actions = AuctionActions::new(ledger, viewer, Arc::new(coordinator.clone()), metrics);
    let h_engine = tokio::spawn(engine.run());

    let mut views = coordinator.subscribe();
    let board_rx = countdowns.clone();
    let h_views = tokio::spawn(async move {
        while views.changed().await.is_ok() {
            let view = views.borrow_and_update().clone();
            match &view.status {
                SyncStatus::Loading => {}
                SyncStatus::Synced { .. } => {
                    let board = board_rx.borrow().clone();
                    for line in describe_all(&view.auctions, &board) {
                        println!("{line}");
                    }
                    if let Some(dash) = &view.dashboard {
                        for line in describe_dashboard(dash) {
                            println!("{line}");
                        }
                    }
                }
                SyncStatus::Failed { message, .. } => {
                    println!("Error loading auctions: {message}");
                }
            }
        }
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("read stdin")? {
        let cmd = match Command::parse(&line) {
            Ok(cmd) => cmd,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        match cmd {
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::List => {
                let view = coordinator.current();
                let board = countdowns.borrow().clone();
                for line in describe_all(&view.auctions, &board) {
                    println!("{line}");
                }
            }
            Command::Bid { id, amount } => match actions.place_bid(id, amount).await {
                Ok(()) => println!("Bid placed on #{id}"),
                Err(e) => println!("{e}"),
            },
            Command::End { id } => match actions.end_auction(id).await {
                Ok(()) => println!("Auction #{id} ended"),
                Err(e) => println!("{e}"),
            },
            Command::Create(req) => match actions.create_auction(req).await {
                Ok(id) => println!("Auction #{id} created"),
                Err(e) => println!("{e}"),
            },
        }
    }

    h_views.abort();
    h_engine.abort();
    match h_engine.await {
        Ok(Err(e)) => error!("sync engine failed: {:#}", e),
        _ => info!("session closed"),
    }
    Ok(())
}
