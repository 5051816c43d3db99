//! The ingest daemon: Listen -> Filter -> Send, plus Blacklist and Measure
//! side channels and the routing-table HTTP API.

use clap::Parser;
use coco::api::{self, ApiState};
use coco::blacklist::Blacklist;
use coco::codec::TypesDb;
use coco::config::Config;
use coco::counters::CounterRegistry;
use coco::pipeline::{drain, filter, listen, measure, send};
use coco::queue;
use coco::tier::{build_tier, Tier};
use regex::Regex;
use std::sync::Arc;
use tracing::info;

const RAW_QUEUE_CAPACITY: usize = 1_000_000;
const FILTERED_QUEUE_CAPACITY: usize = 1_000_000;
const BLACKLIST_QUEUE_CAPACITY: usize = 1_000_000;

/// Filter workers scaled horizontally on the same raw queue (spec §4.3).
const FILTER_WORKERS: usize = 4;

#[derive(Parser, Debug)]
#[command(name = "coco")]
struct Args {
    #[arg(long, default_value = "coco.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let typesdb_text = std::fs::read_to_string(&config.listen.typesdb)
        .map_err(|e| coco::error::CocoError::Config(format!("{}: {e}", config.listen.typesdb)))?;
    let types = Arc::new(
        TypesDb::parse(&typesdb_text).map_err(|e| coco::error::CocoError::Config(e))?,
    );

    let blacklist_re = Regex::new(&config.filter.blacklist)
        .map_err(|e| coco::error::CocoError::Config(format!("invalid blacklist regex: {e}")))?;

    let counters = CounterRegistry::new();

    let mut tiers = Vec::new();
    for (name, tier_config) in &config.tiers {
        let tier = build_tier(name, &tier_config.targets).await?;
        info!(tier = name, targets = tier.targets.len(), virtual_replicas = tier.virtual_replicas, "tier built");
        tiers.push(tier);
    }
    let tiers: Arc<Vec<Tier>> = Arc::new(tiers);

    let blacklist = Blacklist::new();

    let (raw_tx, raw_rx) = queue::channel(RAW_QUEUE_CAPACITY);
    let (filtered_tx, filtered_rx) = queue::channel(FILTERED_QUEUE_CAPACITY);
    let (blacklist_tx, blacklist_rx) = queue::channel(BLACKLIST_QUEUE_CAPACITY);

    let raw_depth = raw_tx.depth_handle();
    let filtered_depth = filtered_tx.depth_handle();
    let blacklist_depth = blacklist_tx.depth_handle();

    tokio::spawn(run_supervised("listen", counters.clone(), {
        let types = types.clone();
        let raw_tx = raw_tx.clone();
        let counters = counters.clone();
        let bind = config.listen.bind.clone();
        move || {
            let types = types.clone();
            let raw_tx = raw_tx.clone();
            let counters = counters.clone();
            let bind = bind.clone();
            async move { listen::run(&bind, types, raw_tx, counters).await }
        }
    }));

    // Filter is horizontally scaled: every worker reads from the same raw
    // queue receiver via a shared mutex so capacity stays a single pool.
    let raw_rx = Arc::new(tokio::sync::Mutex::new(raw_rx));
    for _ in 0..FILTER_WORKERS {
        let raw_rx = raw_rx.clone();
        let filtered_tx = filtered_tx.clone();
        let blacklist_tx = blacklist_tx.clone();
        let blacklist_re = blacklist_re.clone();
        let counters = counters.clone();
        tokio::spawn(async move {
            loop {
                let sample = {
                    let mut rx = raw_rx.lock().await;
                    rx.recv().await
                };
                match sample {
                    Some(sample) => {
                        if !filter::route_one(sample, &filtered_tx, &blacklist_tx, &blacklist_re, &counters).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
        });
    }
    drop(filtered_tx);
    drop(blacklist_tx);

    tokio::spawn(drain::run(blacklist_rx, blacklist.clone()));

    tokio::spawn(send::run(filtered_rx, tiers.clone(), counters.clone()));

    {
        let tiers = tiers.clone();
        let counters = counters.clone();
        let interval = config.measure.interval;
        let queues = vec![
            ("raw".to_string(), raw_depth),
            ("filtered".to_string(), filtered_depth),
            ("blacklist".to_string(), blacklist_depth),
        ];
        tokio::spawn(measure::run(interval, queues, tiers, counters));
    }

    let api_state = ApiState {
        tiers: tiers.clone(),
        blacklist,
        counters: counters.clone(),
    };
    let app = api::router(api_state);
    let listener = tokio::net::TcpListener::bind(&config.api.bind).await?;
    info!(bind = config.api.bind, "api: listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Restarts `spawn_worker`'s future whenever it returns an error, bumping
/// `{stage}.unhandled` — the translation of the original's per-goroutine
/// `recover()` safety net into an explicit restart loop.
async fn run_supervised<F, Fut>(stage: &'static str, counters: CounterRegistry, spawn_worker: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    loop {
        if let Err(e) = spawn_worker().await {
            let err = coco::error::CocoError::Unhandled(e.to_string());
            counters.incr1(&format!("{stage}.unhandled"));
            tracing::error!(stage, error = %err, "worker exited with error, restarting");
        } else {
            break;
        }
    }
}
