//! The read-path Fetch proxy daemon: resolves hostnames to targets via
//! the same hash rings as `coco` and proxies data queries there.

use clap::Parser;
use coco::config::Config;
use coco::counters::CounterRegistry;
use coco::fetch::{self, FetchState};
use coco::tier::{build_tier, Tier};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "noodle")]
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

    let counters = CounterRegistry::new();

    let mut tiers = Vec::new();
    for (name, tier_config) in &config.tiers {
        let tier = build_tier(name, &tier_config.targets).await?;
        info!(tier = name, targets = tier.targets.len(), "tier built");
        tiers.push(tier);
    }
    let tiers: Arc<Vec<Tier>> = Arc::new(tiers);

    let state = FetchState::new(
        tiers,
        counters,
        config.fetch.proxy_timeout,
        config.fetch.remote_port.clone(),
    );
    let app = fetch::router(state);
    let listener = tokio::net::TcpListener::bind(&config.fetch.bind).await?;
    info!(bind = config.fetch.bind, "fetch: listening");
    axum::serve(listener, app).await?;

    Ok(())
}
