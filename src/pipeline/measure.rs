//! Measure: a periodic, independent ticker publishing queue depths and
//! per-target routing statistics (spec §4.3).

use crate::counters::CounterRegistry;
use crate::queue::DepthHandle;
use crate::tier::Tier;
use std::time::Duration;

struct Stats {
    min: usize,
    max: usize,
    sum: usize,
    length: usize,
    avg: f64,
    p95: usize,
}

fn summarize(mut lengths: Vec<usize>) -> Option<Stats> {
    if lengths.is_empty() {
        return None;
    }
    lengths.sort_unstable();
    let length = lengths.len();
    let sum: usize = lengths.iter().sum();
    let idx = ((0.95 * length as f64).floor() as usize).min(length - 1);
    Some(Stats {
        min: lengths[0],
        max: lengths[length - 1],
        sum,
        length,
        avg: sum as f64 / length as f64,
        p95: lengths[idx],
    })
}

fn publish(counters: &CounterRegistry, prefix: &str, stats: &Stats) {
    counters.set_int(&format!("{prefix}.min"), stats.min as i64);
    counters.set_int(&format!("{prefix}.max"), stats.max as i64);
    counters.set_int(&format!("{prefix}.sum"), stats.sum as i64);
    counters.set_int(&format!("{prefix}.length"), stats.length as i64);
    counters.set_float(&format!("{prefix}.avg"), stats.avg);
    counters.set_int(&format!("{prefix}.95e"), stats.p95 as i64);
}

/// One tick: publish every queue's current depth and every tier's
/// per-target/aggregate routing statistics.
pub fn tick(queues: &[(&str, &DepthHandle)], tiers: &[Tier], counters: &CounterRegistry) {
    for (name, depth) in queues {
        counters.set_int(&format!("queues.{name}"), depth.get() as i64);
    }

    for tier in tiers {
        let mut all_lengths = Vec::new();
        for target in &tier.targets {
            let Some(hosts) = tier.mappings.get(target) else {
                continue;
            };
            let lengths: Vec<usize> = hosts.iter().map(|h| h.len()).collect();
            all_lengths.extend_from_slice(&lengths);
            if let Some(stats) = summarize(lengths) {
                publish(
                    counters,
                    &format!("hash.metrics_per_host.{}.{}", tier.name, target),
                    &stats,
                );
            }
        }
        if let Some(stats) = summarize(all_lengths) {
            publish(
                counters,
                &format!("hash.metrics_per_host.{}.total", tier.name),
                &stats,
            );
        }
    }
}

/// Runs the ticker until the process exits. `interval` default is 10s
/// (spec §6, `measure.interval`).
pub async fn run(interval: Duration, queues: Vec<(String, DepthHandle)>, tiers: std::sync::Arc<Vec<Tier>>, counters: CounterRegistry) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let refs: Vec<(&str, &DepthHandle)> = queues.iter().map(|(n, d)| (n.as_str(), d)).collect();
        tick(&refs, &tiers, &counters);
    }
}
