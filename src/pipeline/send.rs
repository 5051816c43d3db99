//! Send: for each filtered sample, fan out once per tier in configured
//! order. Handles one sample to completion across all tiers before
//! reading the next (spec §5: this serialises per-sample fan-out).

use crate::codec;
use crate::counters::CounterRegistry;
use crate::error::CocoError;
use crate::queue::Receiver;
use crate::sample::{metric_name, Sample};
use crate::tier::Tier;
use std::sync::Arc;
use tracing::warn;

use super::unix_now;

pub async fn run(mut filtered_rx: Receiver<Sample>, tiers: Arc<Vec<Tier>>, counters: CounterRegistry) {
    while let Some(sample) = filtered_rx.recv().await {
        dispatch(&sample, &tiers, &counters).await;
    }
}

async fn dispatch(sample: &Sample, tiers: &[Tier], counters: &CounterRegistry) {
    let name = metric_name(sample);
    let now = unix_now();

    for tier in tiers {
        let Some(target) = tier.lookup(&sample.hostname) else {
            let err = CocoError::Lookup(format!("no target for host {:?} in tier {:?}", sample.hostname, tier.name));
            counters.incr1(err.counter_name());
            continue;
        };
        let target = target.to_string();

        // Invariant I4: record intent before the write is attempted.
        tier.record_mapping(&target, &sample.hostname, &name, now);

        let wire = codec::encode(sample);
        let wrote = match tier.connections.get(&target) {
            Some(socket) => socket.send(&wire).await,
            // Connections are only ever removed at BuildTiers time, so a
            // missing entry here means the target was never dialed
            // successfully — treat it the same as a write failure.
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "target was never dialed",
            )),
        };

        match wrote {
            Ok(_) => {
                counters.incr1(&format!("send.{target}"));
                counters.incr1("send.total");
                if let Some(hosts) = tier.mappings.get(&target) {
                    let host_count = hosts.len();
                    let metric_count: usize = hosts.iter().map(|h| h.len()).sum();
                    counters.set_int(&format!("metrics.{target}"), metric_count as i64);
                    counters.set_int(&format!("hosts.{target}"), host_count as i64);
                }
            }
            Err(source) => {
                let err = CocoError::IoWrite {
                    target: target.clone(),
                    source,
                };
                counters.incr1(err.counter_name());
                warn!(tier = tier.name, target, error = %err, "send: udp write failed, dropping sample");
            }
        }
    }
}
