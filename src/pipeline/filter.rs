//! Filter: routes each sample to exactly one of {filtered, blacklist}
//! (invariant I5), matching against "hostname/metric-name" (spec §9 open
//! question, resolved).

use super::{unix_now, BlacklistItem};
use crate::counters::CounterRegistry;
use crate::queue::{Receiver, Sender};
use crate::sample::{full_name, Sample};
use regex::Regex;
use tracing::debug;

/// Runs one Filter worker reading directly from `raw_rx`. Use
/// [`route_one`] instead when several workers need to share a single raw
/// queue receiver (spec §4.3: Filter "may be scaled horizontally").
pub async fn run(
    mut raw_rx: Receiver<Sample>,
    filtered_tx: Sender<Sample>,
    blacklist_tx: Sender<BlacklistItem>,
    blacklist_re: Regex,
    counters: CounterRegistry,
) {
    while let Some(sample) = raw_rx.recv().await {
        route_one(sample, &filtered_tx, &blacklist_tx, &blacklist_re, &counters).await;
    }
}

/// Routes a single sample to exactly one of {filtered, blacklist}
/// (invariant I5). Per-hostname ordering is not preserved across workers
/// that each call this independently (spec §5), which is fine because
/// downstream storage is idempotent on (hostname, metric, timestamp).
///
/// Returns `false` if the destination queue has been closed, signalling
/// the caller to stop.
pub async fn route_one(
    sample: Sample,
    filtered_tx: &Sender<Sample>,
    blacklist_tx: &Sender<BlacklistItem>,
    blacklist_re: &Regex,
    counters: &CounterRegistry,
) -> bool {
    let name = full_name(&sample);
    if blacklist_re.is_match(&name) {
        counters.incr1("filter.rejected");
        let item = BlacklistItem {
            sample,
            now: unix_now(),
        };
        if blacklist_tx.send(item).await.is_err() {
            debug!("filter: blacklist queue closed, stopping");
            return false;
        }
    } else {
        counters.incr1("filter.accepted");
        if filtered_tx.send(sample).await.is_err() {
            debug!("filter: filtered queue closed, stopping");
            return false;
        }
    }
    true
}
