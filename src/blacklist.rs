//! The blacklist recency store: hostname -> metric-name -> last-seen unix
//! seconds. Append-only in effect; the core never evicts entries.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct Blacklist {
    hosts: Arc<DashMap<String, DashMap<String, u64>>>,
}

impl Blacklist {
    pub fn new() -> Self {
        Blacklist::default()
    }

    pub fn record(&self, hostname: &str, metric_name: &str, now: u64) {
        let metrics = self.hosts.entry(hostname.to_string()).or_default();
        metrics.insert(metric_name.to_string(), now);
    }

    /// A point-in-time copy suitable for JSON serialization (spec §4.5
    /// `/blacklisted`): writers never block readers past the snapshot.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, u64>> {
        self.hosts
            .iter()
            .map(|host_entry| {
                let metrics = host_entry
                    .value()
                    .iter()
                    .map(|m| (m.key().clone(), *m.value()))
                    .collect();
                (host_entry.key().clone(), metrics)
            })
            .collect()
    }

}
