//! A tier: a named ring of targets plus the live state Send, Measure, and
//! the API surfaces all read (spec §3, §4.2).

use crate::hash::ConsistentHash;
use crate::magic::virtual_replicas_for;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::warn;

/// target -> host -> metric-name -> last-dispatch unix-seconds.
pub type Mappings = Arc<DashMap<String, Arc<DashMap<String, Arc<DashMap<String, u64>>>>>>;

pub struct Tier {
    pub name: String,
    pub targets: Vec<String>,
    pub hash: ConsistentHash,
    /// shadow label (stringified ordinal) -> real target.
    pub shadows: BTreeMap<String, String>,
    pub connections: DashMap<String, UdpSocket>,
    pub mappings: Mappings,
    pub virtual_replicas: u32,
}

/// The subset of a [`Tier`] worth serialising (spec §4.5: connections
/// field omitted from JSON).
#[derive(Serialize)]
pub struct TierView {
    pub name: String,
    pub targets: Vec<String>,
    pub shadows: BTreeMap<String, String>,
    pub mappings: BTreeMap<String, BTreeMap<String, BTreeMap<String, u64>>>,
    pub virtual_replicas: u32,
}

impl Tier {
    /// Resolves `hostname` to a target for this tier: hash lookup over
    /// shadow labels, translated back to the real target via the shadow
    /// table.
    pub fn lookup(&self, hostname: &str) -> Option<&str> {
        let shadow = self.hash.get(hostname)?;
        self.shadows.get(shadow).map(String::as_str)
    }

    pub fn mappings_snapshot(&self) -> BTreeMap<String, BTreeMap<String, BTreeMap<String, u64>>> {
        self.mappings
            .iter()
            .map(|target_entry| {
                let hosts = target_entry
                    .value()
                    .iter()
                    .map(|host_entry| {
                        let metrics = host_entry
                            .value()
                            .iter()
                            .map(|m| (m.key().clone(), *m.value()))
                            .collect();
                        (host_entry.key().clone(), metrics)
                    })
                    .collect();
                (target_entry.key().clone(), hosts)
            })
            .collect()
    }

    pub fn view(&self) -> TierView {
        TierView {
            name: self.name.clone(),
            targets: self.targets.clone(),
            shadows: self.shadows.clone(),
            mappings: self.mappings_snapshot(),
            virtual_replicas: self.virtual_replicas,
        }
    }

    /// Records that `target` is now authoritative for `(hostname, metric)`
    /// as of `now`. Invariant I4: callers must do this before attempting
    /// the UDP write.
    pub fn record_mapping(&self, target: &str, hostname: &str, metric_name: &str, now: u64) {
        let hosts = self.mappings.entry(target.to_string()).or_default().clone();
        let metrics = hosts.entry(hostname.to_string()).or_default().clone();
        metrics.insert(metric_name.to_string(), now);
    }
}

/// Dials every configured target over UDP and assembles the tier's hash
/// ring. A target is added to `connections`/`hash`/`shadows` only if the
/// dial succeeds (invariant I1); dial failure drops that target from the
/// tier entirely rather than failing the boot.
///
/// `SetMagicVirtualReplicaNumber` happens after dialing completes but
/// before any target is added to the ring, exactly as spec §4.2 orders it.
pub async fn build_tier(name: &str, targets: &[String]) -> anyhow::Result<Tier> {
    let connections: DashMap<String, UdpSocket> = DashMap::new();
    let mut connected_targets = Vec::new();

    for target in targets {
        if is_loopback_target(target) {
            warn!(tier = name, target, "target resolves to a loopback address: metrics would loop back to this router");
        }
        match dial(target).await {
            Ok(socket) => {
                connections.insert(target.clone(), socket);
                connected_targets.push(target.clone());
            }
            Err(e) => {
                warn!(tier = name, target, error = %e, "failed to dial target, dropping from tier");
            }
        }
    }

    if connected_targets.is_empty() {
        return Err(crate::error::CocoError::Config(format!(
            "tier {name:?} has no reachable targets"
        ))
        .into());
    }

    let virtual_replicas = virtual_replicas_for(connected_targets.len());
    let mut hash = ConsistentHash::new(virtual_replicas);
    let mut shadows = BTreeMap::new();
    for (ordinal, target) in connected_targets.iter().enumerate() {
        let shadow = ordinal.to_string();
        shadows.insert(shadow.clone(), target.clone());
        hash.add(&shadow);
    }

    Ok(Tier {
        name: name.to_string(),
        targets: connected_targets,
        hash,
        shadows,
        connections,
        mappings: Arc::new(DashMap::new()),
        virtual_replicas,
    })
}

async fn dial(target: &str) -> anyhow::Result<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(target).await?;
    Ok(socket)
}

fn is_loopback_target(target: &str) -> bool {
    let host = target.rsplit_once(':').map(|(h, _)| h).unwrap_or(target);
    host.starts_with("127.") || host == "localhost"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_tier_drops_unreachable_targets_but_keeps_reachable_ones() {
        let good = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let good_addr = good.local_addr().unwrap().to_string();
        drop(good);

        let tier = build_tier("t", &[good_addr.clone()]).await.unwrap();
        assert_eq!(tier.targets, vec![good_addr]);
        assert_eq!(tier.hash.len(), 1);
    }

    #[tokio::test]
    async fn build_tier_fails_when_no_target_is_reachable() {
        let result = build_tier("t", &["not-a-valid-target".to_string()]).await;
        assert!(result.is_err());
    }

    #[test]
    fn loopback_detection_matches_127_and_localhost() {
        assert!(is_loopback_target("127.0.0.1:25826"));
        assert!(is_loopback_target("localhost:25826"));
        assert!(!is_loopback_target("storage-1.example.com:25826"));
    }

    #[tokio::test]
    async fn record_mapping_is_visible_in_snapshot() {
        let good = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let good_addr = good.local_addr().unwrap().to_string();
        drop(good);
        let tier = build_tier("t", &[good_addr.clone()]).await.unwrap();
        tier.record_mapping(&good_addr, "foo", "load/load", 12345);
        let snap = tier.mappings_snapshot();
        assert_eq!(snap[&good_addr]["foo"]["load/load"], 12345);
    }
}
