//! The single Blacklist worker: drains the blacklist queue into the
//! recency map.

use super::BlacklistItem;
use crate::blacklist::Blacklist;
use crate::queue::Receiver;
use crate::sample::full_name;

pub async fn run(mut blacklist_rx: Receiver<BlacklistItem>, blacklist: Blacklist) {
    while let Some(item) = blacklist_rx.recv().await {
        let name = full_name(&item.sample);
        // full_name is "hostname/metric"; split once so the store keys on
        // hostname the way `/blacklisted` nests its JSON.
        let Some((hostname, metric)) = name.split_once('/') else {
            continue;
        };
        blacklist.record(hostname, metric, item.now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{Sample, Value};

    #[tokio::test]
    async fn drains_queue_into_recency_map() {
        let (tx, rx) = crate::queue::channel(8);
        let bl = Blacklist::new();
        let worker = tokio::spawn(run(rx, bl.clone()));

        let sample = Sample {
            hostname: "foo".into(),
            plugin: "irq".into(),
            plugin_instance: "7".into(),
            type_: "irq".into(),
            type_instance: String::new(),
            time: 0,
            time_hr: 0,
            interval: 0,
            interval_hr: 0,
            values: vec![Value::gauge(1.0)],
        };
        tx.send(BlacklistItem { sample, now: 42 }).await.unwrap();
        drop(tx);
        worker.await.unwrap();

        let snap = bl.snapshot();
        assert_eq!(snap["foo"]["irq/7/irq"], 42);
    }
}
