//! End-to-end wiring of Listen -> Filter -> {Send, Blacklist} against real
//! UDP sockets, covering spec §8 scenarios 1-3 and 7 together.

use coco::blacklist::Blacklist;
use coco::codec::{self, TypesDb};
use coco::counters::CounterRegistry;
use coco::pipeline::{drain, filter, listen};
use coco::queue;
use coco::sample::{Sample, Value, ValueKind};
use coco::tier::build_tier;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

fn sample(hostname: &str, plugin: &str, gauge: f64) -> Sample {
    Sample {
        hostname: hostname.into(),
        plugin: plugin.into(),
        plugin_instance: String::new(),
        type_: plugin.into(),
        type_instance: String::new(),
        time: 0,
        time_hr: 0,
        interval: 0,
        interval_hr: 0,
        values: vec![Value::gauge(gauge)],
    }
}

#[tokio::test]
async fn blacklisted_samples_never_reach_send_but_are_recorded() {
    let mut types = TypesDb::new();
    for name in ["memory", "irq"] {
        types.insert(name, vec![ValueKind::Gauge]);
    }
    let types = Arc::new(types);

    let listen_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let listen_addr = listen_socket.local_addr().unwrap();
    drop(listen_socket);

    let (raw_tx, raw_rx) = queue::channel(64);
    let (filtered_tx, mut filtered_rx) = queue::channel(64);
    let (blacklist_tx, blacklist_rx) = queue::channel(64);
    let counters = CounterRegistry::new();
    let blacklist = Blacklist::new();

    let listen_task = tokio::spawn({
        let types = types.clone();
        let raw_tx = raw_tx.clone();
        let counters = counters.clone();
        async move { listen::run(&listen_addr.to_string(), types, raw_tx, counters).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let re = Regex::new("(vmem|irq|entropy|users)").unwrap();
    let filter_task = tokio::spawn(filter::run(raw_rx, filtered_tx, blacklist_tx, re, counters.clone()));
    let blacklist_clone = blacklist.clone();
    let drain_task = tokio::spawn(drain::run(blacklist_rx, blacklist_clone));

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for _ in 0..4 {
        client
            .send_to(&codec::encode(&sample("foo", "memory", 1.0)), listen_addr)
            .await
            .unwrap();
    }
    for _ in 0..10 {
        client
            .send_to(&codec::encode(&sample("foo", "irq", 1.0)), listen_addr)
            .await
            .unwrap();
    }

    let mut received = 0;
    while received < 4 {
        let s = tokio::time::timeout(Duration::from_secs(2), filtered_rx.recv())
            .await
            .expect("timed out waiting for filtered samples")
            .expect("filtered queue closed early");
        assert_eq!(s.hostname, "foo");
        assert_eq!(s.plugin, "memory");
        received += 1;
    }
    assert_eq!(received, 4);

    // give the blacklist worker a moment to drain the 10 irq samples.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(blacklist.snapshot()["foo"].len(), 1);

    listen_task.abort();
    filter_task.abort();
    drain_task.abort();
}

#[tokio::test]
async fn single_tier_round_trip_preserves_gauge_value_exactly() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let receiver_addr = receiver.local_addr().unwrap();

    let mut types = TypesDb::new();
    types.insert("load", vec![ValueKind::Gauge]);

    let tier = build_tier("a", &[receiver_addr.to_string()]).await.unwrap();
    let target = tier.targets[0].clone();

    let s = sample("foo", "load", 0.5);
    let wire = codec::encode(&s);
    tier.connections.get(&target).unwrap().send(&wire).await.unwrap();

    let mut buf = [0u8; 1452];
    let (len, _) = tokio::time::timeout(Duration::from_secs(1), receiver.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let decoded = codec::decode(&buf[..len], &types).unwrap();
    assert_eq!(decoded[0].values[0].numeric, 0.5);
}
