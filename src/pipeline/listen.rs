//! Listen: binds one UDP socket, decodes each datagram, and pushes the
//! resulting samples onto the raw queue.

use crate::codec::{self, TypesDb, MAX_DATAGRAM_SIZE};
use crate::counters::CounterRegistry;
use crate::error::CocoError;
use crate::queue::Sender;
use crate::sample::Sample;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Binds `bind` and runs until the socket errors out or the raw queue's
/// receiver is dropped. Each datagram either yields zero or more decoded
/// samples (pushed to `raw_tx`) or is rejected whole ("the decoder fails
/// the packet, not the stream").
pub async fn run(
    bind: &str,
    types: Arc<TypesDb>,
    raw_tx: Sender<Sample>,
    counters: CounterRegistry,
) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(bind).await?;
    tracing::info!(bind, "listen: bound");
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, _peer) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                let err = CocoError::from(e);
                counters.incr1(err.counter_name());
                warn!(error = %err, "listen: socket read error");
                continue;
            }
        };
        counters.incr1("listen.raw");

        match codec::decode(&buf[..len], &types) {
            Ok(samples) => {
                for sample in samples {
                    counters.incr1("listen.decoded");
                    if raw_tx.send(sample).await.is_err() {
                        debug!("listen: raw queue closed, stopping");
                        return Ok(());
                    }
                }
            }
            Err(e) => {
                let err = CocoError::from(e);
                counters.incr1(err.counter_name());
                warn!(error = %err, "listen: malformed datagram, dropping packet");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Value;

    #[tokio::test]
    async fn decodes_and_forwards_a_single_sample() {
        let mut types = TypesDb::new();
        types.insert("load", vec![crate::sample::ValueKind::Gauge, crate::sample::ValueKind::Gauge, crate::sample::ValueKind::Gauge]);
        let types = Arc::new(types);

        let listen_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let bind_addr = listen_socket.local_addr().unwrap();
        drop(listen_socket);

        let (raw_tx, mut raw_rx) = crate::queue::channel(8);
        let counters = CounterRegistry::new();
        let bind_string = bind_addr.to_string();

        let server = tokio::spawn({
            let types = types.clone();
            let counters = counters.clone();
            let bind_string = bind_string.clone();
            async move { run(&bind_string, types, raw_tx, counters).await }
        });

        // give the listener a moment to bind
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let sample = crate::sample::Sample {
            hostname: "foo".into(),
            plugin: "load".into(),
            plugin_instance: String::new(),
            type_: "load".into(),
            type_instance: String::new(),
            time: 0,
            time_hr: 0,
            interval: 0,
            interval_hr: 0,
            values: vec![Value::gauge(1.0), Value::gauge(2.0), Value::gauge(3.0)],
        };
        let wire = crate::codec::encode(&sample);
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&wire, bind_addr).await.unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), raw_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.hostname, "foo");
        assert_eq!(counters.get_int("listen.raw"), 1);
        assert_eq!(counters.get_int("listen.decoded"), 1);

        server.abort();
    }
}
