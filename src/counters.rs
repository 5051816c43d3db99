//! Process-global counter registry exposed as JSON under `/debug/vars`
//! (spec §4.6), grounded on `coco/coco.go`'s `ExpvarHandler`.
//!
//! Keys are dotted paths (`"coco.send.total"`). A leaf is concurrency-safe
//! on its own: `Int` via an atomic, `Float` via a lock (gauges are set
//! wholesale, not just incremented, so an atomic-compare-swap loop buys
//! nothing). `coco.`/`noodle.`-prefixed keys are nested one level deep
//! under their prefix in the JSON output, stripped of it — the original
//! splits on the *first* dot only, so `"coco.send.total"` becomes
//! `{"coco": {"send.total": ...}}`, not a further-nested tree.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

enum Leaf {
    Int(AtomicI64),
    Float(Mutex<f64>),
}

#[derive(Clone, Default)]
pub struct CounterRegistry {
    leaves: Arc<DashMap<String, Leaf>>,
}

impl CounterRegistry {
    pub fn new() -> Self {
        CounterRegistry::default()
    }

    /// Increments the integer counter at `path` by `delta`, creating it
    /// (starting at 0) if absent.
    pub fn incr(&self, path: &str, delta: i64) {
        self.leaves
            .entry(path.to_string())
            .or_insert_with(|| Leaf::Int(AtomicI64::new(0)));
        if let Some(leaf) = self.leaves.get(path) {
            if let Leaf::Int(n) = &*leaf {
                n.fetch_add(delta, Ordering::Relaxed);
            }
        }
    }

    pub fn incr1(&self, path: &str) {
        self.incr(path, 1);
    }

    pub fn get_int(&self, path: &str) -> i64 {
        match self.leaves.get(path) {
            Some(leaf) => match &*leaf {
                Leaf::Int(n) => n.load(Ordering::Relaxed),
                Leaf::Float(f) => *f.lock() as i64,
            },
            None => 0,
        }
    }

    /// Sets the gauge at `path` to `value`, creating it if absent.
    pub fn set_float(&self, path: &str, value: f64) {
        match self.leaves.entry(path.to_string()).or_insert_with(|| Leaf::Float(Mutex::new(0.0))).value() {
            Leaf::Float(cell) => *cell.lock() = value,
            Leaf::Int(n) => n.store(value as i64, Ordering::Relaxed),
        }
    }

    /// Sets the integer gauge at `path` to `value`, creating it if absent.
    pub fn set_int(&self, path: &str, value: i64) {
        match self.leaves.entry(path.to_string()).or_insert_with(|| Leaf::Int(AtomicI64::new(0))).value() {
            Leaf::Int(n) => n.store(value, Ordering::Relaxed),
            Leaf::Float(cell) => *cell.lock() = value as f64,
        }
    }

    /// Renders the entire registry as the JSON document served under
    /// `/debug/vars`. Each key's value is read independently (per-key
    /// atomic snapshot), not under one global lock.
    pub fn to_json(&self) -> Value {
        let mut top = Map::new();
        let mut coco = Map::new();
        let mut noodle = Map::new();

        for entry in self.leaves.iter() {
            let key = entry.key().clone();
            let value = leaf_to_json(entry.value());
            if let Some(rest) = key.strip_prefix("coco.") {
                coco.insert(rest.to_string(), value);
            } else if let Some(rest) = key.strip_prefix("noodle.") {
                noodle.insert(rest.to_string(), value);
            } else {
                top.insert(key, value);
            }
        }

        top.insert("coco".to_string(), Value::Object(coco));
        top.insert("noodle".to_string(), Value::Object(noodle));
        Value::Object(top)
    }
}

fn leaf_to_json(leaf: &Leaf) -> Value {
    match leaf {
        Leaf::Int(n) => Value::from(n.load(Ordering::Relaxed)),
        Leaf::Float(f) => serde_json::Number::from_f64(*f.lock())
            .map(Value::Number)
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incr_creates_and_accumulates() {
        let reg = CounterRegistry::new();
        reg.incr1("listen.raw");
        reg.incr1("listen.raw");
        assert_eq!(reg.get_int("listen.raw"), 2);
    }

    #[test]
    fn coco_prefixed_keys_are_grouped_and_stripped() {
        let reg = CounterRegistry::new();
        reg.incr1("coco.send.total");
        reg.incr1("coco.send.total");
        reg.incr1("filter.accepted");
        let json = reg.to_json();
        assert_eq!(json["coco"]["send.total"], 2);
        assert_eq!(json["filter.accepted"], 1);
        assert!(json.get("send.total").is_none());
    }

    #[test]
    fn noodle_prefixed_keys_are_grouped_separately_from_coco() {
        let reg = CounterRegistry::new();
        reg.incr1("noodle.bytes.proxied");
        let json = reg.to_json();
        assert_eq!(json["noodle"]["bytes.proxied"], 1);
        assert!(json["coco"].as_object().unwrap().is_empty());
    }

    #[test]
    fn gauges_overwrite_rather_than_accumulate() {
        let reg = CounterRegistry::new();
        reg.set_float("hash.metrics_per_host.a.total.avg", 1.5);
        reg.set_float("hash.metrics_per_host.a.total.avg", 2.5);
        assert_eq!(reg.to_json()["hash.metrics_per_host.a.total.avg"], 2.5);
    }
}
