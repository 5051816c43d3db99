//! The decoded collectd sample and its identity/name derivation.

use serde::{Deserialize, Serialize};

/// One decoded collectd packet (one metric observation).
///
/// Field order here is cosmetic; the wire order that matters for the codec
/// is fixed separately in [`crate::codec`] (spec invariant I6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub hostname: String,
    pub plugin: String,
    pub plugin_instance: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub type_instance: String,

    /// Zero means "omit on encode" (spec §3).
    pub time: u64,
    pub time_hr: u64,
    pub interval: u64,
    pub interval_hr: u64,

    pub values: Vec<Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueKind {
    Counter = 0,
    Gauge = 1,
    Derive = 2,
    Absolute = 3,
}

impl ValueKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ValueKind::Counter),
            1 => Some(ValueKind::Gauge),
            2 => Some(ValueKind::Derive),
            3 => Some(ValueKind::Absolute),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub kind: ValueKind,
    /// Gauges carry an IEEE-754 double; counter/derive/absolute carry an
    /// unsigned 64-bit reinterpreted as f64 for storage uniformity (the
    /// bit pattern is restored on encode via `as_bits`/`from_bits`).
    pub numeric: f64,
}

impl Value {
    pub fn gauge(v: f64) -> Self {
        Value {
            kind: ValueKind::Gauge,
            numeric: v,
        }
    }

    pub fn counter(v: u64) -> Self {
        Value {
            kind: ValueKind::Counter,
            numeric: v as f64,
        }
    }

    /// The raw unsigned integer backing a non-gauge value.
    pub fn as_u64(&self) -> u64 {
        self.numeric as u64
    }
}

/// "plugin[/plugin_instance]/type[/type_instance]", empty parts dropped.
pub fn metric_name(sample: &Sample) -> String {
    join_nonempty(&[
        sample.plugin.as_str(),
        sample.plugin_instance.as_str(),
        sample.type_.as_str(),
        sample.type_instance.as_str(),
    ])
}

/// "hostname/<metric_name>", the string matched against the blacklist.
pub fn full_name(sample: &Sample) -> String {
    join_nonempty(&[
        sample.hostname.as_str(),
        sample.plugin.as_str(),
        sample.plugin_instance.as_str(),
        sample.type_.as_str(),
        sample.type_instance.as_str(),
    ])
}

fn join_nonempty(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(plugin: &str, plugin_instance: &str, ty: &str, type_instance: &str) -> Sample {
        Sample {
            hostname: "foo".into(),
            plugin: plugin.into(),
            plugin_instance: plugin_instance.into(),
            type_: ty.into(),
            type_instance: type_instance.into(),
            time: 0,
            time_hr: 0,
            interval: 0,
            interval_hr: 0,
            values: vec![Value::gauge(1.0)],
        }
    }

    #[test]
    fn metric_name_drops_empty_parts() {
        let s = sample("load", "", "load", "");
        assert_eq!(metric_name(&s), "load/load");
    }

    #[test]
    fn metric_name_keeps_instances_when_present() {
        let s = sample("memory", "0", "used", "bytes");
        assert_eq!(metric_name(&s), "memory/0/used/bytes");
    }

    #[test]
    fn full_name_prefixes_hostname() {
        let s = sample("memory", "", "used", "");
        assert_eq!(full_name(&s), "foo/memory/used");
    }

    #[test]
    fn metric_name_is_pure_and_deterministic() {
        let s1 = sample("irq", "7", "irq", "");
        let s2 = sample("irq", "7", "irq", "");
        assert_eq!(metric_name(&s1), metric_name(&s2));
    }
}
