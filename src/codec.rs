//! The collectd binary wire codec (spec §4.1).
//!
//! Each part is a 2-byte big-endian type, a 2-byte big-endian length
//! (including the 4-byte header), and a payload. String parts carry a
//! trailing zero byte; number parts are big-endian u64 and omitted when
//! zero; the values part carries a kind byte per value followed by the
//! numeric payloads (little-endian f64 for gauges, big-endian u64
//! reinterpretation otherwise).

use crate::sample::{Sample, Value, ValueKind};
use std::collections::HashMap;
use thiserror::Error;

/// collectd 5's default UDP receive buffer size.
pub const MAX_DATAGRAM_SIZE: usize = 1452;

const TYPE_HOST: u16 = 0x0000;
const TYPE_TIME: u16 = 0x0001;
const TYPE_PLUGIN: u16 = 0x0002;
const TYPE_PLUGIN_INSTANCE: u16 = 0x0003;
const TYPE_TYPE: u16 = 0x0004;
const TYPE_TYPE_INSTANCE: u16 = 0x0005;
const TYPE_VALUES: u16 = 0x0006;
const TYPE_INTERVAL: u16 = 0x0007;
const TYPE_TIME_HR: u16 = 0x0008;
const TYPE_INTERVAL_HR: u16 = 0x0009;

const PART_HEADER_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated part header at offset {0}")]
    TruncatedHeader(usize),
    #[error("part length {len} at offset {offset} shorter than header")]
    ShortPartLength { offset: usize, len: u16 },
    #[error("part extends past end of datagram (offset {offset}, len {len}, datagram {total})")]
    PartOverrun {
        offset: usize,
        len: u16,
        total: usize,
    },
    #[error("string part missing terminating null byte")]
    UnterminatedString,
    #[error("string part is not valid utf-8")]
    InvalidUtf8,
    #[error("values part truncated")]
    TruncatedValues,
    #[error("unknown value kind code {0}")]
    UnknownValueKind(u8),
    #[error("values part preceded by no type name")]
    MissingType,
    #[error("unknown collectd type {0:?}: not present in the types database")]
    UnknownType(String),
    #[error("value count {got} does not match types database arity {want} for type {type_name}")]
    ArityMismatch {
        type_name: String,
        want: usize,
        got: usize,
    },
}

/// Maps collectd type names (e.g. "load") to the expected value-kind
/// vector, so decode can reject packets referencing an unknown type
/// without failing the whole stream (spec §4.1, §7 DECODE).
#[derive(Clone, Debug, Default)]
pub struct TypesDb {
    types: HashMap<String, Vec<ValueKind>>,
}

impl TypesDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, type_name: impl Into<String>, kinds: Vec<ValueKind>) {
        self.types.insert(type_name.into(), kinds);
    }

    pub fn get(&self, type_name: &str) -> Option<&[ValueKind]> {
        self.types.get(type_name).map(Vec::as_slice)
    }

    /// Parses a simplified types.db: one type per line, `name kind[,kind...]`
    /// with `#`-prefixed comments and blank lines ignored. Unlike real
    /// collectd types.db this tracks only value kinds, not per-DS
    /// names/min/max, which this codec has no use for.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut db = TypesDb::new();
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let name = fields
                .next()
                .ok_or_else(|| format!("line {}: missing type name", lineno + 1))?;
            let rest: String = fields.collect::<Vec<_>>().join(" ");
            let mut kinds = Vec::new();
            for spec in rest.split(',') {
                let kind_str = spec.split(':').next().unwrap_or("").trim();
                let kind = parse_kind_name(kind_str)
                    .ok_or_else(|| format!("line {}: unknown kind {kind_str:?}", lineno + 1))?;
                kinds.push(kind);
            }
            if kinds.is_empty() {
                return Err(format!("line {}: type {name:?} has no data sources", lineno + 1));
            }
            db.insert(name, kinds);
        }
        Ok(db)
    }
}

fn parse_kind_name(s: &str) -> Option<ValueKind> {
    match s.to_ascii_lowercase().as_str() {
        "counter" => Some(ValueKind::Counter),
        "gauge" => Some(ValueKind::Gauge),
        "derive" => Some(ValueKind::Derive),
        "absolute" => Some(ValueKind::Absolute),
        _ => None,
    }
}

#[derive(Default, Clone)]
struct PendingSample {
    hostname: Option<String>,
    time: u64,
    time_hr: u64,
    interval: u64,
    interval_hr: u64,
    plugin: Option<String>,
    plugin_instance: String,
    type_: Option<String>,
    type_instance: String,
}

/// Decodes zero or more samples from one datagram. A datagram may carry
/// several "values" parts sharing the metadata parts that precede them
/// (standard collectd multi-metric framing); each values part closes out
/// one [`Sample`].
///
/// On any framing or type-lookup error the whole datagram is rejected
/// (spec: "the decoder fails the packet, not the stream") — callers count
/// the loss and move on to the next datagram.
pub fn decode(datagram: &[u8], types: &TypesDb) -> Result<Vec<Sample>, DecodeError> {
    let mut offset = 0usize;
    let mut pending = PendingSample::default();
    let mut samples = Vec::new();

    while offset < datagram.len() {
        if datagram.len() - offset < PART_HEADER_LEN {
            return Err(DecodeError::TruncatedHeader(offset));
        }
        let part_type = u16::from_be_bytes([datagram[offset], datagram[offset + 1]]);
        let part_len = u16::from_be_bytes([datagram[offset + 2], datagram[offset + 3]]);
        if (part_len as usize) < PART_HEADER_LEN {
            return Err(DecodeError::ShortPartLength {
                offset,
                len: part_len,
            });
        }
        let body_start = offset + PART_HEADER_LEN;
        let body_end = offset + part_len as usize;
        if body_end > datagram.len() {
            return Err(DecodeError::PartOverrun {
                offset,
                len: part_len,
                total: datagram.len(),
            });
        }
        let body = &datagram[body_start..body_end];

        match part_type {
            TYPE_HOST => pending.hostname = Some(decode_string(body)?),
            TYPE_PLUGIN => pending.plugin = Some(decode_string(body)?),
            TYPE_PLUGIN_INSTANCE => pending.plugin_instance = decode_string(body)?,
            TYPE_TYPE => pending.type_ = Some(decode_string(body)?),
            TYPE_TYPE_INSTANCE => pending.type_instance = decode_string(body)?,
            TYPE_TIME => pending.time = decode_number(body)?,
            TYPE_TIME_HR => pending.time_hr = decode_number(body)?,
            TYPE_INTERVAL => pending.interval = decode_number(body)?,
            TYPE_INTERVAL_HR => pending.interval_hr = decode_number(body)?,
            TYPE_VALUES => {
                let type_name = pending.type_.clone().ok_or(DecodeError::MissingType)?;
                let expected = types
                    .get(&type_name)
                    .ok_or_else(|| DecodeError::UnknownType(type_name.clone()))?;
                let values = decode_values(body)?;
                if values.len() != expected.len() {
                    return Err(DecodeError::ArityMismatch {
                        type_name,
                        want: expected.len(),
                        got: values.len(),
                    });
                }
                samples.push(Sample {
                    hostname: pending.hostname.clone().unwrap_or_default(),
                    plugin: pending.plugin.clone().unwrap_or_default(),
                    plugin_instance: pending.plugin_instance.clone(),
                    type_: type_name,
                    type_instance: pending.type_instance.clone(),
                    time: pending.time,
                    time_hr: pending.time_hr,
                    interval: pending.interval,
                    interval_hr: pending.interval_hr,
                    values,
                });
            }
            _ => {
                // Unknown part type: skip it. Real collectd streams can
                // carry part types this router doesn't act on (e.g.
                // signatures/encryption framing); only Values and the
                // metadata parts above are meaningful to routing.
            }
        }

        offset = body_end;
    }

    Ok(samples)
}

fn decode_string(body: &[u8]) -> Result<String, DecodeError> {
    let Some((&last, rest)) = body.split_last() else {
        return Err(DecodeError::UnterminatedString);
    };
    if last != 0 {
        return Err(DecodeError::UnterminatedString);
    }
    String::from_utf8(rest.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
}

fn decode_number(body: &[u8]) -> Result<u64, DecodeError> {
    let arr: [u8; 8] = body.try_into().map_err(|_| DecodeError::TruncatedValues)?;
    Ok(u64::from_be_bytes(arr))
}

fn decode_values(body: &[u8]) -> Result<Vec<Value>, DecodeError> {
    if body.len() < 2 {
        return Err(DecodeError::TruncatedValues);
    }
    let n = u16::from_be_bytes([body[0], body[1]]) as usize;
    let kinds_start = 2;
    let kinds_end = kinds_start + n;
    let values_end = kinds_end + n * 8;
    if body.len() < values_end {
        return Err(DecodeError::TruncatedValues);
    }
    let kind_codes = &body[kinds_start..kinds_end];
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let kind = ValueKind::from_code(kind_codes[i])
            .ok_or(DecodeError::UnknownValueKind(kind_codes[i]))?;
        let start = kinds_end + i * 8;
        let bytes: [u8; 8] = body[start..start + 8].try_into().unwrap();
        let numeric = match kind {
            ValueKind::Gauge => f64::from_le_bytes(bytes),
            _ => u64::from_be_bytes(bytes) as f64,
        };
        out.push(Value { kind, numeric });
    }
    Ok(out)
}

/// Encodes a sample into the collectd wire format (spec invariant I6: parts
/// in the fixed order Hostname, Time?, TimeHR?, Interval?, IntervalHR?,
/// Plugin, PluginInstance?, Type, TypeInstance?, Values).
pub fn encode(sample: &Sample) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128);

    encode_string_part(&mut buf, TYPE_HOST, &sample.hostname);
    if sample.time != 0 {
        encode_number_part(&mut buf, TYPE_TIME, sample.time);
    }
    if sample.time_hr != 0 {
        encode_number_part(&mut buf, TYPE_TIME_HR, sample.time_hr);
    }
    if sample.interval != 0 {
        encode_number_part(&mut buf, TYPE_INTERVAL, sample.interval);
    }
    if sample.interval_hr != 0 {
        encode_number_part(&mut buf, TYPE_INTERVAL_HR, sample.interval_hr);
    }
    encode_string_part(&mut buf, TYPE_PLUGIN, &sample.plugin);
    if !sample.plugin_instance.is_empty() {
        encode_string_part(&mut buf, TYPE_PLUGIN_INSTANCE, &sample.plugin_instance);
    }
    encode_string_part(&mut buf, TYPE_TYPE, &sample.type_);
    if !sample.type_instance.is_empty() {
        encode_string_part(&mut buf, TYPE_TYPE_INSTANCE, &sample.type_instance);
    }
    encode_values_part(&mut buf, &sample.values);

    buf
}

fn encode_string_part(buf: &mut Vec<u8>, part_type: u16, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len() + 1 + PART_HEADER_LEN;
    buf.extend_from_slice(&part_type.to_be_bytes());
    buf.extend_from_slice(&(len as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
    buf.push(0);
}

fn encode_number_part(buf: &mut Vec<u8>, part_type: u16, value: u64) {
    buf.extend_from_slice(&part_type.to_be_bytes());
    buf.extend_from_slice(&12u16.to_be_bytes());
    buf.extend_from_slice(&value.to_be_bytes());
}

fn encode_values_part(buf: &mut Vec<u8>, values: &[Value]) {
    let n = values.len();
    let len = 6 + n + 8 * n;
    buf.extend_from_slice(&TYPE_VALUES.to_be_bytes());
    buf.extend_from_slice(&(len as u16).to_be_bytes());
    buf.extend_from_slice(&(n as u16).to_be_bytes());
    for v in values {
        buf.push(v.kind as u8);
    }
    for v in values {
        match v.kind {
            ValueKind::Gauge => buf.extend_from_slice(&v.numeric.to_le_bytes()),
            _ => buf.extend_from_slice(&(v.numeric as u64).to_be_bytes()),
        }
    }
}
