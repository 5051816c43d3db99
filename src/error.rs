//! Typed error kinds (§7) with `anyhow` conversion at stage boundaries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CocoError {
    /// Fatal at boot: invalid bind address, invalid regex, no tiers, no
    /// reachable targets in a tier.
    #[error("config: {0}")]
    Config(String),

    #[error("io read: {0}")]
    IoRead(#[from] std::io::Error),

    #[error("io write to {target}: {source}")]
    IoWrite {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("decode: {0}")]
    Decode(#[from] crate::codec::DecodeError),

    #[error("lookup: {0}")]
    Lookup(String),

    #[error("proxy: {0}")]
    Proxy(String),

    #[error("unhandled: {0}")]
    Unhandled(String),
}

impl CocoError {
    /// The counter name this error kind is tallied under (spec §7).
    pub fn counter_name(&self) -> &'static str {
        match self {
            CocoError::Config(_) => "config",
            CocoError::IoRead(_) => "fetch.receive",
            CocoError::IoWrite { .. } => "send.write",
            CocoError::Decode(_) => "listen.decode_error",
            CocoError::Lookup(_) => "lookup.hash.get",
            CocoError::Proxy(_) => "fetch.proxy_error",
            CocoError::Unhandled(_) => "unhandled",
        }
    }
}
