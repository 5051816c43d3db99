//! The staged, channel-connected hot pipeline (spec §4.3): Listen -> Filter
//! -> Send, with Blacklist and Measure as side channels. Every stage is a
//! long-lived worker; none catch-and-continue on a framing error without
//! counting the loss.

pub mod drain;
pub mod filter;
pub mod listen;
pub mod measure;
pub mod send;

use crate::sample::Sample;

/// What Filter hands off to the Blacklist worker.
#[derive(Clone, Debug)]
pub struct BlacklistItem {
    pub sample: Sample,
    pub now: u64,
}

pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
