//! Sharding router for a collectd-style telemetry network.
//!
//! Ingests UDP collectd binary datagrams, filters out blacklisted series,
//! and fans each surviving sample out to one target per configured tier
//! by consistent hashing on the originating hostname. A read-path proxy
//! (`noodle`) resolves the same mapping for HTTP data queries.

pub mod api;
pub mod blacklist;
pub mod codec;
pub mod config;
pub mod counters;
pub mod error;
pub mod fetch;
pub mod hash;
pub mod magic;
pub mod pipeline;
pub mod queue;
pub mod response;
pub mod sample;
pub mod tier;
