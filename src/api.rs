//! The ingest daemon's HTTP API (spec §4.5): routing tables, blacklist,
//! lookup, and counters. Read-only: the API never mutates routing state
//! after `BuildTiers`.

use crate::blacklist::Blacklist;
use crate::counters::CounterRegistry;
use crate::error::CocoError;
use crate::response::json;
use crate::tier::Tier;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::json as json_value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

#[derive(Clone)]
pub struct ApiState {
    pub tiers: Arc<Vec<Tier>>,
    pub blacklist: Blacklist,
    pub counters: CounterRegistry,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/tiers", get(tiers))
        .route("/blacklisted", get(blacklisted))
        .route("/lookup", get(lookup))
        .route("/servers", get(servers))
        .route("/debug/vars", get(debug_vars))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(DefaultOnResponse::new().include_headers(false)),
        )
        .with_state(state)
}

async fn tiers(State(state): State<ApiState>) -> impl IntoResponse {
    let views: Vec<_> = state.tiers.iter().map(Tier::view).collect();
    json(json_value!(views))
}

async fn blacklisted(State(state): State<ApiState>) -> impl IntoResponse {
    json(json_value!(state.blacklist.snapshot()))
}

#[derive(Deserialize)]
pub struct LookupParams {
    pub name: String,
}

/// Shared by the ingest API and the Fetch proxy's own `/lookup`: a map of
/// tier name -> target, omitting tiers whose lookup misses, plus the
/// `lookup.{tier}` attempt counters recovered from the original
/// implementation.
pub fn lookup_response(tiers: &[Tier], name: &str, counters: &CounterRegistry) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    for tier in tiers {
        counters.incr1(&format!("lookup.{}", tier.name));
        match tier.lookup(name) {
            Some(target) => {
                result.insert(tier.name.clone(), target.to_string());
            }
            None => {
                let err = CocoError::Lookup(format!("no target for {name:?} in tier {:?}", tier.name));
                counters.incr1(err.counter_name());
            }
        }
    }
    result
}

async fn lookup(State(state): State<ApiState>, Query(params): Query<LookupParams>) -> impl IntoResponse {
    let result = lookup_response(&state.tiers, &params.name, &state.counters);
    json(json_value!(result))
}

async fn servers(State(state): State<ApiState>) -> impl IntoResponse {
    let mut out = BTreeMap::new();
    for tier in state.tiers.iter() {
        for (target, hosts) in tier.mappings_snapshot() {
            out.entry(target).or_insert_with(BTreeMap::new).extend(hosts);
        }
    }
    json(json_value!(out))
}

async fn debug_vars(State(state): State<ApiState>) -> impl IntoResponse {
    json(state.counters.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::build_tier;
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn lookup_api_scenario_returns_all_three_tiers() {
        let mut sockets = Vec::new();
        let mut tiers = Vec::new();
        for name in ["a", "b", "c"] {
            let s = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let addr = s.local_addr().unwrap().to_string();
            sockets.push(s);
            tiers.push(build_tier(name, &[addr]).await.unwrap());
        }
        let counters = CounterRegistry::new();
        let result = lookup_response(&tiers, "abc", &counters);
        assert_eq!(result.len(), 3);
        assert!(result.contains_key("a"));
        assert!(result.contains_key("b"));
        assert!(result.contains_key("c"));
        assert_eq!(counters.get_int("lookup.a"), 1);
    }
}
