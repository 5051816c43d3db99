//! The read-path Fetch proxy (spec §4.4): resolves a hostname to a target
//! via the same hash used on ingest, and proxies a GET there.

use crate::api::lookup_response;
use crate::counters::CounterRegistry;
use crate::error::CocoError;
use crate::response::json;
use crate::tier::Tier;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::{json as json_value, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::warn;

#[derive(Clone)]
pub struct FetchState {
    pub tiers: Arc<Vec<Tier>>,
    pub counters: CounterRegistry,
    pub client: reqwest::Client,
    /// Overrides the target's own port when proxying, spec §6 `remote_port`.
    pub remote_port: Option<String>,
}

impl FetchState {
    pub fn new(tiers: Arc<Vec<Tier>>, counters: CounterRegistry, proxy_timeout: Duration, remote_port: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(proxy_timeout)
            .build()
            .expect("building the fetch http client");
        FetchState {
            tiers,
            counters,
            client,
            remote_port,
        }
    }
}

pub fn router(state: FetchState) -> Router {
    Router::new()
        .route("/data/:hostname/*rest", get(data))
        .route("/lookup", get(lookup))
        .route("/debug/vars", get(debug_vars))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(DefaultOnResponse::new().include_headers(false)),
        )
        .with_state(state)
}

/// `GET /data/:hostname/*rest`. Spec §9 resolves the tier-fallback open
/// question explicitly: the loop below is structural, but it returns on
/// the very first tier regardless of success or failure, matching the
/// original's observable behaviour rather than the "try next tier on
/// miss" reading suggested by its comments.
async fn data(State(state): State<FetchState>, Path((hostname, rest)): Path<(String, String)>) -> impl IntoResponse {
    for tier in state.tiers.iter() {
        let Some(target) = tier.lookup(&hostname) else {
            let err = CocoError::Lookup(format!("no target for host {hostname:?} in tier {:?}", tier.name));
            state.counters.incr1(err.counter_name());
            return json(error_json("no target for host"));
        };
        let target = target.to_string();

        let remote_host = match (&state.remote_port, target.rsplit_once(':')) {
            (Some(port), Some((host, _))) => format!("{host}:{port}"),
            _ => target.clone(),
        };
        let url = format!("http://{remote_host}/{rest}");

        state.counters.incr1(&format!("target.requests.{target}"));
        let response = match state.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                let err = CocoError::Proxy(format!("upstream request failed: {e}"));
                state.counters.incr1(err.counter_name());
                warn!(target, url, error = %e, "fetch: upstream request failed");
                return json(error_json(&err.to_string()));
            }
        };

        let status = response.status();
        state
            .counters
            .incr1(&format!("target.response.codes.{}", status.as_u16()));
        if !status.is_success() {
            let err = CocoError::Proxy(format!("upstream returned {status}"));
            state.counters.incr1(err.counter_name());
            return json(error_json(&err.to_string()));
        }

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                let err = CocoError::Proxy(format!("reading upstream body: {e}"));
                state.counters.incr1(err.counter_name());
                return json(error_json(&err.to_string()));
            }
        };
        state.counters.incr(&format!("bytes.proxied.{target}"), bytes.len() as i64);

        let mut body: Value = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => {
                let err = CocoError::Proxy(format!("invalid json from upstream: {e}"));
                state.counters.incr1(err.counter_name());
                return json(error_json(&err.to_string()));
            }
        };

        if let Value::Object(map) = &mut body {
            map.insert(
                "_meta".to_string(),
                json_value!({ "host": hostname, "target": target, "url": url }),
            );
        }
        return json(body);
    }

    json(error_json("no tiers configured"))
}

fn error_json(message: &str) -> Value {
    json_value!({ "error": message })
}

async fn lookup(State(state): State<FetchState>, Query(params): Query<LookupParams>) -> impl IntoResponse {
    let result = lookup_response(&state.tiers, &params.name, &state.counters);
    json(json_value!(result))
}

#[derive(Deserialize)]
struct LookupParams {
    name: String,
}

async fn debug_vars(State(state): State<FetchState>) -> impl IntoResponse {
    json(state.counters.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::build_tier;
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn lookup_endpoint_reuses_api_semantics() {
        let s = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = s.local_addr().unwrap().to_string();
        let tier = build_tier("a", &[addr]).await.unwrap();
        let counters = CounterRegistry::new();
        let result = lookup_response(&[tier], "foo", &counters);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn error_json_has_error_key() {
        let v = error_json("boom");
        assert_eq!(v["error"], "boom");
    }
}
