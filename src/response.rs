//! A `Json` wrapper that sets the exact content-type spec §4.4/§6 require:
//! `application/json; charset=utf-8`. Axum's bare `Json<T>` only emits
//! `application/json` (no charset), which the original's `ExpvarHandler`
//! (`coco/coco.go`) does not match.

use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;

pub fn json(value: Value) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        Json(value),
    )
}
