// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the tracking endpoints.
//!
//! Tracking failures are logged, never surfaced to the mail client: a pixel
//! is always a pixel and a valid click always redirects.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use mailroom_core::{HealthStatus, MailroomError};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::TRACKING_PIXEL;
use crate::server::GatewayState;

/// Query string of a click-through link.
#[derive(Debug, Deserialize)]
pub struct ClickParams {
    #[serde(default)]
    pub url: Option<String>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", "degraded", or "unhealthy".
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// GET /track/open/{token}
pub async fn track_open(State(state): State<GatewayState>, Path(token): Path<String>) -> Response {
    if let Err(e) = state.tracking.resolve_open(&token).await {
        error!(error = %e, "failed to record open");
    }
    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
        ],
        TRACKING_PIXEL,
    )
        .into_response()
}

/// GET /track/click/{token}?url=...
///
/// Redirects with 302 to the target; a missing target is a 400, as is a
/// non-http(s) one when strict redirects are on.
pub async fn track_click(
    State(state): State<GatewayState>,
    Path(token): Path<String>,
    Query(params): Query<ClickParams>,
) -> Response {
    let target = match state.tracking.redirect_target(params.url.as_deref()) {
        Ok(target) => target,
        Err(e) => return error_response(&e),
    };
    let location = match state.tracking.resolve_click(&token, Some(&target)).await {
        Ok(location) => location,
        Err(e) => {
            error!(error = %e, "failed to record click");
            target
        }
    };
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// GET|POST /track/unsubscribe/{token}
///
/// Answers identically whether or not the token is known.
pub async fn track_unsubscribe(
    State(state): State<GatewayState>,
    Path(token): Path<String>,
) -> Response {
    match state.tracking.resolve_unsubscribe(&token).await {
        Ok(_) => Html(unsubscribe_page(&state.unsubscribe_message)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to process unsubscribe");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(unsubscribe_page(
                    "We could not process your request. Please try again later.",
                )),
            )
                .into_response()
        }
    }
}

/// GET /health
///
/// Unauthenticated; 503 when the database is unreachable.
pub async fn get_health(State(state): State<GatewayState>) -> Response {
    let (status, detail, code) = match state.db.health_check().await {
        HealthStatus::Healthy => ("ok", None, StatusCode::OK),
        HealthStatus::Degraded(d) => ("degraded", Some(d), StatusCode::OK),
        HealthStatus::Unhealthy(d) => ("unhealthy", Some(d), StatusCode::SERVICE_UNAVAILABLE),
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: state.health.start_time.elapsed().as_secs(),
            detail,
        }),
    )
        .into_response()
}

/// GET /metrics
///
/// Prometheus text exposition; 404 when no exporter is installed.
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn error_response(e: &MailroomError) -> Response {
    let status = match e {
        MailroomError::Validation { .. } => StatusCode::BAD_REQUEST,
        MailroomError::NotFound { .. } => StatusCode::NOT_FOUND,
        MailroomError::Conflict(_) | MailroomError::InvalidStateTransition { .. } => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

fn unsubscribe_page(message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Unsubscribe</title></head>\
         <body><p>{}</p></body></html>\n",
        escape_html(message)
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use mailroom_engine::TrackingResolver;
    use mailroom_storage::Database;
    use tower::ServiceExt;

    use super::*;
    use crate::server::{HealthState, router};

    async fn state() -> (GatewayState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("gw.db").to_str().unwrap())
            .await
            .unwrap();
        let state = GatewayState {
            tracking: TrackingResolver::new(db.clone()),
            db,
            unsubscribe_message: "You have been unsubscribed.".to_string(),
            health: HealthState {
                start_time: Instant::now(),
                prometheus_render: None,
            },
        };
        (state, dir)
    }

    async fn get(state: &GatewayState, uri: &str) -> Response {
        router(state.clone())
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_serves_pixel_for_unknown_token() {
        let (state, _dir) = state().await;
        let resp = get(&state, "/track/open/unknown").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/gif");
        let body = to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], TRACKING_PIXEL);
    }

    #[tokio::test]
    async fn click_without_url_is_bad_request() {
        let (state, _dir) = state().await;
        let resp = get(&state, "/track/click/abc").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(resp.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("url"));

        let resp = get(&state, "/track/click/abc?url=").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn click_redirects_to_any_present_url() {
        let (state, _dir) = state().await;
        let resp = get(&state, "/track/click/abc?url=%2Fspring-sale").await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "/spring-sale");
    }

    #[tokio::test]
    async fn strict_click_rejects_non_http_targets() {
        let (mut state, _dir) = state().await;
        state.tracking = state.tracking.clone().with_strict_redirects(true);
        let resp = get(&state, "/track/click/abc?url=javascript%3Aalert(1)").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = get(&state, "/track/click/abc?url=https%3A%2F%2Fexample.com%2Fdeal").await;
        assert_eq!(resp.status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn click_redirects_even_for_unknown_token() {
        let (state, _dir) = state().await;
        let resp = get(&state, "/track/click/abc?url=https%3A%2F%2Fexample.com%2Fdeal").await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "https://example.com/deal");
    }

    #[tokio::test]
    async fn unsubscribe_page_is_escaped() {
        let (mut state, _dir) = state().await;
        state.unsubscribe_message = "Bye <friend> & co".to_string();
        let resp = get(&state, "/track/unsubscribe/nope").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), 4096).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("Bye &lt;friend&gt; &amp; co"));
    }

    #[tokio::test]
    async fn health_reports_ok_and_metrics_404_without_exporter() {
        let (state, _dir) = state().await;
        let resp = get(&state, "/health").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");

        assert_eq!(get(&state, "/metrics").await.status(), StatusCode::NOT_FOUND);
    }
}
