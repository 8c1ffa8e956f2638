//! HTTP front end of the edge cache (`proxy` feature).
//!
//! ## Endpoints
//! - GET /health - Health check
//! - GET /api/*path - Cached pass-through to the upstream indexer
//! - GET /admin/cache - `{keys, memory, hits, misses, hitRate, enabled}`
//! - POST /admin/cache - `{"action":"clear"}`, requires `Authorization: Bearer <admin token>`

use super::proxy::{AdminStats, EdgeCache, ProxyResponse};
use axum::{
    body::{Body, Bytes},
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
const X_CACHE_KEY: HeaderName = HeaderName::from_static("x-cache-key");
const X_CACHE_TTL: HeaderName = HeaderName::from_static("x-cache-ttl");
const X_CACHE_BACKEND: HeaderName = HeaderName::from_static("x-cache-backend");

/// Shared by every handler.
#[derive(Clone)]
pub struct ProxyState {
    pub edge: Arc<EdgeCache>,
    pub admin_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "action")]
enum AdminAction {
    Clear,
}

pub fn router(state: ProxyState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([X_CACHE, X_CACHE_KEY, X_CACHE_TTL, X_CACHE_BACKEND]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/*path", get(proxy_handler))
        .route("/admin/cache", get(admin_stats_handler).post(admin_action_handler))
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "OK"
}

fn ttl_header(ttl: Duration) -> String {
    if ttl.is_zero() {
        "permanent".to_string()
    } else {
        ttl.as_secs().to_string()
    }
}

fn cache_control(resp: &ProxyResponse) -> String {
    if !resp.cacheable {
        "no-store".to_string()
    } else if resp.ttl.is_zero() {
        "public, max-age=31536000, immutable".to_string()
    } else {
        format!("public, max-age={}", resp.ttl.as_secs())
    }
}

fn header_value(s: &str) -> HeaderValue {
    HeaderValue::from_str(s).unwrap_or_else(|_| HeaderValue::from_static("invalid"))
}

async fn proxy_handler(
    State(state): State<ProxyState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let path = format!("/{}", path.trim_start_matches('/'));

    let resp = match state.edge.handle(&path, query.as_deref()).await {
        Ok(resp) => resp,
        Err(e) => {
            return (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() })))
                .into_response();
        }
    };

    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = resp
        .content_type
        .as_deref()
        .unwrap_or("application/json")
        .to_string();

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header_value(&content_type));
    headers.insert(header::CACHE_CONTROL, header_value(&cache_control(&resp)));
    headers.insert(X_CACHE, HeaderValue::from_static(resp.cache.as_str()));
    headers.insert(X_CACHE_KEY, header_value(&resp.key));
    headers.insert(X_CACHE_TTL, header_value(&ttl_header(resp.ttl)));
    headers.insert(X_CACHE_BACKEND, HeaderValue::from_static(state.edge.backend()));

    (status, headers, Body::from(resp.body.to_vec())).into_response()
}

async fn admin_stats_handler(State(state): State<ProxyState>) -> Json<AdminStats> {
    Json(state.edge.stats().await)
}

/// Constant-time comparison of the presented bearer token.
fn token_matches(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len()
        && presented
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn authorize(headers: &HeaderMap, admin_token: Option<&str>) -> Result<(), Response> {
    let Some(expected) = admin_token.filter(|t| !t.is_empty()) else {
        log::warn!("🚫 Cache clear refused: no admin token configured");
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "cache administration is disabled" })),
        )
            .into_response());
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if token_matches(token, expected) => Ok(()),
        _ => {
            log::warn!("🚫 Unauthorised cache admin attempt");
            Err((
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(json!({ "error": "unauthorized" })),
            )
                .into_response())
        }
    }
}

async fn admin_action_handler(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(denied) = authorize(&headers, state.admin_token.as_deref()) {
        return denied;
    }

    let action: AdminAction = match serde_json::from_slice(&body) {
        Ok(a) => a,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid action: {e}") })),
            )
                .into_response();
        }
    };

    match action {
        AdminAction::Clear => match state.edge.clear().await {
            Ok(cleared) => Json(json!({
                "cleared": cleared,
                "backend": state.edge.backend(),
            }))
            .into_response(),
            Err(e) => {
                log::warn!("⚠️ Cache clear failed: {e}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": e.to_string() })),
                )
                    .into_response()
            }
        },
    }
}
