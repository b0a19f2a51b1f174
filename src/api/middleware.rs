//! Outer HTTP layers: trusted host, CORS, gzip and request tracing.

use crate::config::ServerConfig;
use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    Router,
};
use std::sync::Arc;
use tower_http::compression::{predicate::SizeAbove, CompressionLayer};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Wrap `router` in every outer layer configured for the server.
///
/// Layers added last run first: trusted-host rejects before CORS and
/// compression see the request.
pub fn apply(router: Router, config: &ServerConfig) -> Result<Router> {
    let allowed_hosts = Arc::new(config.allowed_hosts.clone());

    Ok(router
        .layer(CompressionLayer::new().compress_when(SizeAbove::new(config.gzip_min_bytes)))
        .layer(cors_layer(&config.allowed_origins)?)
        .layer(middleware::from_fn_with_state(allowed_hosts, trusted_host))
        .layer(TraceLayer::new_for_http()))
}

/// CORS for the configured frontend origins.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin '{}'", o)))
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

/// Reject requests whose Host header is not in the allow list.
async fn trusted_host(
    State(allowed): State<Arc<Vec<String>>>,
    request: Request,
    next: Next,
) -> Response {
    match host_of(request.headers()) {
        Some(host) if is_allowed_host(&host, &allowed) => next.run(request).await,
        host => {
            warn!(host = ?host, "Rejected request with untrusted Host header");
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid host header"})),
            )
                .into_response()
        }
    }
}

fn host_of(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::HOST)?.to_str().ok()?;
    // Strip port, keeping bracketed IPv6 literals intact
    let host = match value.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => value,
    };
    Some(host.to_lowercase())
}

/// Exact match, `*` for any host, or `*.domain` for subdomains.
fn is_allowed_host(host: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|pattern| {
        if pattern == "*" {
            true
        } else if let Some(suffix) = pattern.strip_prefix("*.") {
            host.ends_with(&format!(".{}", suffix))
        } else {
            pattern.eq_ignore_ascii_case(host)
        }
    })
}
