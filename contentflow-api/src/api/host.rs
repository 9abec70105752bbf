//! Host header allow-list
//!
//! Every request must name one of `app.allowed_hosts`; anything else is
//! answered with 400 before routing.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::{ApiError, ApiResult, AppState};

/// Middleware rejecting requests whose Host is not allow-listed
pub async fn trusted_host(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or_default();

    if !host_allowed(host, &state.settings.app.allowed_hosts) {
        tracing::warn!(host = %host, "Rejected request for untrusted host");
        return Err(ApiError::BadRequest("Invalid host header".to_string()));
    }

    Ok(next.run(request).await)
}

/// Match a Host header value (port ignored) against allow-list patterns
pub fn host_allowed(host: &str, allowed: &[String]) -> bool {
    let name = strip_port(host).to_ascii_lowercase();
    if name.is_empty() {
        return allowed.iter().any(|pattern| pattern == "*");
    }

    allowed.iter().any(|pattern| {
        let pattern = pattern.to_ascii_lowercase();
        if pattern == "*" {
            true
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            // "*.example.com" covers sub.example.com, not example.com
            suffix.starts_with('.') && name.ends_with(suffix)
        } else {
            name == pattern
        }
    })
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // [::1]:8000
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    host.split(':').next().unwrap_or_default()
}
