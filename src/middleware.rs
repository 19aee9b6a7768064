//! Request interceptors composed around the application router.

use crate::server::{AppState, HEALTH_PATH};
use crate::store::Visit;
use crate::utils::client_ip;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use tracing::{error, info};

const CONTENT_SECURITY_POLICY: &str = concat!(
    "default-src 'self'; ",
    "script-src 'self' 'unsafe-inline'; ",
    "style-src 'self' 'unsafe-inline'; ",
    "img-src 'self' data: https:; ",
    "font-src 'self' data:; ",
    "media-src 'self'; ",
    "connect-src 'self'; ",
    "object-src 'none'; ",
    "base-uri 'self'; ",
    "frame-ancestors 'none'; ",
    "form-action 'self'",
);

const PERMISSIONS_POLICY: &str = "accelerometer=(), camera=(), geolocation=(), gyroscope=(), \
     magnetometer=(), microphone=(), payment=(), usb=()";

const STRICT_TRANSPORT_SECURITY: &str = "max-age=31536000; includeSubDomains; preload";

pub const NO_CACHE: &str = "no-cache";
pub const CACHE_ONE_WEEK: &str = "public, max-age=604800";
pub const CACHE_ONE_DAY: &str = "public, max-age=86400";

const MEDIA_PREFIX: &str = "/music/";
const ASSETS_PREFIX: &str = "/assets/";
const CACHEABLE_EXTENSIONS: &[&str] = &[
    "css", "js", "jpg", "jpeg", "png", "gif", "svg", "webp", "ico", "woff", "woff2", "ttf", "eot",
    "m4a",
];

/// Response headers added to every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityHeaders {
    /// Emit `Strict-Transport-Security`; only meaningful when this process
    /// terminates TLS.
    pub hsts: bool,
}

impl SecurityHeaders {
    fn apply(self, response: &mut Response) {
        let headers = response.headers_mut();
        let fixed: [(HeaderName, &'static str); 6] = [
            (header::CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY),
            (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
            (HeaderName::from_static("permissions-policy"), PERMISSIONS_POLICY),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            (header::X_FRAME_OPTIONS, "DENY"),
            (header::X_XSS_PROTECTION, "1; mode=block"),
        ];
        for (name, value) in fixed {
            headers.insert(name, HeaderValue::from_static(value));
        }
        if self.hsts {
            headers.insert(
                header::STRICT_TRANSPORT_SECURITY,
                HeaderValue::from_static(STRICT_TRANSPORT_SECURITY),
            );
        }
    }
}

/// Outermost interceptor: identical security headers on every response.
pub async fn security_headers(
    State(policy): State<SecurityHeaders>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    policy.apply(&mut response);
    response
}

/// Records the request for analytics, then hands it on untouched.
///
/// Health probes are skipped. Enrichment and the database write run on a
/// detached task; failures there are logged and never reach the client.
pub async fn track_request(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.uri().path() != HEALTH_PATH {
        record_visit(&state, &request);
    }
    next.run(request).await
}

fn record_visit(state: &AppState, request: &Request) {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let path = request.uri().path().to_string();
    let method = request.method().to_string();

    info!(%method, %path, %ip, %user_agent, "Request");

    let store = state.store.clone();
    let geo = state.geo.clone();
    tokio::spawn(async move {
        let location = geo.locate(&ip).await;
        let visit = Visit {
            ip,
            user_agent,
            path,
            method,
            country: location.country,
            city: location.city,
            ..Visit::default()
        };
        if let Err(err) = store.save_visit(visit).await {
            error!(%err, "Failed to save analytics visit");
        }
    });
}

/// Cache-Control directive for a static file path.
pub fn cache_control_for(path: &str) -> &'static str {
    if path == "/" || path == "/index.html" {
        NO_CACHE
    } else if path.starts_with(MEDIA_PREFIX) {
        CACHE_ONE_WEEK
    } else if path.starts_with(ASSETS_PREFIX) || has_cacheable_extension(path) {
        CACHE_ONE_DAY
    } else {
        NO_CACHE
    }
}

fn has_cacheable_extension(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| {
            CACHEABLE_EXTENSIONS
                .iter()
                .any(|cacheable| ext.eq_ignore_ascii_case(cacheable))
        })
        .unwrap_or(false)
}

/// Wraps the static file service: classifies caching by path and serves
/// preview audio as `audio/mp4` so browsers will play it.
pub async fn static_cache_headers(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control_for(&path)),
    );
    if response.status().is_success()
        && path
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("m4a"))
    {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/mp4"));
    }

    response
}
