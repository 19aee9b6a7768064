use crate::geo::GeoLocator;
use crate::middleware::{SecurityHeaders, security_headers, static_cache_headers, track_request};
use crate::preview::{catalog_for_dir, normalize_theme};
use crate::store::{Lead, Store};
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, HOST, LOCATION};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

pub const HEALTH_PATH: &str = "/healthz";

const HEALTH_PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub geo: Arc<dyn GeoLocator>,
    pub web_root: Arc<PathBuf>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, geo: Arc<dyn GeoLocator>, web_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            geo,
            web_root: Arc::new(web_root.into()),
        }
    }

    fn music_dir(&self) -> PathBuf {
        self.web_root.join("music")
    }
}

/// Stores a contact form submission.
#[instrument(skip_all)]
pub async fn handle_lead(State(state): State<AppState>, body: Bytes) -> Response {
    let lead: Lead = match serde_json::from_slice(&body) {
        Ok(lead) => lead,
        Err(err) => {
            info!(%err, "Rejecting malformed lead payload");
            return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
        }
    };

    info!(
        name = %lead.name,
        business = %lead.business,
        email = %lead.email,
        system = %lead.playback,
        palette = %lead.palette,
        hours_est = lead.hours_est,
        store_count = lead.store_count,
        "Lead received",
    );

    if let Err(err) = state.store.save_lead(lead).await {
        error!(%err, "Failed to save lead");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }

    (StatusCode::CREATED, Json(json!({ "status": "received" }))).into_response()
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    palette: Option<String>,
}

/// Preview track URLs for one palette, read fresh from the music directory.
#[instrument(skip(state))]
pub async fn preview_sources(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> Response {
    let palette = normalize_theme(query.palette.as_deref().unwrap_or_default());
    if palette.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing palette query parameter").into_response();
    }

    match catalog_for_dir(&state.music_dir(), &palette).await {
        Ok(sources) => Json(json!({ "palette": palette, "sources": sources })).into_response(),
        Err(err) => {
            error!(%err, "Failed to load preview sources");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load preview sources").into_response()
        }
    }
}

/// Liveness plus a bounded database ping. HEAD gets headers only.
pub async fn health_check(method: Method, State(state): State<AppState>) -> Response {
    let db_ok = matches!(
        tokio::time::timeout(HEALTH_PING_TIMEOUT, state.store.ping()).await,
        Ok(Ok(()))
    );

    let (status, overall, db) = if db_ok {
        (StatusCode::OK, "ok", "ok")
    } else {
        warn!("Health check degraded: database ping failed");
        (StatusCode::SERVICE_UNAVAILABLE, "degraded", "down")
    };

    let headers = [(CACHE_CONTROL, HeaderValue::from_static("no-store"))];
    if method == Method::HEAD {
        let mut response = (status, headers).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        return response;
    }

    (status, headers, Json(json!({ "status": overall, "db": db }))).into_response()
}

/// Creates the Axum router with all routes and middleware configured.
///
/// Outer to inner: tracing, security headers, analytics, routes. Anything
/// unrouted falls through to the static files under the web root.
pub fn create_app(state: AppState, security: SecurityHeaders) -> Router {
    let static_files = Router::new()
        .fallback_service(ServeDir::new(state.web_root.as_path()))
        .layer(axum::middleware::from_fn(static_cache_headers));

    Router::new()
        .route("/api/lead", post(handle_lead))
        .route("/api/preview-sources", get(preview_sources))
        .route(HEALTH_PATH, get(health_check).head(health_check))
        .fallback_service(static_files)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn_with_state(security, security_headers))
                .layer(axum::middleware::from_fn_with_state(state.clone(), track_request)),
        )
        .with_state(state)
}

/// Rewrites every request to its https equivalent with a permanent redirect.
pub async fn redirect_to_https(headers: HeaderMap, uri: Uri) -> Response {
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()));

    let Some(host) = host else {
        return (StatusCode::BAD_REQUEST, "Missing Host header").into_response();
    };

    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    match HeaderValue::from_str(&format!("https://{host}{path}")) {
        Ok(target) => (StatusCode::MOVED_PERMANENTLY, [(LOCATION, target)]).into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, "Invalid Host header").into_response(),
    }
}

/// Router for the plain HTTP listener in production.
pub fn create_redirect_app() -> Router {
    Router::new()
        .fallback(redirect_to_https)
        .layer(TraceLayer::new_for_http())
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(%err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping servers");
}
