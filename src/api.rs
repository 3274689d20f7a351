//! HTTP surface
//!
//! Every ticker format is served twice: `/{format}` aggregates on each
//! request, `/{format}_cached` goes through the cache.

use crate::{
    aggregator::SnapshotSource,
    cache::CacheManager,
    error::{AdapterError, AggregationError},
    formats::{pair_count, Format},
    health::HealthReporter,
    types::CacheKey,
};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Set on cached responses built from a snapshot past its TTL
pub const STALE_HEADER: &str = "x-cache-stale";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheManager,
    pub source: Arc<dyn SnapshotSource>,
    pub health: Arc<HealthReporter>,
}

/// Errors surfaced to HTTP clients as `{error, code}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Aggregation(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Self::Aggregation(_) => StatusCode::BAD_GATEWAY,
            Self::Adapter(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Aggregation(e) => e.error_code(),
            Self::Adapter(_) => "ADAPTER_INVALID_SNAPSHOT",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Adapter(e) = &self {
            tracing::error!(error = %e, "Snapshot failed validation");
        }
        let body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        (status, Json(body)).into_response()
    }
}

/// Builds the router with tracing and permissive CORS
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/cache_status", get(cache_status_handler))
        .route("/validate", get(validate_handler));

    for format in Format::ALL {
        router = router
            .route(
                &format!("/{}", format.name()),
                get(move |State(state): State<AppState>| live_handler(state, format)),
            )
            .route(
                &format!("/{}_cached", format.name()),
                get(move |State(state): State<AppState>| cached_handler(state, format)),
            );
    }

    router.with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

/// Binds `addr` and serves until `shutdown` resolves
pub async fn start_server<F>(state: AppState, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn index_handler() -> Json<Value> {
    let mut endpoints: Vec<String> = vec!["/health".into(), "/cache_status".into(), "/validate".into()];
    for format in Format::ALL {
        endpoints.push(format!("/{}", format.name()));
        endpoints.push(format!("/{}_cached", format.name()));
    }
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": endpoints,
    }))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health.health().await;
    let status = if report.rpc_reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn cache_status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.cache_status())
}

async fn live_handler(state: AppState, format: Format) -> Result<Json<Value>, ApiError> {
    let snapshot = state.source.build_snapshot().await?;
    Ok(Json(format.render(&snapshot)?))
}

async fn cached_handler(state: AppState, format: Format) -> Result<Response, ApiError> {
    let served = state.cache.get_snapshot(CacheKey::AllPairs).await?;
    let mut response = Json(format.render(&served.snapshot)?).into_response();
    if served.stale {
        response
            .headers_mut()
            .insert(STALE_HEADER, HeaderValue::from_static("true"));
    }
    Ok(response)
}

/// Aggregates once and renders every format against the same snapshot
async fn validate_handler(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let snapshot = match state.source.build_snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            let error = ApiError::from(e);
            let body = json!({
                "success": false,
                "error": error.to_string(),
                "code": error.code(),
                "latencyMs": start.elapsed().as_millis() as u64,
            });
            return (error.status(), Json(body)).into_response();
        }
    };

    let mut formats = Map::new();
    let mut all_rendered = true;
    for format in Format::ALL {
        let result = match format.render(&snapshot) {
            Ok(rendered) => json!({"success": true, "pairs": pair_count(&rendered)}),
            Err(e) => {
                all_rendered = false;
                json!({"success": false, "error": e.to_string(), "code": "ADAPTER_INVALID_SNAPSHOT"})
            }
        };
        formats.insert(format.name().to_string(), result);
    }

    let status = if all_rendered {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let body = json!({
        "success": all_rendered,
        "chainHeight": snapshot.chain_height,
        "blockRange": {
            "start": snapshot.block_range.start,
            "end": snapshot.block_range.end,
            "interval": snapshot.block_range.interval,
        },
        "converters": snapshot.converter_count,
        "pools": snapshot.pools.len(),
        "latencyMs": start.elapsed().as_millis() as u64,
        "formats": formats,
    });
    (status, Json(body)).into_response()
}
