//! Axum HTTP server: router, listener, graceful shutdown.
//!
//! Every API route goes through [`dispatch`], which reads the mode once per
//! request and runs exactly one of the two paths: forward to the backend, or
//! answer with the route's mock responder.

use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::Router;
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::mock::{self, operation, MockResponse};
use crate::mode::ModeSelector;
use crate::proxy::correlation::{self, CORRELATION_HEADER};
use crate::proxy::forward::{self, ForwardMethod, ForwardRequest};

/// Largest inbound body accepted for forwarding.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared application state. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub mode: ModeSelector,
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(config: GatewayConfig, client: reqwest::Client) -> Self {
        let mode = ModeSelector::new(config.backend.url.as_deref());
        Self {
            config,
            mode,
            client,
        }
    }
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/cluster", post(handle_submit_clustering))
        .route("/api/cluster/jobs", get(handle_list_jobs))
        .route(
            "/api/cluster/job/{job_id}",
            get(handle_job_status).delete(handle_delete_job),
        )
        .route("/api/cluster/encoders", get(handle_list_encoders))
        .route("/api/cluster/export", post(handle_export))
        .route(
            "/api/taxonomy",
            get(handle_list_taxonomies).post(handle_create_taxonomy),
        )
        .route(
            "/api/taxonomy/{tax_id}",
            get(handle_get_taxonomy).delete(handle_delete_taxonomy),
        )
        .route(
            "/api/taxonomy/{tax_id}/category",
            post(handle_create_category),
        )
        .route(
            "/api/taxonomy/{tax_id}/category/{cat_id}",
            patch(handle_update_category).delete(handle_delete_category),
        )
        .route("/api/classify", post(handle_train))
        .route("/api/classify/predict", post(handle_predict))
        .route("/api/models", get(handle_list_models))
        .fallback(handle_fallback)
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Build and run the HTTP server.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.config.server.listen_address.clone();
    let mode = state.mode.mode();

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, mode = %mode, "hub-gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("hub-gateway shut down gracefully");
    Ok(())
}

/// Route one request through live forwarding or the given mock responder.
///
/// The base URL is read once; its presence alone picks the path. Methods the
/// backend cannot serve are rejected before either path runs, so both modes
/// answer them the same way.
async fn dispatch<F>(
    state: &AppState,
    request: Request,
    route: &'static str,
    respond: F,
) -> Response
where
    F: FnOnce() -> MockResponse,
{
    let correlation_id = correlation::generate_id();
    let span = hub_tracing::gateway_request_span!(&correlation_id, state.mode.mode(), route);

    async {
        let method = ForwardMethod::try_from(request.method());
        let mut response = match (method, state.mode.base_url()) {
            (Err(e), _) => e.into_response(),
            (Ok(method), Some(base_url)) => {
                forward_request(state, base_url, method, request, &correlation_id).await
            }
            (Ok(_), None) => respond().into_response(),
        };

        tracing::Span::current().record("status", response.status().as_u16());
        if let Ok(value) = HeaderValue::from_str(&correlation_id) {
            response.headers_mut().insert(CORRELATION_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

/// Turn the inbound request into a [`ForwardRequest`] and forward it.
async fn forward_request(
    state: &AppState,
    base_url: &str,
    method: ForwardMethod,
    request: Request,
    correlation_id: &str,
) -> Response {
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let headers = forward::forwardable_headers(request.headers());

    let body = match read_body(request).await {
        Ok(body) => body,
        Err(e) => return e.into_response(),
    };

    let forward_request = ForwardRequest {
        method,
        path,
        body,
        headers,
    };

    forward::forward(&state.client, base_url, forward_request, correlation_id)
        .await
        .into_response()
}

async fn read_body(request: Request) -> Result<Option<Bytes>, GatewayError> {
    let collected = Limited::new(request.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                tracing::warn!(limit = MAX_BODY_BYTES, "Request body over limit");
                GatewayError::PayloadTooLarge {
                    limit: MAX_BODY_BYTES,
                }
            } else {
                tracing::error!(error = %e, "Failed to read request body");
                GatewayError::InvalidRequest(format!("failed to read request body: {e}"))
            }
        })?;
    let body = collected.to_bytes();
    Ok((!body.is_empty()).then_some(body))
}

// ---- Clustering jobs ----

async fn handle_list_jobs(State(state): State<Arc<AppState>>, request: Request) -> Response {
    dispatch(&state, request, "list_jobs", mock::list_jobs).await
}

async fn handle_job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    request: Request,
) -> Response {
    dispatch(&state, request, "job_status", || {
        mock::job_status(&job_id).into_mock_response()
    })
    .await
}

async fn handle_delete_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    request: Request,
) -> Response {
    dispatch(&state, request, "delete_job", || mock::delete_job(&job_id)).await
}

async fn handle_submit_clustering(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Response {
    dispatch(&state, request, "submit_clustering", || {
        mock::backend_required(operation::SUBMIT_CLUSTERING)
    })
    .await
}

async fn handle_list_encoders(State(state): State<Arc<AppState>>, request: Request) -> Response {
    dispatch(&state, request, "list_encoders", mock::list_encoders).await
}

async fn handle_export(State(state): State<Arc<AppState>>, request: Request) -> Response {
    dispatch(&state, request, "export", || {
        mock::backend_required(operation::EXPORT)
    })
    .await
}

// ---- Taxonomies ----

async fn handle_list_taxonomies(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Response {
    dispatch(&state, request, "list_taxonomies", mock::list_taxonomies).await
}

async fn handle_create_taxonomy(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Response {
    dispatch(&state, request, "create_taxonomy", || {
        mock::backend_required(operation::CREATE_TAXONOMY)
    })
    .await
}

async fn handle_get_taxonomy(
    State(state): State<Arc<AppState>>,
    Path(tax_id): Path<String>,
    request: Request,
) -> Response {
    dispatch(&state, request, "get_taxonomy", || mock::get_taxonomy(&tax_id)).await
}

async fn handle_delete_taxonomy(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Response {
    dispatch(&state, request, "delete_taxonomy", || {
        mock::backend_required(operation::DELETE_TAXONOMY)
    })
    .await
}

async fn handle_create_category(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Response {
    dispatch(&state, request, "create_category", || {
        mock::backend_required(operation::CREATE_CATEGORY)
    })
    .await
}

async fn handle_update_category(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Response {
    dispatch(&state, request, "update_category", || {
        mock::backend_required(operation::UPDATE_CATEGORY)
    })
    .await
}

async fn handle_delete_category(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Response {
    dispatch(&state, request, "delete_category", || {
        mock::backend_required(operation::DELETE_CATEGORY)
    })
    .await
}

// ---- Classification ----

async fn handle_train(State(state): State<Arc<AppState>>, request: Request) -> Response {
    dispatch(&state, request, "train", || {
        mock::backend_required(operation::TRAIN)
    })
    .await
}

async fn handle_predict(State(state): State<Arc<AppState>>, request: Request) -> Response {
    dispatch(&state, request, "predict", || {
        mock::backend_required(operation::PREDICT)
    })
    .await
}

async fn handle_list_models(State(state): State<Arc<AppState>>, request: Request) -> Response {
    dispatch(&state, request, "list_models", mock::list_models).await
}

/// Catch-all for routes without a dedicated handler.
///
/// Live mode forwards them unchanged; mock mode has nothing to answer with.
async fn handle_fallback(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    tracing::debug!(path = %path, mode = %state.mode.mode(), "Unmatched route");

    dispatch(&state, request, "fallback", || {
        mock::backend_required(operation::UNKNOWN_ROUTE)
    })
    .await
}

/// Health check endpoint. Answered locally in both modes.
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "status": "ok",
            "mode": state.mode.mode(),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
