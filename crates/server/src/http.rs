//! HTTP Endpoints
//!
//! REST API for response generation, language understanding and operations.

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use dialog_switch_core::{NlgRequest, Parse, ResponseVariant};

use crate::metrics::{metrics_handler, record_default_group, record_request};
use crate::state::{AppState, RoleRefresh};
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.config.server.cors_origins,
        state.config.server.cors_enabled,
    );

    Router::new()
        // Response generation
        .route("/nlg", post(generate_response))
        // Language understanding
        .route("/model/parse", post(parse_message))
        // Operations
        .route("/admin/refresh", post(refresh_now))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns permissive layer (for dev)
/// - If cors_origins is empty or all invalid, allows any origin without credentials
/// - Otherwise, uses the configured origins
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No valid CORS origins configured, allowing any origin");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Generate a response for the dialogue manager
async fn generate_response(
    State(state): State<AppState>,
    payload: Result<Json<NlgRequest>, JsonRejection>,
) -> Result<Json<ResponseVariant>, ServerError> {
    record_request("nlg");

    let generator = state
        .nlg
        .as_ref()
        .ok_or_else(|| ServerError::NotFound("the nlg role is not configured".to_string()))?;
    let Json(request) = payload.map_err(|e| ServerError::InvalidRequest(e.body_text()))?;

    let generated = generator.generate(&request)?;
    if generated.selection.is_default() {
        record_default_group("nlg");
    }

    tracing::debug!(
        group = %generated.selection.group,
        default_response = generated.used_default_response,
        "Generated response"
    );

    Ok(Json(generated.response))
}

/// Parse request body
#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub text: String,
}

/// Parse a user message with the chosen group's model
async fn parse_message(
    State(state): State<AppState>,
    payload: Result<Json<ParseRequest>, JsonRejection>,
) -> Result<Json<Parse>, ServerError> {
    record_request("parse");

    let runner = state
        .nlu
        .clone()
        .ok_or_else(|| ServerError::NotFound("the nlu role is not configured".to_string()))?;
    let Json(request) = payload.map_err(|e| ServerError::InvalidRequest(e.body_text()))?;

    let (parse, choice) = runner.parse_with_choice(&request.text)?;
    if choice.is_default() {
        record_default_group("nlu");
    }

    Ok(Json(parse))
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    roles: Vec<RoleRefresh>,
}

/// Run a refresh cycle for every role now
async fn refresh_now(State(state): State<AppState>) -> Result<Json<RefreshResponse>, ServerError> {
    record_request("refresh");

    let roles = tokio::task::spawn_blocking(move || state.refresh_all())
        .await
        .map_err(|e| ServerError::Internal(format!("refresh task failed: {}", e)))?;

    Ok(Json(RefreshResponse { roles }))
}

#[derive(Debug, Serialize)]
struct RoleStatus {
    sources: Vec<String>,
    loaded: Vec<String>,
    default_group: String,
}

/// Health check
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let mut roles = BTreeMap::new();

    if let Some(generator) = &state.nlg {
        let registry = generator.registry();
        roles.insert(
            "nlg",
            RoleStatus {
                sources: registry.source_names(),
                loaded: registry.loaded().into_iter().map(|(name, _)| name).collect(),
                default_group: generator.selector().default_group().to_string(),
            },
        );
    }

    if let Some(runner) = &state.nlu {
        let registry = runner.registry();
        roles.insert(
            "nlu",
            RoleStatus {
                sources: registry.source_names(),
                loaded: registry.loaded().into_iter().map(|(name, _)| name).collect(),
                default_group: runner.default_group().to_string(),
            },
        );
    }

    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "roles": roles,
    }))
}
