//! REST API
//!
//! TigerStyle: Every response is `200 OK` with a defined text body; failures
//! surface as `NO CONNECTION`, never as an HTTP error.
//!
//! Routes, mounted under `<base_path>/zk-srv-discovery`:
//! - `GET /health` → `IMOK` | `NO CONNECTION`
//! - `GET /getAll?MediaType=text/plain|application/json` → all services
//! - `GET /{serviceName}` → instance rows of one service

use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use beacon_coord::CoordError;
use beacon_core::STATUS_NOT_CONNECTED;
use beacon_registry::{format, MediaType, RegistryError};
use serde::Deserialize;
use std::future::Future;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Resource path below the base path
pub const RESOURCE_PATH: &str = "/zk-srv-discovery";

/// Absolute mount point of the resource routes
pub fn mount_path(base_path: &str) -> String {
    format!("{}{}", base_path.trim_end_matches('/'), RESOURCE_PATH)
}

/// Create the API router
pub fn router(state: AppState) -> Router {
    let mount = mount_path(&state.config().base_path);
    Router::new()
        .nest(&mount, resource_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn resource_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/getAll", get(get_all))
        .route("/:service_name", get(get_service))
}

#[derive(Debug, Deserialize)]
struct GetAllQuery {
    #[serde(rename = "MediaType")]
    media_type: Option<String>,
}

fn text(body: impl Into<String>) -> Response {
    respond(MediaType::TextPlain, body.into())
}

fn respond(media_type: MediaType, body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, media_type.content_type())],
        body,
    )
        .into_response()
}

/// Connection status
async fn health(State(state): State<AppState>) -> Response {
    text(state.probe().status().await.as_str())
}

/// All services, as a table or JSON
async fn get_all(State(state): State<AppState>, Query(query): Query<GetAllQuery>) -> Response {
    let media_type = query
        .media_type
        .as_deref()
        .map(MediaType::parse)
        .unwrap_or_default();

    let result = guarded_query(&state, state.engine().query_all_instances()).await;
    let view = match result {
        Ok(view) => view,
        Err(body) => return text(body),
    };

    let config = state.config();
    match format::render_view(
        &view,
        media_type,
        &config.zk_address,
        config.srv_version.as_deref(),
    ) {
        Ok(body) => respond(media_type, body),
        Err(e) => {
            warn!(error = %e, "Failed rendering discovery view");
            text(STATUS_NOT_CONNECTED)
        }
    }
}

/// Instance rows of one service
async fn get_service(State(state): State<AppState>, Path(service_name): Path<String>) -> Response {
    let result = guarded_query(&state, state.engine().query_instances(&service_name)).await;
    match result {
        Ok(instances) => text(format::instance_table(&instances)),
        Err(body) => text(body),
    }
}

/// Probe status, then run `query` under the request timeout
///
/// Returns the body to send instead when the query cannot be answered.
async fn guarded_query<T, F>(state: &AppState, query: F) -> Result<T, &'static str>
where
    F: Future<Output = Result<T, RegistryError>>,
{
    if !state.probe().status().await.is_ok() {
        return Err(STATUS_NOT_CONNECTED);
    }

    match tokio::time::timeout(state.query_timeout(), query).await {
        Ok(Ok(value)) => Ok(value),
        // An unusable service name has no instances
        Ok(Err(RegistryError::Coordination(CoordError::InvalidPath { .. }))) => Err(""),
        Ok(Err(e)) => {
            warn!(error = %e, "Discovery query failed");
            Err(STATUS_NOT_CONNECTED)
        }
        Err(_) => {
            warn!(timeout_ms = state.query_timeout().as_millis() as u64, "Discovery query timed out");
            Err(STATUS_NOT_CONNECTED)
        }
    }
}
