//! HTTP request handlers for the REST API.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use pneumolens_ai::PipelineError;
use pneumolens_auth::{AccessToken, TokenPair};
use pneumolens_core::{Answer, Prediction};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;

const FILE_FIELD: &str = "file";

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/predict/", post(predict))
        .route("/rag-query/", get(rag_query).post(rag_query))
        .route("/user/create", post(create_user))
        .route("/token/", post(obtain_token))
        .route("/token/refresh/", post(refresh_token))
        .route("/health", get(health_check))
}

async fn predict(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>, ApiError> {
    if state.require_auth {
        authorize(&state, &headers)?;
    }
    let predictor = Arc::clone(state.model.predictor()?);
    let bytes = file_field(multipart)
        .await?
        .ok_or_else(|| ApiError::bad_request("No file provided."))?;
    debug!(bytes = bytes.len(), "received upload");

    let prediction = tokio::task::spawn_blocking(move || predictor.predict_image(&bytes))
        .await?
        .map_err(prediction_failed)?;
    Ok(Json(prediction))
}

/// Contents of the first `file` part, if any.
async fn file_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Option<Bytes>, ApiError> {
    let Ok(mut multipart) = multipart else {
        return Ok(None);
    };
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() == Some(FILE_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            return Ok(Some(bytes));
        }
    }
    Ok(None)
}

fn prediction_failed(e: PipelineError) -> ApiError {
    if e.is_client_error() {
        ApiError::bad_request(e.to_string())
    } else {
        ApiError::internal(format!("Prediction failed: {e}"))
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))?;
    Ok(state.auth.authenticate(token)?)
}

#[derive(Deserialize)]
struct RagQuery {
    query: Option<String>,
}

async fn rag_query(
    State(state): State<AppState>,
    Query(params): Query<RagQuery>,
) -> Result<Json<Answer>, ApiError> {
    let query = params
        .query
        .ok_or_else(|| ApiError::bad_request("Query parameter 'query' is required."))?;
    let responder = Arc::clone(state.responder.responder()?);

    let context = {
        let responder = Arc::clone(&responder);
        let query = query.clone();
        tokio::task::spawn_blocking(move || responder.context(&query)).await??
    };
    let answer = responder.answer(&query, &context).await?;
    Ok(Json(answer))
}

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh: String,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Credentials { username, password } = json_body(body)?;
    let auth = Arc::clone(&state.auth);
    let name = username.clone();
    tokio::task::spawn_blocking(move || auth.create_user(&name, &password)).await??;
    info!(%username, "registered user");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "username": username })),
    ))
}

async fn obtain_token(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let Credentials { username, password } = json_body(body)?;
    let auth = Arc::clone(&state.auth);
    let pair = tokio::task::spawn_blocking(move || auth.issue_tokens(&username, &password)).await??;
    Ok(Json(pair))
}

async fn refresh_token(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<AccessToken>, ApiError> {
    let RefreshRequest { refresh } = json_body(body)?;
    Ok(Json(state.auth.refresh(&refresh)?))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model_loaded": state.model.is_ready(),
        "responder_ready": state.responder.is_ready(),
    }))
}
