use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, Path, Request, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::{
    auth::UserTable,
    dispatcher::{DispatchError, DispatchResult, Dispatcher},
    render::render,
    session::SessionId,
};

#[cfg(test)]
mod tests;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub users: Arc<UserTable>,
}

#[derive(Debug)]
pub struct ApiError {
    code: &'static str,
    message: String,
    status: StatusCode,
    details: Map<String, Value>,
}

impl ApiError {
    fn new(code: &'static str, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status,
            details: Map::new(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new("invalid_request", StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", StatusCode::UNAUTHORIZED, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new("unavailable", StatusCode::SERVICE_UNAVAILABLE, message)
    }

    fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

impl From<DispatchError> for ApiError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::UnknownSession { session_id } => {
                ApiError::not_found(value.to_string()).with_detail("session_id", session_id)
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    details: Map<String, Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code.to_string(),
                message: self.message,
                details: self.details,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    axum::Json<T>: FromRequest<S>,
    <axum::Json<T> as FromRequest<S>>::Rejection: std::fmt::Display,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::invalid_request(e.to_string()))?;
        Ok(Self(value))
    }
}

pub struct ApiPath<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S>,
    <Path<T> as FromRequestParts<S>>::Rejection: std::fmt::Display,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::invalid_request(e.to_string()))?;
        Ok(Self(value))
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub line: String,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub output: String,
    pub result: DispatchResult,
    pub closed: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    sessions_in_use: usize,
    pool_size: usize,
    log_entries: usize,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/login", post(login))
        .route("/api/sessions/:session_id/commands", post(run_command))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let sessions = state.dispatcher.sessions();
    Json(HealthResponse {
        status: "ok",
        sessions_in_use: sessions.in_use().await,
        pool_size: sessions.pool_size().await,
        log_entries: state.dispatcher.operation_log().len().await,
    })
}

async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if !state.users.authenticate(&req.username, &req.password) {
        return Err(ApiError::unauthorized("invalid username or password"));
    }
    let session_id = state
        .dispatcher
        .login()
        .await
        .ok_or_else(|| ApiError::unavailable("no id available"))?;
    info!(username = %req.username, session_id, "client logged in");
    Ok(Json(LoginResponse { session_id }))
}

async fn run_command(
    State(state): State<AppState>,
    ApiPath(session_id): ApiPath<SessionId>,
    ApiJson(req): ApiJson<CommandRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let result = state.dispatcher.dispatch(session_id, &req.line).await?;
    Ok(Json(CommandResponse {
        output: render(&result),
        closed: result.closes_session(),
        result,
    }))
}
