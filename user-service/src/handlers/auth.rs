use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::net::SocketAddr;

use service_core::{error::AppError, response::ApiResponse};

use crate::{
    dtos::auth::{
        LoginRequest, LoginResponse, PublicTokenResponse, RefreshTokenRequest,
        RefreshTokenResponse, RegisterRequest, RegisterResponse,
    },
    utils::{client_ip, ValidatedJson},
    AppState,
};

/// Register a new user
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Passwords do not match"),
        (status = 409, description = "Email or username already exists"),
        (status = 422, description = "Validation error")
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.register(req).await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::new(200, "Register success", res)),
    ))
}

/// Login with email or username and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 422, description = "Validation error")
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.login(req).await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::new(200, "Login success", res)),
    ))
}

/// Obtain the shared header token for this client ip
#[utoipa::path(
    get,
    path = "/api/auth/public-token",
    responses(
        (status = 200, description = "Public token generated", body = PublicTokenResponse)
    ),
    tag = "Authentication"
)]
pub async fn public_token(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let ip = client_ip(&headers, connect_info.map(|info| info.0));
    let res = state.auth_service.public_token(&ip);
    Ok((
        StatusCode::OK,
        Json(ApiResponse::new(200, "Public token generated", res)),
    ))
}

/// Mint a new access token from an expired one plus the refresh token
#[utoipa::path(
    post,
    path = "/api/auth/refresh-token",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Token refreshed", body = RefreshTokenResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 422, description = "Validation error")
    ),
    tag = "Authentication"
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.refresh_token(&headers, req).await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::new(200, "Refresh token success", res)),
    ))
}
