use axum::http::{header, HeaderMap};
use std::sync::Arc;

use crate::{
    dtos::auth::{
        LoginRequest, LoginResponse, PublicTokenResponse, RefreshTokenRequest,
        RefreshTokenResponse, RegisterRequest, RegisterResponse,
    },
    models::User,
    services::{JwtService, ServiceError, UserStore},
    utils::{derive_public_token, hash_password, verify_password, Password},
};

/// Session orchestration: registration, login, token refresh. Holds no
/// per-request state of its own.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    jwt: JwtService,
    public_secret: String,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, jwt: JwtService, public_secret: String) -> Self {
        Self {
            store,
            jwt,
            public_secret,
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, ServiceError> {
        if req.password != req.confirm_password {
            return Err(ServiceError::PasswordMismatch);
        }

        // Collision check first for a friendly error; the store's unique
        // constraints still win the race between concurrent registrations.
        let existing = self
            .store
            .count_by_email_or_username(&req.email, &req.username)
            .await?;
        if existing != 0 {
            tracing::error!(
                email = %req.email,
                username = %req.username,
                "User with that email or username already exists"
            );
            return Err(ServiceError::UserAlreadyExists);
        }

        let password_hash = hash_password(&Password::new(req.password))
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))?;

        let user = self
            .store
            .create_user(User::new(req.email, req.username, password_hash))
            .await?;

        tracing::info!(user_id = %user.id, "User registered");

        Ok(RegisterResponse {
            email: user.email,
            username: user.username,
            role: user.role,
            fullname: user.fullname,
        })
    }

    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, ServiceError> {
        // Unknown identifier and wrong password produce the same error so
        // responses do not reveal whether an account exists.
        let user = self
            .store
            .find_by_email_or_username(&req.email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !verify_password(&Password::new(req.password), &user.password_hash) {
            return Err(ServiceError::InvalidCredentials);
        }

        // Best effort; a failed timestamp write must not fail the login.
        if let Err(e) = self.store.update_last_login(user.id).await {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to update last login");
        }

        let user_id = user.id.to_string();
        let access_token = self
            .jwt
            .generate_access_token(&user_id, user.role().into())
            .map_err(ServiceError::Internal)?;
        let refresh_token = self
            .jwt
            .derive_refresh_token(&user_id)
            .map_err(ServiceError::Internal)?;
        let expires_at = self.jwt.access_token_expires_at();

        tracing::info!(user_id = %user.id, "User logged in");

        Ok(LoginResponse {
            email: user.email,
            username: user.username,
            role: user.role,
            fullname: user.fullname,
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// Mint a new access token from an expired-or-valid access token plus
    /// the caller's derived refresh token. Stateless: nothing is read from
    /// or written to the store, and the refresh token is never re-issued.
    pub async fn refresh_token(
        &self,
        headers: &HeaderMap,
        req: RefreshTokenRequest,
    ) -> Result<RefreshTokenResponse, ServiceError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ServiceError::TokenNotProvided)?;

        let claims = self
            .jwt
            .verify_access_token(token, true)
            .map_err(|_| ServiceError::InvalidAccessToken)?;

        if !self.jwt.verify_refresh_token(&req.refresh_token, &claims.sub) {
            return Err(ServiceError::InvalidRefreshToken);
        }

        let access_token = self
            .jwt
            .generate_access_token(&claims.sub, claims.role)
            .map_err(ServiceError::Internal)?;

        tracing::info!(user_id = %claims.sub, "Access token refreshed");

        Ok(RefreshTokenResponse {
            access_token,
            expires_at: self.jwt.access_token_expires_at(),
        })
    }

    /// Token for the `x-public-token` header, bound to the caller's ip.
    pub fn public_token(&self, client_ip: &str) -> PublicTokenResponse {
        PublicTokenResponse {
            ip: client_ip.to_string(),
            token: derive_public_token(&self.public_secret, client_ip),
        }
    }
}
