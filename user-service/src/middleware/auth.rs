//! Guard chain: the ordered authorization pipeline run before every
//! request reaches a handler.

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use subtle::ConstantTimeEq;

use service_core::error::AppError;

use crate::{
    middleware::policy::{AuthMode, RoutePolicy},
    services::{AccessTokenClaims, JwtService},
    utils::{client_ip, derive_public_token},
    AppState,
};

/// Authorization decision for one request, as a pure function of request
/// metadata and the route's policy. Returns the identity context to attach
/// (absent on public and header-token routes), or the denial.
///
/// Stages, in order, all must pass:
/// 1. public routes short-circuit allow;
/// 2. header-token routes require `x-public-token` to match the token
///    derived from the client ip;
/// 3. everything else requires a valid, unexpired bearer access token;
/// 4. a declared role set requires the identity's role(s) to intersect it.
pub fn authorize(
    policy: &RoutePolicy,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    jwt: &JwtService,
    public_secret: &str,
) -> Result<Option<AccessTokenClaims>, AppError> {
    match policy.auth {
        AuthMode::Public => Ok(None),

        AuthMode::HeaderToken => {
            let token = headers
                .get("x-public-token")
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| {
                    AppError::Unauthorized(anyhow::anyhow!("Missing x-public-token header"))
                })?;

            let expected = derive_public_token(public_secret, &client_ip(headers, peer));
            let matches: bool = token.as_bytes().ct_eq(expected.as_bytes()).into();
            if !matches {
                return Err(AppError::Unauthorized(anyhow::anyhow!(
                    "Invalid public token"
                )));
            }

            Ok(None)
        }

        AuthMode::Jwt => {
            let token = headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .ok_or_else(|| {
                    AppError::Unauthorized(anyhow::anyhow!(
                        "Missing or invalid Authorization header"
                    ))
                })?;

            let claims = jwt.verify_access_token(token, false).map_err(|_| {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
            })?;

            if !policy.required_roles.is_empty()
                && !claims.role.intersects(policy.required_roles)
            {
                return Err(AppError::Forbidden(anyhow::anyhow!("Forbidden")));
            }

            Ok(Some(claims))
        }
    }
}

/// Axum adapter: looks up the route's policy, runs the guard chain, and
/// attaches the identity context to the request.
pub async fn authorize_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let policy = state.policies.lookup(req.method(), req.uri().path());
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);

    let identity = authorize(
        &policy,
        req.headers(),
        peer,
        &state.jwt,
        &state.config.security.public_secret,
    )
    .map_err(|e| {
        tracing::warn!(
            method = %req.method(),
            path = %req.uri().path(),
            "Request denied: {}",
            e
        );
        e
    })?;

    if let Some(claims) = identity {
        req.extensions_mut().insert(claims);
    }

    Ok(next.run(req).await)
}

/// Extractor for the identity context a JWT-authenticated request carries.
pub struct AuthUser(pub AccessTokenClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<AccessTokenClaims>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth claims missing from request extensions"
            ))
        })?;

        Ok(AuthUser(claims.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::models::Role;
    use axum::http::{HeaderValue, Method};

    fn jwt_service() -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "test-signing-secret".to_string(),
            refresh_secret: "test-refresh-secret".to_string(),
            access_ttl_secs: 900,
            tz_offset_hours: 7,
        })
        .unwrap()
    }

    fn expired_jwt_service() -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "test-signing-secret".to_string(),
            refresh_secret: "test-refresh-secret".to_string(),
            access_ttl_secs: -120,
            tz_offset_hours: 7,
        })
        .unwrap()
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn public_route_allows_headerless_request() {
        let policy = RoutePolicy::public(Method::POST, "/api/auth/login");
        let result = authorize(&policy, &HeaderMap::new(), None, &jwt_service(), "secret");
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn header_token_route_checks_derived_token() {
        let policy = RoutePolicy::header_token(Method::GET, "/api/users");
        let jwt = jwt_service();

        // Missing header.
        let result = authorize(&policy, &HeaderMap::new(), None, &jwt, "secret");
        assert!(matches!(result, Err(AppError::Unauthorized(_))));

        // Valid token for the forwarded ip.
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        headers.insert(
            "x-public-token",
            HeaderValue::from_str(&derive_public_token("secret", "203.0.113.7")).unwrap(),
        );
        let result = authorize(&policy, &headers, None, &jwt, "secret");
        assert!(matches!(result, Ok(None)));

        // Token derived for a different ip.
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.8"));
        headers.insert(
            "x-public-token",
            HeaderValue::from_str(&derive_public_token("secret", "203.0.113.7")).unwrap(),
        );
        let result = authorize(&policy, &headers, None, &jwt, "secret");
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn header_token_falls_back_to_peer_address() {
        let policy = RoutePolicy::header_token(Method::GET, "/api/users");
        let jwt = jwt_service();
        let peer: SocketAddr = "192.0.2.1:9999".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-public-token",
            HeaderValue::from_str(&derive_public_token("secret", "192.0.2.1")).unwrap(),
        );
        let result = authorize(&policy, &headers, Some(peer), &jwt, "secret");
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn protected_route_requires_bearer_token() {
        let policy = RoutePolicy::jwt(Method::PUT, "/api/users/:id", &[]);
        let jwt = jwt_service();

        let result = authorize(&policy, &HeaderMap::new(), None, &jwt, "secret");
        assert!(matches!(result, Err(AppError::Unauthorized(_))));

        let result = authorize(&policy, &bearer("garbage"), None, &jwt, "secret");
        assert!(matches!(result, Err(AppError::Unauthorized(_))));

        let token = jwt.generate_access_token("u1", Role::User.into()).unwrap();
        let result = authorize(&policy, &bearer(&token), None, &jwt, "secret");
        let claims = result.unwrap().expect("identity attached");
        assert_eq!(claims.sub, "u1");
    }

    #[test]
    fn expired_token_is_denied() {
        let policy = RoutePolicy::jwt(Method::PUT, "/api/users/:id", &[]);
        let expired = expired_jwt_service();
        let token = expired
            .generate_access_token("u1", Role::User.into())
            .unwrap();

        let result = authorize(&policy, &bearer(&token), None, &expired, "secret");
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let policy = RoutePolicy::jwt(Method::PUT, "/api/users/:id", &[Role::Admin]);
        let jwt = jwt_service();

        let token = jwt.generate_access_token("u1", Role::User.into()).unwrap();
        let result = authorize(&policy, &bearer(&token), None, &jwt, "secret");
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let token = jwt.generate_access_token("u1", Role::Admin.into()).unwrap();
        let result = authorize(&policy, &bearer(&token), None, &jwt, "secret");
        assert!(result.is_ok());
    }

    #[test]
    fn role_list_membership_passes() {
        let policy = RoutePolicy::jwt(Method::POST, "/api/users/avatar", &[Role::Admin]);
        let jwt = jwt_service();

        let token = jwt
            .generate_access_token(
                "u1",
                crate::services::RoleClaim::Many(vec![Role::User, Role::Admin]),
            )
            .unwrap();
        let result = authorize(&policy, &bearer(&token), None, &jwt, "secret");
        assert!(result.is_ok());
    }
}
