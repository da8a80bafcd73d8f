//! Per-route authorization policies.
//!
//! One explicit table maps route patterns to an auth mode and a required
//! role set; the guard middleware consults it for every request. Routes not
//! listed default to JWT authentication with no role requirement.

use axum::http::Method;

use crate::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// No authentication; later stages are skipped.
    Public,
    /// Requires a valid `x-public-token` header bound to the client ip.
    HeaderToken,
    /// Requires a valid bearer access token.
    Jwt,
}

#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub method: Method,
    pub pattern: &'static str,
    pub auth: AuthMode,
    pub required_roles: &'static [Role],
}

impl RoutePolicy {
    pub fn public(method: Method, pattern: &'static str) -> Self {
        Self {
            method,
            pattern,
            auth: AuthMode::Public,
            required_roles: &[],
        }
    }

    pub fn header_token(method: Method, pattern: &'static str) -> Self {
        Self {
            method,
            pattern,
            auth: AuthMode::HeaderToken,
            required_roles: &[],
        }
    }

    pub fn jwt(method: Method, pattern: &'static str, required_roles: &'static [Role]) -> Self {
        Self {
            method,
            pattern,
            auth: AuthMode::Jwt,
            required_roles,
        }
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        if self.method != *method {
            return false;
        }
        matches_pattern(self.pattern, path)
    }
}

/// Match a route pattern against a concrete path. `:name` segments match any
/// single segment; a trailing `*` segment matches any remainder.
fn matches_pattern(pattern: &str, path: &str) -> bool {
    let mut pattern_segments = pattern.trim_matches('/').split('/');
    let mut path_segments = path.trim_matches('/').split('/');

    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (Some("*"), _) => return true,
            (Some(expected), Some(actual)) => {
                if !expected.starts_with(':') && expected != actual {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: Vec<RoutePolicy>,
}

impl PolicyTable {
    pub fn new(policies: Vec<RoutePolicy>) -> Self {
        Self { policies }
    }

    /// First matching policy wins; unknown routes require plain JWT auth.
    pub fn lookup(&self, method: &Method, path: &str) -> RoutePolicy {
        self.policies
            .iter()
            .find(|p| p.matches(method, path))
            .cloned()
            .unwrap_or(RoutePolicy {
                method: method.clone(),
                pattern: "",
                auth: AuthMode::Jwt,
                required_roles: &[],
            })
    }

    /// Policies for every route this service exposes.
    pub fn routes() -> Self {
        Self::new(vec![
            RoutePolicy::public(Method::GET, "/health"),
            RoutePolicy::public(Method::GET, "/docs"),
            RoutePolicy::public(Method::GET, "/docs/*"),
            RoutePolicy::public(Method::GET, "/.well-known/openapi.json"),
            RoutePolicy::public(Method::POST, "/api/auth/register"),
            RoutePolicy::public(Method::POST, "/api/auth/login"),
            RoutePolicy::public(Method::GET, "/api/auth/public-token"),
            // The refresh flow authenticates itself: it must accept expired
            // access tokens, which the JWT stage would reject.
            RoutePolicy::public(Method::POST, "/api/auth/refresh-token"),
            RoutePolicy::header_token(Method::GET, "/api/users"),
            RoutePolicy::header_token(Method::GET, "/api/users/:id"),
            RoutePolicy::jwt(Method::PUT, "/api/users/:id", &[Role::Admin]),
            RoutePolicy::jwt(
                Method::POST,
                "/api/users/avatar",
                &[Role::Admin, Role::User],
            ),
        ])
    }
}
