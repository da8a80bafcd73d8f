use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::services::database::{OrderDirection, UserFilter};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(
        email(message = "Invalid email format"),
        length(max = 255, message = "Email must be at most 255 characters")
    )]
    pub email: Option<String>,

    #[validate(length(min = 1, max = 50, message = "Username must be 1-50 characters"))]
    pub username: Option<String>,

    /// Role code, validated against the role enum by the service.
    #[schema(example = "ADMIN")]
    pub role: Option<String>,

    #[validate(length(min = 1, max = 50, message = "First name must be 1-50 characters"))]
    pub first_name: Option<String>,

    #[validate(length(min = 1, max = 50, message = "Last name must be 1-50 characters"))]
    pub last_name: Option<String>,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,

    #[validate(length(min = 8, message = "Password confirmation must be at least 8 characters"))]
    pub confirm_password: Option<String>,
}

/// Query parameters for the user listing. `filters` arrives JSON-encoded
/// (`[{"field":"role","value":"ADMIN"}]`); unparseable filters are ignored.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub order_by: Option<String>,
    pub order_direction: Option<OrderDirection>,
    pub filters: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateAvatarResponse {
    /// Public path of the stored avatar.
    #[schema(example = "/uploads/avatars/7f7a-avatar.png")]
    pub path: String,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    10
}

impl ListUsersQuery {
    pub fn parsed_filters(&self) -> Vec<UserFilter> {
        match &self.filters {
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring invalid filters JSON");
                Vec::new()
            }),
            None => Vec::new(),
        }
    }
}
