use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use service_core::{error::AppError, response::ApiResponse};

use crate::{
    dtos::user::{ListUsersQuery, UpdateAvatarResponse, UpdateUserRequest},
    models::UserResponse,
    utils::ValidatedJson,
    AppState,
};

/// List users with search, filters, ordering, and pagination
#[utoipa::path(
    get,
    path = "/api/users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Paginated user list", body = [UserResponse]),
        (status = 401, description = "Missing or invalid public token")
    ),
    tag = "User"
)]
pub async fn get_all_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (users, pagination) = state.user_service.get_all_users(query).await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::new(200, "Success", users).with_pagination(pagination)),
    ))
}

/// Fetch a single user
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 401, description = "Missing or invalid public token"),
        (status = 404, description = "User not found")
    ),
    tag = "User"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.user_service.get_user_by_id(user_id).await?;
    Ok((StatusCode::OK, Json(ApiResponse::new(200, "Success", res))))
}

/// Update a user record (admin only)
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Bad role or password mismatch"),
        (status = 403, description = "Requires ADMIN role"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Email or username already taken"),
        (status = 422, description = "Validation error")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.user_service.update_user_by_id(user_id, req).await?;
    Ok((StatusCode::OK, Json(ApiResponse::new(200, "Success", res))))
}

/// Upload an avatar image (multipart: `file` + `userId`)
#[utoipa::path(
    post,
    path = "/api/users/avatar",
    responses(
        (status = 201, description = "Avatar stored", body = UpdateAvatarResponse),
        (status = 400, description = "Missing file or user id"),
        (status = 404, description = "User not found")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn update_avatar(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut user_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Multipart error: {}", e)))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("avatar").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Multipart error: {}", e)))?
                    .to_vec();
                file = Some((filename, data));
            }
            Some("userId") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Multipart error: {}", e)))?;
                user_id = Some(value);
            }
            _ => {}
        }
    }

    let (filename, data) =
        file.ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("File is required")))?;
    let user_id = user_id
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("User ID is required")))?
        .parse::<Uuid>()
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid user id")))?;

    let res = state
        .user_service
        .update_avatar(user_id, &filename, data)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(201, "Success", res))))
}
