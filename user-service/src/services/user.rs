use std::sync::Arc;
use uuid::Uuid;

use service_core::response::Pagination;

use crate::{
    dtos::user::{ListUsersQuery, UpdateAvatarResponse, UpdateUserRequest},
    models::{Role, User, UserResponse},
    services::{
        database::{ListQuery, OrderDirection, UserPatch},
        ServiceError, Storage, UserStore,
    },
    utils::{hash_password, Password},
};

/// Role-gated CRUD over user records plus avatar management.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    storage: Arc<dyn Storage>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, storage: Arc<dyn Storage>) -> Self {
        Self { store, storage }
    }

    pub async fn get_all_users(
        &self,
        query: ListUsersQuery,
    ) -> Result<(Vec<UserResponse>, Pagination), ServiceError> {
        let page = query.page.max(1);
        let limit = query.limit.max(1);

        let list_query = ListQuery {
            search: query.search.clone(),
            page,
            limit,
            order_by: query.order_by.clone(),
            order_direction: query.order_direction.unwrap_or(OrderDirection::Desc),
            filters: query.parsed_filters(),
        };

        let users = self.store.find_all_with_pagination(&list_query).await?;
        let total = self.store.count_search(query.search.as_deref()).await? as u64;

        let pagination = Pagination {
            current_page: page,
            total_page: total.div_ceil(limit),
            total_data: total,
        };

        let data = users.into_iter().map(|u| self.to_response(u)).collect();
        Ok((data, pagination))
    }

    pub async fn get_user_by_id(&self, user_id: Uuid) -> Result<UserResponse, ServiceError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;
        Ok(self.to_response(user))
    }

    pub async fn update_user_by_id(
        &self,
        user_id: Uuid,
        req: UpdateUserRequest,
    ) -> Result<UserResponse, ServiceError> {
        if self.store.count_by_id(user_id).await? == 0 {
            tracing::error!(user_id = %user_id, "User not found");
            return Err(ServiceError::UserNotFound);
        }

        let mut patch = UserPatch::default();

        if let Some(email) = req.email {
            if self.store.count_by_email(user_id, &email).await? > 0 {
                return Err(ServiceError::EmailTaken);
            }
            patch.email = Some(email);
        }

        if let Some(username) = req.username {
            if self.store.count_by_username(user_id, &username).await? > 0 {
                return Err(ServiceError::UsernameTaken);
            }
            patch.username = Some(username);
        }

        if let Some(password) = req.password {
            if req.confirm_password.as_deref() != Some(password.as_str()) {
                return Err(ServiceError::PasswordMismatch);
            }
            let digest = hash_password(&Password::new(password)).map_err(|e| {
                ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e))
            })?;
            patch.password_hash = Some(digest);
        }

        if let Some(role) = req.role {
            let role = Role::parse(&role).ok_or(ServiceError::InvalidRole)?;
            patch.role = Some(role.as_str().to_string());
        }

        if req.first_name.is_some() || req.last_name.is_some() {
            let fullname = [req.first_name.as_deref(), req.last_name.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            patch.fullname = Some(fullname);
        }

        let updated = self.store.update_by_id(user_id, patch).await?;
        tracing::info!(user_id = %user_id, "User updated");

        Ok(self.to_response(updated))
    }

    pub async fn update_avatar(
        &self,
        user_id: Uuid,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<UpdateAvatarResponse, ServiceError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        // Strip any path components a client might smuggle in.
        let basename = filename
            .rsplit(['/', '\\'])
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("avatar");
        let key = format!("avatars/{}-{}", Uuid::new_v4(), basename);

        self.storage.upload(&key, data).await?;

        // The user record is authoritative; losing the old object is not
        // worth failing the upload over.
        if let Some(previous) = &user.avatar {
            if let Err(e) = self.storage.delete(previous).await {
                tracing::warn!(user_id = %user_id, key = %previous, error = %e,
                    "Failed to delete previous avatar");
            }
        }

        self.store
            .update_by_id(
                user_id,
                UserPatch {
                    avatar: Some(key.clone()),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(user_id = %user_id, key = %key, "Avatar updated");

        Ok(UpdateAvatarResponse {
            path: self.storage.url(&key),
        })
    }

    /// Sanitized projection with the avatar key rendered as a public path.
    fn to_response(&self, user: User) -> UserResponse {
        let mut response = user.sanitized();
        response.avatar = response.avatar.map(|key| self.storage.url(&key));
        response
    }
}
