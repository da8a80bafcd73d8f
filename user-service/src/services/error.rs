use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("User with that email or username already exists")]
    UserAlreadyExists,

    /// Uniform message for unknown identifier and wrong password, so login
    /// failures do not leak account existence.
    #[error("Email, username, or password is wrong")]
    InvalidCredentials,

    #[error("Token not provided")]
    TokenNotProvided,

    #[error("Invalid access token")]
    InvalidAccessToken,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("User not found")]
    UserNotFound,

    #[error("User with that email already exists")]
    EmailTaken,

    #[error("User with that username already exists")]
    UsernameTaken,

    #[error("Role not exists")]
    InvalidRole,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ServiceError::UserNotFound,
            other => ServiceError::Database(other),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => {
                // Unique-constraint races on insert (two concurrent
                // registrations passing the collision check) surface as a
                // conflict, same as the pre-insert check.
                if e.as_database_error()
                    .map(|db| db.is_unique_violation())
                    .unwrap_or(false)
                {
                    AppError::Conflict(anyhow::anyhow!(
                        "User with that email or username already exists"
                    ))
                } else {
                    AppError::DatabaseError(anyhow::Error::new(e))
                }
            }
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::PasswordMismatch => {
                AppError::BadRequest(anyhow::anyhow!("Passwords do not match"))
            }
            ServiceError::UserAlreadyExists => AppError::Conflict(anyhow::anyhow!(
                "User with that email or username already exists"
            )),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Email, username, or password is wrong"))
            }
            ServiceError::TokenNotProvided => {
                AppError::Unauthorized(anyhow::anyhow!("Token not provided"))
            }
            ServiceError::InvalidAccessToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid access token"))
            }
            ServiceError::InvalidRefreshToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid refresh token"))
            }
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::EmailTaken => {
                AppError::Conflict(anyhow::anyhow!("User with that email already exists"))
            }
            ServiceError::UsernameTaken => {
                AppError::Conflict(anyhow::anyhow!("User with that username already exists"))
            }
            ServiceError::InvalidRole => AppError::BadRequest(anyhow::anyhow!("Role not exists")),
            ServiceError::Storage(e) => AppError::InternalError(anyhow::anyhow!(e)),
        }
    }
}
