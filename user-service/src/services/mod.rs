//! Services layer: business logic behind the HTTP handlers.

pub mod auth;
pub mod database;
pub mod error;
pub mod jwt;
pub mod storage;
pub mod user;

pub use auth::AuthService;
pub use database::{InMemoryUserStore, PgUserStore, UserStore};
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, RoleClaim, TOKEN_TYPE_ACCESS};
pub use storage::{LocalStorage, MemoryStorage, Storage};
pub use user::UserService;
