pub mod auth;
pub mod policy;

pub use auth::{authorize, authorize_middleware, AuthUser};
pub use policy::{AuthMode, PolicyTable, RoutePolicy};
