pub mod auth;
pub mod rate_limit;

pub use auth::{principal_middleware, Claims, JwtVerifier};
pub use rate_limit::rate_limit_middleware;
