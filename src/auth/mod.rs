pub mod jwt;
pub mod middleware;

pub use jwt::{validate_token, Claims, JwtManager};
pub use middleware::{auth_middleware, AuthParty};
