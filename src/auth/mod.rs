//! Authentication and authorization module

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod policy;
pub mod reset_token;

pub use jwt::{Claims, JwtService, TokenCodec, TokenError};
pub use middleware::{authenticate_middleware, extract_bearer, Authenticator, SecurityContext};
pub use password::PasswordHasher;
pub use policy::{authorize_middleware, Access, Decision, PolicyTable};
pub use reset_token::ResetTokenGenerator;
