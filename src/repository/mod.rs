//! Database repository layer
//!
//! Stores are traits so the authentication pipeline and the reset workflow
//! depend on capabilities, with Postgres implementations alongside.

pub mod reset_token_repo;
pub mod user_repo;

pub use reset_token_repo::*;
pub use user_repo::*;
