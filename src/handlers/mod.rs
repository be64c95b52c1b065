//! HTTP 处理器模块

pub mod auth;
pub mod password_reset;
pub mod security;
pub mod user;
