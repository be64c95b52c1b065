//! Business logic services layer

pub mod auth_service;
pub mod mail;
pub mod password_reset;

pub use auth_service::AuthService;
pub use mail::{LogMailSender, MailSender, SmtpMailSender};
pub use password_reset::PasswordResetService;
