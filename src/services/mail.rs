//! Outbound mail capability

use crate::{config::SenderProfile, error::AppError};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use std::collections::HashMap;

/// Sends a plain-text message using a named sender profile
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        sender_profile: &str,
    ) -> Result<(), AppError>;
}

/// Subject of the password reset email
pub const RESET_EMAIL_SUBJECT: &str = "Password Reset Request";

/// Render the password reset email body
pub fn reset_email_body(link_base: &str, token: &str, ttl_minutes: u64) -> String {
    format!(
        "Hi,\n\nClick the link below to reset your password:\n\n{}{}\n\n\
         This link will expire in {} minutes.\n\nRegards,\nTimesheet Team",
        link_base, token, ttl_minutes
    )
}

/// Mail sender that resolves sender profiles from configuration and records
/// each message as a structured log event instead of relaying it.
///
/// The body is never logged since it carries the reset link.
pub struct LogMailSender {
    senders: HashMap<String, SenderProfile>,
}

impl LogMailSender {
    pub fn new(senders: HashMap<String, SenderProfile>) -> Self {
        Self { senders }
    }

    fn profile(&self, name: &str) -> Result<&SenderProfile, AppError> {
        self.senders.get(name).ok_or_else(|| {
            tracing::error!(sender_profile = %name, "Sender config not found");
            AppError::MailDelivery(format!("Sender config not found for: {}", name))
        })
    }
}

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        sender_profile: &str,
    ) -> Result<(), AppError> {
        let profile = self.profile(sender_profile)?;

        tracing::info!(
            from = %profile.from_address,
            display_name = profile.display_name.as_deref().unwrap_or_default(),
            to = %to,
            subject = %subject,
            body_len = body.len(),
            "Email dispatched"
        );

        Ok(())
    }
}

/// SMTP transport bound to one sender profile
struct SmtpSender {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

/// Mail sender relaying through each profile's SMTP account (STARTTLS)
///
/// Transports are built once per profile; connections are opened on send.
pub struct SmtpMailSender {
    senders: HashMap<String, SmtpSender>,
}

impl SmtpMailSender {
    /// Build one transport per sender profile. Profiles without a password are skipped.
    pub fn from_profiles(profiles: &HashMap<String, SenderProfile>) -> Result<Self, AppError> {
        let mut senders = HashMap::new();

        for (name, profile) in profiles {
            let Some(password) = profile.password.as_ref() else {
                tracing::warn!(sender_profile = %name, "Sender has no SMTP password, skipping");
                continue;
            };

            let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&profile.smtp_host)
                .map_err(|e| {
                    AppError::Config(format!("Invalid SMTP host for sender '{}': {}", name, e))
                })?
                .port(profile.smtp_port)
                .credentials(Credentials::new(
                    profile.smtp_username().to_string(),
                    password.expose_secret().clone(),
                ))
                .build();

            senders.insert(
                name.clone(),
                SmtpSender {
                    from: sender_mailbox(profile)?,
                    transport,
                },
            );
        }

        Ok(Self { senders })
    }

    pub fn has_profile(&self, name: &str) -> bool {
        self.senders.contains_key(name)
    }
}

fn sender_mailbox(profile: &SenderProfile) -> Result<Mailbox, AppError> {
    let address: Address = profile.from_address.parse().map_err(|e| {
        AppError::Config(format!("Invalid from address '{}': {}", profile.from_address, e))
    })?;
    Ok(Mailbox::new(profile.display_name.clone(), address))
}

/// Assemble a plain-text message
fn build_message(from: &Mailbox, to: &str, subject: &str, body: &str) -> Result<Message, AppError> {
    let recipient: Mailbox = to
        .parse()
        .map_err(|e| AppError::MailDelivery(format!("Invalid recipient address: {}", e)))?;

    Message::builder()
        .from(from.clone())
        .to(recipient)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| AppError::MailDelivery(format!("Failed to build message: {}", e)))
}

#[async_trait]
impl MailSender for SmtpMailSender {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        sender_profile: &str,
    ) -> Result<(), AppError> {
        let sender = self.senders.get(sender_profile).ok_or_else(|| {
            tracing::error!(sender_profile = %sender_profile, "Sender config not found");
            AppError::MailDelivery(format!("Sender config not found for: {}", sender_profile))
        })?;

        let message = build_message(&sender.from, to, subject, body)?;

        sender.transport.send(message).await.map_err(|e| {
            tracing::error!(to = %to, sender_profile = %sender_profile, error = %e, "SMTP delivery failed");
            AppError::MailDelivery(e.to_string())
        })?;

        tracing::info!(to = %to, subject = %subject, sender_profile = %sender_profile, "Email sent");
        Ok(())
    }
}
