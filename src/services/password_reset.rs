//! 密码重置流程：申请（签发一次性令牌并发邮件）与完成（校验令牌并修改密码）

use crate::{
    auth::{password::PasswordHasher, reset_token::ResetTokenGenerator},
    config::{ResetConfig, SecurityConfig},
    error::AppError,
    models::auth::PasswordResetToken,
    repository::{CredentialStore, ResetTokenStore},
    services::mail::{reset_email_body, MailSender, RESET_EMAIL_SUBJECT},
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Acknowledgement of an issued reset token (the token itself only travels by email)
#[derive(Debug, Clone)]
pub struct ResetIssued {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

pub struct PasswordResetService {
    credentials: Arc<dyn CredentialStore>,
    tokens: Arc<dyn ResetTokenStore>,
    mailer: Arc<dyn MailSender>,
    hasher: Arc<PasswordHasher>,
    policy: SecurityConfig,
    config: ResetConfig,
}

impl PasswordResetService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<dyn ResetTokenStore>,
        mailer: Arc<dyn MailSender>,
        hasher: Arc<PasswordHasher>,
        policy: SecurityConfig,
        config: ResetConfig,
    ) -> Self {
        Self {
            credentials,
            tokens,
            mailer,
            hasher,
            policy,
            config,
        }
    }

    /// 申请重置：邮箱未注册时不创建令牌、不发送邮件
    ///
    /// Success is reported only once the email has been handed off. If dispatch
    /// fails the new token is withdrawn so no undelivered token stays live.
    pub async fn initiate(&self, email: &str) -> Result<ResetIssued, AppError> {
        if self.credentials.find_by_email(email).await?.is_none() {
            tracing::info!("Password reset requested for unregistered email");
            return Err(AppError::EmailNotRegistered);
        }

        let token = ResetTokenGenerator::generate();
        let record = PasswordResetToken {
            email: email.to_string(),
            token_hash: ResetTokenGenerator::hash(&token),
            expires_at: Utc::now() + Duration::seconds(self.config.token_ttl_secs as i64),
        };

        // 替换该邮箱下已有的令牌（同一邮箱只保留一个有效令牌）
        self.tokens.replace_for_email(&record).await?;

        let body = reset_email_body(&self.config.link_base, &token, self.config.token_ttl_secs / 60);
        if let Err(e) = self
            .mailer
            .send(email, RESET_EMAIL_SUBJECT, &body, &self.config.sender_profile)
            .await
        {
            tracing::error!(error = %e, "Reset email dispatch failed, withdrawing token");
            if let Err(cleanup) = self.tokens.delete_by_token_hash(&record.token_hash).await {
                tracing::error!(error = %cleanup, "Failed to withdraw undelivered reset token");
            }
            return Err(match e {
                AppError::MailDelivery(_) => e,
                other => AppError::MailDelivery(other.to_string()),
            });
        }

        tracing::info!(expires_at = %record.expires_at, "Password reset token issued");
        metrics::counter!("password_reset_total", "stage" => "initiated").increment(1);

        Ok(ResetIssued {
            email: record.email,
            expires_at: record.expires_at,
        })
    }

    /// 完成重置：令牌不存在与已使用返回相同错误
    pub async fn complete(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        let token_hash = ResetTokenGenerator::hash(token);

        let record = self
            .tokens
            .find_by_token_hash(&token_hash)
            .await?
            .ok_or(AppError::ResetTokenInvalid)?;

        if record.is_expired_at(Utc::now()) {
            tracing::info!("Expired password reset token presented");
            return Err(AppError::ResetTokenExpired);
        }

        if self.config.enforce_password_policy {
            PasswordHasher::validate_password_policy(new_password, &self.policy)?;
        }

        let identity = self
            .credentials
            .find_by_email(&record.email)
            .await?
            .ok_or_else(|| {
                tracing::error!("Reset token bound to an email with no account");
                AppError::NotFound("User not found".to_string())
            })?;

        let password_hash = self.hasher.hash(new_password)?;

        // 先删除令牌：并发完成请求中只有删除成功的一方可以修改密码
        if !self.tokens.delete_by_token_hash(&token_hash).await? {
            return Err(AppError::ResetTokenInvalid);
        }

        // 令牌已消费：此后失败时用户需重新申请
        let updated = self
            .credentials
            .update_password_hash(&identity.username, &password_hash)
            .await
            .map_err(|e| {
                tracing::error!(
                    username = %identity.username,
                    error = %e,
                    "Password update failed after reset token was consumed; user must request a new reset"
                );
                e
            })?;

        if !updated {
            tracing::error!(
                username = %identity.username,
                "Account vanished after reset token was consumed; user must request a new reset"
            );
            return Err(AppError::NotFound("User not found".to_string()));
        }

        tracing::info!(username = %identity.username, "Password reset completed");
        metrics::counter!("password_reset_total", "stage" => "completed").increment(1);

        Ok(())
    }

    /// 清理过期令牌
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        let purged = self.tokens.purge_expired(Utc::now()).await?;
        if purged > 0 {
            tracing::info!(purged, "Expired password reset tokens purged");
        }
        Ok(purged)
    }
}
