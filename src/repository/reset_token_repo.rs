//! Password reset token repository

use crate::{error::AppError, models::auth::PasswordResetToken};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Reset token store; at most one outstanding token per email
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Insert `token`, atomically replacing any outstanding token for the same email
    async fn replace_for_email(&self, token: &PasswordResetToken) -> Result<(), AppError>;

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, AppError>;

    /// Delete by digest; returns false if nothing was deleted
    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<bool, AppError>;

    /// Delete tokens that expired before `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

pub struct ResetTokenRepository {
    db: PgPool,
}

impl ResetTokenRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResetTokenStore for ResetTokenRepository {
    async fn replace_for_email(&self, token: &PasswordResetToken) -> Result<(), AppError> {
        // 单条语句完成“删除旧令牌 + 写入新令牌”，避免并发请求留下两条有效令牌
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (email, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (email) DO UPDATE
            SET token_hash = EXCLUDED.token_hash,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&token.email)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, AppError> {
        let token = sqlx::query_as::<_, PasswordResetToken>(
            "SELECT email, token_hash, expires_at FROM password_reset_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await?;

        Ok(token)
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
