//! 数据库连接池与迁移管理

use crate::config::DatabaseConfig;
use secrecy::ExposeSecret;
use sqlx::{
    migrate::Migrator,
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;

/// 内嵌迁移：账户表与重置令牌表
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const APPLICATION_NAME: &str = "timesheet-service";

/// 解析连接参数（不建立连接）
pub fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions, DbError> {
    PgConnectOptions::from_str(config.url.expose_secret())
        .map(|opts| opts.application_name(APPLICATION_NAME))
        .map_err(|e| DbError::InvalidUrl(e.to_string()))
}

/// 创建数据库连接池
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, DbError> {
    let options = connect_options(config)?;

    // 只记录主机与库名，URL 中可能含有密码
    tracing::debug!(
        host = %options.get_host(),
        database = options.get_database().unwrap_or_default(),
        "Connecting to database"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .connect_with(options)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Database connection failed");
            DbError::ConnectionFailed(e.to_string())
        })?;

    tracing::info!(
        max_connections = config.max_connections,
        "Database pool ready"
    );

    Ok(pool)
}

/// 运行内嵌迁移
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    let known = MIGRATOR.iter().count();

    MIGRATOR.run(pool).await.map_err(|e| {
        tracing::error!(error = %e, "Migration failed");
        DbError::MigrationFailed(e.to_string())
    })?;

    tracing::info!(migrations = known, "Schema up to date");
    Ok(())
}

/// 数据库错误类型
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}
