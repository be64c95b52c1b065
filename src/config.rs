//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址，例如 "0.0.0.0:8080"
    pub addr: String,
    /// 优雅关闭超时时间（秒）
    pub graceful_shutdown_timeout_secs: u64,
    /// 允许的跨域来源
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库连接 URL（使用 Secret 包装，防止日志泄露）
    pub url: Secret<String>,
    /// 最大连接数
    pub max_connections: u32,
    /// 最小连接数
    pub min_connections: u32,
    /// 获取连接超时时间（秒）
    pub acquire_timeout_secs: u64,
    /// 空闲连接超时时间（秒）
    pub idle_timeout_secs: u64,
    /// 连接最大生命周期（秒）
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// JWT 密钥（使用 Secret 包装，防止日志泄露）
    pub jwt_secret: Secret<String>,
    /// 访问令牌过期时间（秒）
    pub access_token_exp_secs: u64,
    /// 密码最小长度
    pub password_min_length: usize,
    /// 密码必须包含大写字母
    pub password_require_uppercase: bool,
    /// 密码必须包含数字
    pub password_require_digit: bool,
    /// 密码必须包含特殊字符
    pub password_require_special: bool,
    /// 无需令牌即可访问的路径前缀
    pub public_path_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetConfig {
    /// 重置令牌有效期（秒），默认 30 分钟
    pub token_ttl_secs: u64,
    /// 重置链接前缀，令牌直接拼接在末尾
    pub link_base: String,
    /// 发送重置邮件使用的发件人配置名
    pub sender_profile: String,
    /// 过期令牌清理间隔（秒），0 表示不清理
    pub purge_interval_secs: u64,
    /// 重置时是否对新密码执行密码策略，默认关闭
    #[serde(default)]
    pub enforce_password_policy: bool,
}

/// 发件人配置：发件地址与 SMTP 账号
#[derive(Debug, Clone, Deserialize)]
pub struct SenderProfile {
    pub from_address: String,
    pub display_name: Option<String>,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP 用户名，缺省时使用发件地址
    #[serde(default)]
    pub username: Option<String>,
    /// SMTP 密码（应用专用密码）
    #[serde(default)]
    pub password: Option<Secret<String>>,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

impl SenderProfile {
    pub fn smtp_username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.from_address)
    }
}

/// 邮件投递方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    /// 只写日志，不投递（开发与测试）
    Log,
    /// 通过发件人配置的 SMTP 服务器投递（STARTTLS）
    Smtp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub transport: MailTransport,
    /// 发件人配置，按名称索引
    #[serde(default)]
    pub senders: HashMap<String, SenderProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub reset: ResetConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("server.addr", "0.0.0.0:8080")?
            .set_default("server.graceful_shutdown_timeout_secs", 30)?
            .set_default(
                "server.cors_allowed_origins",
                vec!["http://localhost:3000", "http://localhost:8080"],
            )?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("database.max_lifetime_secs", 1800)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("security.jwt_secret", "change-this-secret-in-production-min-32-chars!")?
            .set_default("security.access_token_exp_secs", 36000)?
            .set_default("security.password_min_length", 8)?
            .set_default("security.password_require_uppercase", true)?
            .set_default("security.password_require_digit", true)?
            .set_default("security.password_require_special", false)?
            .set_default("security.public_path_prefixes", vec!["/auth/"])?
            .set_default("reset.token_ttl_secs", 1800)?
            .set_default(
                "reset.link_base",
                "https://timesheetapplication-v2.vercel.app/reset-password/?token=",
            )?
            .set_default("reset.sender_profile", "admin")?
            .set_default("reset.purge_interval_secs", 3600)?
            .set_default("reset.enforce_password_policy", false)?
            .set_default("mail.transport", "log")?
            .set_default("mail.senders.admin.from_address", "no-reply@timesheet.local")?
            .set_default("mail.senders.admin.display_name", "Timesheet Team")?;

        // 从环境变量加载配置（前缀为 TIMESHEET_）
        settings = settings.add_source(
            Environment::with_prefix("TIMESHEET")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.cors_allowed_origins")
                .with_list_parse_key("security.public_path_prefixes")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证端口范围
        if let Some(port_str) = self.server.addr.split(':').next_back() {
            if let Ok(port) = port_str.parse::<u16>() {
                if port != 0 && port < 1024 {
                    return Err(ConfigError::Message("Server port should be >= 1024".to_string()));
                }
            }
        }

        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        // 验证数据库连接池配置
        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::Message(
                "max_connections must be >= min_connections".to_string(),
            ));
        }

        // 验证 JWT 密钥长度（至少 32 字符）
        if self.security.jwt_secret.expose_secret().len() < 32 {
            return Err(ConfigError::Message(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        // 验证令牌过期时间
        if self.security.access_token_exp_secs < 60 || self.security.access_token_exp_secs > 86400 {
            return Err(ConfigError::Message(
                "access_token_exp_secs must be between 60 and 86400 (1 minute to 24 hours)"
                    .to_string(),
            ));
        }

        // 验证密码策略
        if self.security.password_min_length < 6 || self.security.password_min_length > 128 {
            return Err(ConfigError::Message(
                "password_min_length must be between 6 and 128".to_string(),
            ));
        }

        // 验证重置令牌配置
        if self.reset.token_ttl_secs == 0 {
            return Err(ConfigError::Message("reset.token_ttl_secs must be > 0".to_string()));
        }

        let Some(profile) = self.mail.senders.get(&self.reset.sender_profile) else {
            return Err(ConfigError::Message(format!(
                "reset.sender_profile '{}' is not configured under mail.senders",
                self.reset.sender_profile
            )));
        };

        // SMTP 投递需要发件账号密码
        if self.mail.transport == MailTransport::Smtp && profile.password.is_none() {
            return Err(ConfigError::Message(format!(
                "mail.senders.{}.password is required when mail.transport = smtp",
                self.reset.sender_profile
            )));
        }

        Ok(())
    }
}
