//! 认证服务：用户名密码登录，签发访问令牌

use crate::{
    auth::{jwt::JwtService, password::PasswordHasher, reset_token::ResetTokenGenerator},
    error::AppError,
    models::auth::{LoginRequest, LoginResponse},
    repository::CredentialStore,
};
use std::sync::Arc;

pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    jwt_service: Arc<JwtService>,
    hasher: Arc<PasswordHasher>,
    /// 未知用户登录时用于校验的占位哈希
    dummy_hash: Option<String>,
}

/// 随机明文的哈希，与真实账户使用相同参数
fn dummy_hash(hasher: &PasswordHasher) -> Option<String> {
    match hasher.hash(&ResetTokenGenerator::generate()) {
        Ok(hash) => Some(hash),
        Err(e) => {
            tracing::error!(error = %e, "Failed to prepare dummy password hash");
            None
        }
    }
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        jwt_service: Arc<JwtService>,
        hasher: Arc<PasswordHasher>,
    ) -> Self {
        Self {
            credentials,
            jwt_service,
            dummy_hash: dummy_hash(&hasher),
            hasher,
        }
    }

    /// 用户登录
    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, AppError> {
        let Some(user) = self.credentials.find_by_username(&req.username).await? else {
            // 未知用户同样付出一次哈希校验的代价，避免通过响应时间枚举用户名
            if let Some(hash) = &self.dummy_hash {
                let _ = self.hasher.verify(&req.password, hash);
            }
            tracing::warn!(username = %req.username, "Login for unknown user");
            return Err(AppError::Unauthorized);
        };

        self.hasher.verify(&req.password, &user.password_hash).map_err(|e| {
            tracing::warn!(username = %req.username, "Login with wrong password");
            e
        })?;

        let issued = self.jwt_service.issue_access_token(&user.username)?;

        tracing::info!(username = %user.username, "Login succeeded");

        Ok(LoginResponse {
            access_token: issued.access_token,
            token_type: "Bearer",
            expires_in: issued.expires_in,
        })
    }
}
