//! 密码重置处理器

use crate::{
    error::AppError,
    middleware::AppState,
    models::auth::{ForgotPasswordRequest, ResetPasswordRequest},
};
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

/// 发起密码重置：生成令牌并发送重置邮件
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    state.password_reset_service.initiate(&req.email).await?;

    Ok(Json(json!({
        "message": "Reset link sent to your email"
    })))
}

/// 使用令牌设置新密码
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    state
        .password_reset_service
        .complete(&req.token, &req.new_password)
        .await?;

    Ok(Json(json!({
        "message": "Password reset successful"
    })))
}
