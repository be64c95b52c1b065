//! 当前用户处理器

use crate::{auth::middleware::SecurityContext, models::user::CurrentUserResponse};
use axum::Json;

/// 返回认证阶段解析出的身份
pub async fn current_user(ctx: SecurityContext) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse {
        username: ctx.username,
        authorities: ctx.authorities.into_iter().collect(),
    })
}
