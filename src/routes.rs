//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::{
    auth::{middleware::authenticate_middleware, policy::authorize_middleware},
    handlers,
    middleware::{cors_layer, request_tracking_middleware, AppState},
};

/// 创建应用路由
///
/// 中间件执行顺序：CORS -> 请求追踪 -> 认证 -> 授权 -> 处理器
pub fn create_router(state: Arc<AppState>) -> Router {
    // 认证与密码重置（公开）
    let auth_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/forgot-password", post(handlers::password_reset::forgot_password))
        .route("/auth/reset-password", post(handlers::password_reset::reset_password));

    // 需要身份的路由，访问控制由策略表决定
    let api_routes = Router::new()
        .route("/api/users/me", get(handlers::user::current_user))
        .route("/api/security/policy", get(handlers::security::list_policy));

    Router::new()
        .merge(auth_routes)
        .merge(api_routes)
        .layer(from_fn_with_state(state.policy.clone(), authorize_middleware))
        .layer(from_fn_with_state(state.authenticator.clone(), authenticate_middleware))
        .layer(from_fn(request_tracking_middleware))
        .layer(cors_layer(&state.config.server.cors_allowed_origins))
        .with_state(state)
}
