//! 访问策略查看（仅管理员）

use crate::{auth::policy::PolicyRuleView, middleware::AppState};
use axum::{extract::State, Json};
use std::sync::Arc;

/// 按声明顺序列出授权规则
pub async fn list_policy(State(state): State<Arc<AppState>>) -> Json<Vec<PolicyRuleView>> {
    Json(state.policy.describe())
}
