//! 认证中间件集成测试

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::{from_fn, from_fn_with_state, Next},
    response::Response,
    routing,
    Router,
};
use serde_json::json;
use std::sync::Arc;
use timesheet_service::{
    auth::{
        authenticate_middleware, authorize_middleware, Authenticator, PolicyTable,
        SecurityContext, TokenCodec,
    },
    handlers,
    models::user::Authority,
};
use tower::ServiceExt;

mod common;
use common::{body_json, foreign_token, get, post_json, FixedCodec, TestApp};

fn app_with_alice() -> TestApp {
    let app = TestApp::new();
    app.create_user("alice", common::DEFAULT_PASSWORD, "USER", "alice@example.com");
    app
}

#[tokio::test]
async fn test_public_path_ignores_garbage_token() {
    let app = app_with_alice();

    let mut request = post_json(
        "/auth/login",
        json!({ "username": "alice", "password": common::DEFAULT_PASSWORD }),
    );
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer not.a.jwt".parse().unwrap());

    let response = app.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = app_with_alice();

    let response = app.router().oneshot(get("/api/users/me", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_valid_token_populates_context() {
    let app = app_with_alice();
    let token = app.access_token("alice");

    let response = app
        .router()
        .oneshot(get("/api/users/me", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["username"], "alice");
    assert_eq!(json["authorities"], json!(["ROLE_USER"]));
}

#[tokio::test]
async fn test_prefixed_role_not_double_prefixed() {
    let app = TestApp::new();
    app.create_user("root", common::DEFAULT_PASSWORD, "ROLE_ADMIN", "root@example.com");
    let token = app.access_token("root");

    let response = app
        .router()
        .oneshot(get("/api/users/me", Some(&token)))
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["authorities"], json!(["ROLE_ADMIN"]));
}

#[tokio::test]
async fn test_non_access_token_type_rejected() {
    let app = app_with_alice();
    let token = app.custom_token("alice", "refresh", 300);

    let response = app
        .router()
        .oneshot(get("/api/users/me", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["message"], "Invalid token type");
}

#[tokio::test]
async fn test_malformed_token_rejected() {
    let app = app_with_alice();

    let response = app
        .router()
        .oneshot(get("/api/users/me", Some("definitely-not-a-jwt")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["message"], "Invalid JWT token");
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let app = app_with_alice();
    let token = app.expired_token("alice");

    let response = app
        .router()
        .oneshot(get("/api/users/me", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["message"], "Invalid JWT token");
}

#[tokio::test]
async fn test_foreign_signature_rejected() {
    let app = app_with_alice();
    let token = foreign_token("alice");

    let response = app
        .router()
        .oneshot(get("/api/users/me", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_subject_rejected() {
    let app = app_with_alice();
    let token = app.access_token("ghost");

    let response = app
        .router()
        .oneshot(get("/api/users/me", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["message"], "User authentication failed");
}

#[tokio::test]
async fn test_non_bearer_scheme_is_anonymous() {
    let app = app_with_alice();

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/users/me")
        .header(header::AUTHORIZATION, "Basic YWxpY2U6c2VjcmV0")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_forbidden_on_admin_route() {
    let app = app_with_alice();
    let token = app.access_token("alice");

    let response = app
        .router()
        .oneshot(get("/api/security/policy", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_can_read_policy() {
    let app = TestApp::new();
    app.create_user("root", common::DEFAULT_PASSWORD, "ADMIN", "root@example.com");
    let token = app.access_token("root");

    let response = app
        .router()
        .oneshot(get("/api/security/policy", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json[0]["pattern"], "/auth/**");
    assert_eq!(json[0]["access"]["kind"], "permit_all");
}

#[tokio::test]
async fn test_unauthenticated_admin_route_is_401() {
    let app = app_with_alice();

    let response = app
        .router()
        .oneshot(get("/api/security/policy", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

async fn preset_context(mut req: Request, next: Next) -> Response {
    req.extensions_mut()
        .insert(SecurityContext::new("preset", Authority::from_role("ADMIN")));
    next.run(req).await
}

#[tokio::test]
async fn test_existing_context_not_overwritten() {
    let app = app_with_alice();
    let token = app.access_token("alice");

    let router = Router::new()
        .route("/api/users/me", routing::get(handlers::user::current_user))
        .layer(from_fn_with_state(
            app.state.authenticator.clone(),
            authenticate_middleware,
        ))
        .layer(from_fn(preset_context));

    let response = router.oneshot(get("/api/users/me", Some(&token))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["username"], "preset");
    assert_eq!(json["authorities"], json!(["ROLE_ADMIN"]));
}

/// 返回请求到达处理器时是否带有身份
async fn context_present(req: Request) -> String {
    req.extensions().get::<SecurityContext>().is_some().to_string()
}

/// 认证 + 授权两层，使用指定的令牌解码器
fn pipeline_with_codec(app: &TestApp, codec: FixedCodec) -> Router {
    let codec: Arc<dyn TokenCodec> = Arc::new(codec);
    let authenticator = Arc::new(Authenticator::new(
        codec,
        app.users.clone(),
        vec!["/auth/".to_string()],
    ));
    let policy = Arc::new(
        PolicyTable::builder()
            .permit_all("/api/open")
            .any_role("/api/**", ["USER", "ADMIN"])
            .build(),
    );

    Router::new()
        .route("/api/users/me", routing::get(handlers::user::current_user))
        .route("/api/open", routing::get(context_present))
        .layer(from_fn_with_state(policy, authorize_middleware))
        .layer(from_fn_with_state(authenticator, authenticate_middleware))
}

#[tokio::test]
async fn test_failed_cross_check_rejected_by_authorization() {
    let app = app_with_alice();
    let router = pipeline_with_codec(&app, FixedCodec::failing_cross_check("alice"));

    let response = router
        .oneshot(get("/api/users/me", Some("any-token")))
        .await
        .unwrap();

    // 认证阶段放行为匿名，由授权阶段返回通用的 401
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["message"], "Authentication failed");
}

#[tokio::test]
async fn test_failed_cross_check_reaches_handler_anonymously() {
    let app = app_with_alice();
    let router = pipeline_with_codec(&app, FixedCodec::failing_cross_check("alice"));

    let response = router
        .oneshot(get("/api/open", Some("any-token")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    assert_eq!(&bytes[..], b"false");
}

#[tokio::test]
async fn test_passing_cross_check_sets_context() {
    let app = app_with_alice();
    let router = pipeline_with_codec(&app, FixedCodec::passing("alice"));

    let response = router
        .oneshot(get("/api/open", Some("any-token")))
        .await
        .unwrap();

    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    assert_eq!(&bytes[..], b"true");
}
