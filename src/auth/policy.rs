//! Path-based authorization policy
//!
//! An ordered list of `(pattern, access)` rules. The first rule whose pattern
//! (and optional method) matches the request decides; later rules are never
//! consulted. Requests matching no rule fall back to "authenticated, any role".

use crate::{
    auth::middleware::SecurityContext,
    error::AppError,
    models::user::{authorities, Authority},
};
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Access requirement attached to a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "authorities", rename_all = "snake_case")]
pub enum Access {
    PermitAll,
    Authenticated,
    AnyOf(BTreeSet<Authority>),
}

/// Outcome of evaluating the table for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// No identity on a route that requires one (401)
    Unauthenticated,
    /// Identity present but lacking every allowed authority (403)
    Forbidden,
}

impl Access {
    pub fn evaluate(&self, ctx: Option<&SecurityContext>) -> Decision {
        match (self, ctx) {
            (Access::PermitAll, _) => Decision::Allow,
            (_, None) => Decision::Unauthenticated,
            (Access::Authenticated, Some(_)) => Decision::Allow,
            (Access::AnyOf(allowed), Some(ctx)) => {
                if ctx.has_any(allowed) {
                    Decision::Allow
                } else {
                    Decision::Forbidden
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*` or `{name}`: exactly one segment
    Single,
    /// `**`: zero or more segments
    Multi,
}

/// Ant-style path pattern (`/api/users/{id}`, `/auth/**`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(raw: &str) -> Self {
        let segments = split_path(raw)
            .map(|seg| match seg {
                "**" => Segment::Multi,
                "*" => Segment::Single,
                s if s.starts_with('{') && s.ends_with('}') => Segment::Single,
                s => Segment::Literal(s.to_string()),
            })
            .collect();

        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = split_path(path).collect();
        match_segments(&self.segments, &parts)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::Multi, rest)) => {
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((Segment::Single, rest)) => {
            !path.is_empty() && match_segments(rest, &path[1..])
        }
        Some((Segment::Literal(lit), rest)) => {
            path.first().is_some_and(|p| p == lit) && match_segments(rest, &path[1..])
        }
    }
}

/// One entry of the policy table
#[derive(Debug, Clone)]
pub struct PolicyRule {
    pub pattern: PathPattern,
    pub method: Option<Method>,
    pub access: Access,
}

impl PolicyRule {
    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method.as_ref().map_or(true, |m| m == method) && self.pattern.matches(path)
    }
}

/// Serializable view of a rule
#[derive(Debug, Serialize)]
pub struct PolicyRuleView {
    pub pattern: String,
    pub method: Option<String>,
    pub access: Access,
}

/// Ordered, first-match-wins policy table
#[derive(Debug, Clone)]
pub struct PolicyTable {
    rules: Vec<PolicyRule>,
    fallback: Access,
}

impl PolicyTable {
    pub fn builder() -> PolicyTableBuilder {
        PolicyTableBuilder { rules: Vec::new() }
    }

    /// Access rules of the timesheet API
    pub fn timesheet_default() -> Self {
        let user_or_admin = ["USER", "ADMIN"];

        Self::builder()
            .permit_all("/auth/**")
            .any_role("/v3/api-docs/**", ["ADMIN"])
            .any_role("/swagger-ui/**", ["ADMIN"])
            .any_role("/swagger-ui.html", ["ADMIN"])
            // 更具体的 /api/users 规则必须先于 /api/** 声明
            .any_role("/api/users", user_or_admin)
            .any_role("/api/users/postuser/**", user_or_admin)
            .any_role("/api/users/me", user_or_admin)
            .any_role("/api/users/{id}", user_or_admin)
            .any_role("/api/**", ["ADMIN"])
            .build()
    }

    /// Access requirement for a request: the first matching rule, else the fallback
    pub fn resolve(&self, method: &Method, path: &str) -> &Access {
        self.rules
            .iter()
            .find(|rule| rule.matches(method, path))
            .map(|rule| &rule.access)
            .unwrap_or(&self.fallback)
    }

    pub fn decide(&self, method: &Method, path: &str, ctx: Option<&SecurityContext>) -> Decision {
        self.resolve(method, path).evaluate(ctx)
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn describe(&self) -> Vec<PolicyRuleView> {
        self.rules
            .iter()
            .map(|rule| PolicyRuleView {
                pattern: rule.pattern.to_string(),
                method: rule.method.as_ref().map(|m| m.to_string()),
                access: rule.access.clone(),
            })
            .collect()
    }
}

pub struct PolicyTableBuilder {
    rules: Vec<PolicyRule>,
}

impl PolicyTableBuilder {
    pub fn rule(mut self, pattern: &str, method: Option<Method>, access: Access) -> Self {
        self.rules.push(PolicyRule {
            pattern: PathPattern::parse(pattern),
            method,
            access,
        });
        self
    }

    pub fn permit_all(self, pattern: &str) -> Self {
        self.rule(pattern, None, Access::PermitAll)
    }

    pub fn authenticated(self, pattern: &str) -> Self {
        self.rule(pattern, None, Access::Authenticated)
    }

    pub fn any_role<I, S>(self, pattern: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rule(pattern, None, Access::AnyOf(authorities(roles)))
    }

    pub fn build(self) -> PolicyTable {
        PolicyTable {
            rules: self.rules,
            fallback: Access::Authenticated,
        }
    }
}

/// 授权中间件 - 在认证中间件之后执行
pub async fn authorize_middleware(
    State(policy): State<Arc<PolicyTable>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = req.extensions().get::<SecurityContext>();
    let decision = policy.decide(req.method(), req.uri().path(), ctx);

    match decision {
        Decision::Allow => Ok(next.run(req).await),
        Decision::Unauthenticated => {
            metrics::counter!("authz_decisions_total", "outcome" => "unauthenticated").increment(1);
            tracing::warn!(path = %req.uri().path(), "Authentication required");
            Err(AppError::Unauthorized)
        }
        Decision::Forbidden => {
            metrics::counter!("authz_decisions_total", "outcome" => "forbidden").increment(1);
            tracing::warn!(
                path = %req.uri().path(),
                username = ctx.map(|c| c.username.as_str()).unwrap_or_default(),
                "Access denied by policy"
            );
            Err(AppError::Forbidden)
        }
    }
}
