//! Account identity and authority models

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Stored login account
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub email: String,
}

impl Identity {
    /// Authority derived from the stored role; `None` when no role is assigned
    pub fn authority(&self) -> Option<Authority> {
        let role = self.role.trim();
        if role.is_empty() {
            None
        } else {
            Some(Authority::from_role(role))
        }
    }
}

/// Role-derived capability tag, always of the form `ROLE_<ROLE>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Authority(String);

impl Authority {
    pub const PREFIX: &'static str = "ROLE_";

    /// Map a role name to its authority, prefixing exactly once
    pub fn from_role(role: &str) -> Self {
        if role.starts_with(Self::PREFIX) {
            Authority(role.to_string())
        } else {
            Authority(format!("{}{}", Self::PREFIX, role))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build an authority set from role names
pub fn authorities<I, S>(roles: I) -> BTreeSet<Authority>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    roles
        .into_iter()
        .map(|role| Authority::from_role(role.as_ref()))
        .collect()
}

/// Current user response
#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub username: String,
    pub authorities: Vec<Authority>,
}
