//! Database models for user records.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Fields mapped from a verified token payload onto a user row.
///
/// Every field except `oidc_id` is optional because identity providers only
/// populate the claims a client requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCreateDBRequest {
    pub oidc_id: UserId,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub idp: Option<String>,
}

/// A persisted user row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserDBResponse {
    pub oidc_id: UserId,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub idp: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<UserId>,
    pub updated_at: DateTime<Utc>,
}

impl UserDBResponse {
    /// True when any mapped field differs from the incoming token data.
    pub fn differs_from(&self, incoming: &UserCreateDBRequest) -> bool {
        self.username != incoming.username
            || self.full_name != incoming.full_name
            || self.first_name != incoming.first_name
            || self.last_name != incoming.last_name
            || self.email != incoming.email
            || self.idp != incoming.idp
    }
}
