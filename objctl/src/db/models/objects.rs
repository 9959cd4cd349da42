//! Database models for stored objects and their versions.

use crate::types::{ObjectId, UserId, VersionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct ObjectCreateDBRequest {
    pub path: String,
    pub public: bool,
    pub created_by: UserId,
}

/// A persisted object row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ObjectDBResponse {
    pub id: ObjectId,
    pub path: String,
    pub public: bool,
    pub active: bool,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<UserId>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VersionCreateDBRequest {
    pub object_id: ObjectId,
    pub s3_version_id: Option<String>,
    pub mime_type: Option<String>,
    pub delete_marker: bool,
    pub created_by: UserId,
}

/// A persisted version row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VersionDBResponse {
    pub id: VersionId,
    pub object_id: ObjectId,
    pub s3_version_id: Option<String>,
    pub mime_type: Option<String>,
    pub delete_marker: bool,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<UserId>,
    pub updated_at: DateTime<Utc>,
}
