//! Database models for tags and tag-to-version relations.

use crate::types::{TagId, UserId, VersionId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An incoming key/value pair to attach to a version.
///
/// Key and value lengths (128/256) are enforced by the schema, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSpec {
    pub key: String,
    pub value: String,
}

/// A persisted tag row; reused across versions via the `(key, value)` unique
/// constraint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TagDBResponse {
    pub id: TagId,
    pub key: String,
    pub value: String,
}

/// A relation between a version and a tag, carrying the acting user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VersionTagDBResponse {
    pub version_id: VersionId,
    pub tag_id: TagId,
    pub created_by: UserId,
}
