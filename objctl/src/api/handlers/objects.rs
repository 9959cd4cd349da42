//! Object read and tagging handlers.
//!
//! All handlers run behind the authentication, resource-loading and
//! permission-gate middleware; by the time they execute, the request carries
//! an identity and a loaded current object.

use crate::{
    AppState,
    auth::{authorization::CurrentObject, identity::Identity},
    db::{
        errors::DbError,
        handlers::{Objects, Tags},
        models::tags::{TagSpec, VersionTagDBResponse},
    },
    errors::{Error, Result},
    types::SYSTEM_USER,
};
use axum::{Extension, Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::instrument;

/// Return the merged current-object view.
#[instrument(skip_all, fields(object_id = %current.id))]
pub async fn read_object(Extension(current): Extension<Arc<CurrentObject>>) -> Json<CurrentObject> {
    Json(current.as_ref().clone())
}

/// Return only the storage-facing subset of the current-object view.
#[instrument(skip_all, fields(object_id = %current.id))]
pub async fn head_object(Extension(current): Extension<Arc<CurrentObject>>) -> Json<Value> {
    Json(json!({
        "content_length": current.content_length,
        "content_type": current.content_type,
        "e_tag": current.e_tag,
        "s3_version_id": current.s3_version_id,
        "last_modified": current.last_modified,
    }))
}

/// Replace the tag set of the object's latest version.
#[instrument(skip_all, fields(object_id = %current.id, count = tags.len()))]
pub async fn replace_tags(
    State(state): State<AppState>,
    Extension(current): Extension<Arc<CurrentObject>>,
    Extension(identity): Extension<Arc<Identity>>,
    Json(tags): Json<Vec<TagSpec>>,
) -> Result<Json<Vec<VersionTagDBResponse>>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;

    let version = Objects::new(&mut conn)
        .latest_version(current.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Version".to_string(),
            id: current.id.to_string(),
        })?;

    let acting_user = identity.user_id().unwrap_or(SYSTEM_USER);
    let relations = Tags::new(&mut conn).add_tags(version.id, &tags, acting_user).await?;

    Ok(Json(relations))
}
