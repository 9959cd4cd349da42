//! Database repository for stored objects and their versions.

use crate::{
    db::{
        errors::Result,
        models::objects::{ObjectCreateDBRequest, ObjectDBResponse, VersionCreateDBRequest, VersionDBResponse},
    },
    types::{ObjectId, abbrev_uuid},
};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Objects<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Objects<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(path = %request.path), err)]
    pub async fn create(&mut self, request: &ObjectCreateDBRequest) -> Result<ObjectDBResponse> {
        let object = sqlx::query_as::<_, ObjectDBResponse>(
            r#"
            INSERT INTO objects (id, path, public, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.path)
        .bind(request.public)
        .bind(request.created_by)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(object)
    }

    #[instrument(skip(self), fields(object_id = %abbrev_uuid(&id)), err)]
    pub async fn read(&mut self, id: ObjectId) -> Result<Option<ObjectDBResponse>> {
        let object = sqlx::query_as::<_, ObjectDBResponse>("SELECT * FROM objects WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(object)
    }

    #[instrument(skip(self, request), fields(object_id = %abbrev_uuid(&request.object_id)), err)]
    pub async fn create_version(&mut self, request: &VersionCreateDBRequest) -> Result<VersionDBResponse> {
        let version = sqlx::query_as::<_, VersionDBResponse>(
            r#"
            INSERT INTO versions (id, object_id, s3_version_id, mime_type, delete_marker, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.object_id)
        .bind(&request.s3_version_id)
        .bind(&request.mime_type)
        .bind(request.delete_marker)
        .bind(request.created_by)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(version)
    }

    /// Most recently created version of an object, if any.
    #[instrument(skip(self), fields(object_id = %abbrev_uuid(&object_id)), err)]
    pub async fn latest_version(&mut self, object_id: ObjectId) -> Result<Option<VersionDBResponse>> {
        let version = sqlx::query_as::<_, VersionDBResponse>(
            "SELECT * FROM versions WHERE object_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(object_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SYSTEM_USER;
    use sqlx::PgPool;

    #[sqlx::test]
    async fn test_create_and_read_object(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut objects = Objects::new(&mut conn);

        let created = objects
            .create(&ObjectCreateDBRequest {
                path: "uploads/report.pdf".to_string(),
                public: false,
                created_by: SYSTEM_USER,
            })
            .await
            .unwrap();

        let read = objects.read(created.id).await.unwrap().unwrap();
        assert_eq!(read.path, "uploads/report.pdf");
        assert!(read.active);
        assert!(!read.public);
    }

    #[sqlx::test]
    async fn test_read_missing_object_is_none(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut objects = Objects::new(&mut conn);

        assert!(objects.read(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[sqlx::test]
    async fn test_latest_version_picks_newest(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut objects = Objects::new(&mut conn);

        let object = objects
            .create(&ObjectCreateDBRequest {
                path: "uploads/report.pdf".to_string(),
                public: false,
                created_by: SYSTEM_USER,
            })
            .await
            .unwrap();

        assert!(objects.latest_version(object.id).await.unwrap().is_none());

        objects
            .create_version(&VersionCreateDBRequest {
                object_id: object.id,
                s3_version_id: Some("v1".to_string()),
                mime_type: Some("application/pdf".to_string()),
                delete_marker: false,
                created_by: SYSTEM_USER,
            })
            .await
            .unwrap();
        let newest = objects
            .create_version(&VersionCreateDBRequest {
                object_id: object.id,
                s3_version_id: Some("v2".to_string()),
                mime_type: Some("application/pdf".to_string()),
                delete_marker: false,
                created_by: SYSTEM_USER,
            })
            .await
            .unwrap();

        let latest = objects.latest_version(object.id).await.unwrap().unwrap();
        assert_eq!(latest.id, newest.id);
        assert_eq!(latest.s3_version_id.as_deref(), Some("v2"));
    }
}
