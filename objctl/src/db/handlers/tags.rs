//! Database repository for tags and tag-to-version relations.

use crate::{
    db::{
        errors::Result,
        models::tags::{TagSpec, VersionTagDBResponse},
    },
    types::{TagId, UserId, VersionId, abbrev_uuid},
};
use sqlx::{Connection, PgConnection};
use tracing::instrument;
use uuid::Uuid;

pub struct Tags<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Tags<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Replace the tag set of a version.
    ///
    /// Tag rows are upserted (pre-existing `(key, value)` pairs resolve to the
    /// existing row id), every current relation for the version is discarded,
    /// and one relation per incoming tag is inserted carrying the acting
    /// user. The three steps run in a single transaction; the version is
    /// never left partially re-tagged.
    ///
    /// The unrelate-then-relate ordering keeps repeated calls with the same
    /// tag set idempotent.
    #[instrument(skip(self, tags), fields(version_id = %abbrev_uuid(&version_id), count = tags.len()), err)]
    pub async fn add_tags(
        &mut self,
        version_id: VersionId,
        tags: &[TagSpec],
        acting_user: UserId,
    ) -> Result<Vec<VersionTagDBResponse>> {
        let mut tx = self.db.begin().await?;

        // Insert/merge tag records; the no-op update makes the conflicting
        // row's id come back too.
        let mut tag_ids: Vec<TagId> = Vec::with_capacity(tags.len());
        for tag in tags {
            let id: TagId = sqlx::query_scalar(
                r#"
                INSERT INTO tags (id, key, value)
                VALUES ($1, $2, $3)
                ON CONFLICT (key, value) DO UPDATE SET key = EXCLUDED.key
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&tag.key)
            .bind(&tag.value)
            .fetch_one(&mut *tx)
            .await?;
            tag_ids.push(id);
        }

        // Un-relate all existing tags for this version
        sqlx::query("DELETE FROM version_tags WHERE version_id = $1")
            .bind(version_id)
            .execute(&mut *tx)
            .await?;

        // Relate all incoming tags
        let mut relations = Vec::with_capacity(tag_ids.len());
        for tag_id in tag_ids {
            let relation = sqlx::query_as::<_, VersionTagDBResponse>(
                r#"
                INSERT INTO version_tags (version_id, tag_id, created_by)
                VALUES ($1, $2, $3)
                RETURNING version_id, tag_id, created_by
                "#,
            )
            .bind(version_id)
            .bind(tag_id)
            .bind(acting_user)
            .fetch_one(&mut *tx)
            .await?;
            relations.push(relation);
        }

        tx.commit().await?;

        Ok(relations)
    }
}
